//! Implementation for the selected state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::Result;
use crate::command::{Command, FetchItems, StoreAction};
use crate::parser::{FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{Mailbox, MailboxStatus, SeqNum, Uid, UidSet};

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Closes the current mailbox and returns to the authenticated state.
    ///
    /// CLOSE also expunges messages flagged `\Deleted` in the mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the command.
    pub async fn close(mut self) -> Result<Client<S, Authenticated>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Close.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        Ok(self.transition())
    }

    /// Selects a different mailbox without dropping the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(mut self, mailbox: &str) -> Result<(Self, MailboxStatus)> {
        let tag = self.tag_gen.next();
        let cmd = Command::Select {
            mailbox: Mailbox::new(mailbox),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let status = super::authenticated::parse_mailbox_status(&responses);
        Self::check_tagged_ok(&responses, &tag)?;

        Ok((self, status))
    }

    /// Runs a UID SEARCH with the given criteria.
    ///
    /// Returns matching UIDs in the order the server listed them (ascending
    /// on conforming servers).
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the search.
    pub async fn uid_search(&mut self, query: &str) -> Result<Vec<Uid>> {
        let tag = self.tag_gen.next();
        let cmd = Command::UidSearch {
            query: query.to_string(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let mut results = Vec::new();

        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Search(uids))) =
                ResponseParser::parse(response_bytes)
            {
                results.extend(uids);
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;
        Ok(results)
    }

    /// Fetches message data for the given UID set.
    ///
    /// Returns (sequence number, fetch items) pairs, one per message.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the fetch.
    pub async fn uid_fetch(
        &mut self,
        set: &UidSet,
        items: FetchItems,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        let tag = self.tag_gen.next();
        let cmd = Command::UidFetch {
            set: set.clone(),
            items,
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let mut results = Vec::new();

        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Fetch { seq, items })) =
                ResponseParser::parse(response_bytes)
            {
                results.push((seq, items));
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;
        Ok(results)
    }

    /// Modifies message flags silently (no untagged FETCH echo).
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the store.
    pub async fn uid_store_silent(&mut self, set: &UidSet, action: StoreAction) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::UidStore {
            set: set.clone(),
            action,
            silent: true,
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(())
    }

    /// Copies messages to another mailbox by UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails; on failure nothing has been
    /// removed from the source mailbox.
    pub async fn uid_copy(&mut self, set: &UidSet, mailbox: &str) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::UidCopy {
            set: set.clone(),
            mailbox: Mailbox::new(mailbox),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(())
    }

    /// Moves messages to another mailbox by UID.
    ///
    /// Requires the MOVE capability (RFC 6851); check
    /// [`Client::supports_move`] first.
    ///
    /// # Errors
    ///
    /// Returns an error if the move fails.
    pub async fn uid_move(&mut self, set: &UidSet, mailbox: &str) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::UidMove {
            set: set.clone(),
            mailbox: Mailbox::new(mailbox),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(())
    }

    /// Permanently removes messages flagged `\Deleted`.
    ///
    /// Returns the sequence numbers of expunged messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the expunge.
    pub async fn expunge(&mut self) -> Result<Vec<SeqNum>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Expunge.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let mut expunged = Vec::new();

        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Expunge(seq))) =
                ResponseParser::parse(response_bytes)
            {
                expunged.push(seq);
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;
        Ok(expunged)
    }

    /// Gracefully disconnects from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the LOGOUT command cannot be written.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::Logout.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let _ = self.read_until_tagged(&tag).await;
        Ok(())
    }
}
