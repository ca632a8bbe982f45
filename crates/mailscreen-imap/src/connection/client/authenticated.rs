//! Implementation for the authenticated state.

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, Selected};
use crate::command::Command;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Flag, Mailbox, MailboxStatus, ResponseCode, Status, Uid};
use crate::{Error, Result};

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a mailbox for read-write access.
    ///
    /// Consumes self and returns a selected client with the mailbox status
    /// snapshot (EXISTS, UIDVALIDITY, UIDNEXT).
    ///
    /// # Errors
    ///
    /// Returns an error if the mailbox cannot be selected.
    pub async fn select(mut self, mailbox: &str) -> Result<(Client<S, Selected>, MailboxStatus)> {
        let tag = self.tag_gen.next();
        let cmd = Command::Select {
            mailbox: Mailbox::new(mailbox),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        let status = parse_mailbox_status(&responses);
        Self::check_tagged_ok(&responses, &tag)?;

        Ok((self.transition(), status))
    }

    /// Creates a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] when the mailbox already exists on most
    /// servers; callers treating CREATE as "ensure" should accept that.
    pub async fn create(&mut self, mailbox: &str) -> Result<()> {
        let tag = self.tag_gen.next();
        let cmd = Command::Create {
            mailbox: Mailbox::new(mailbox),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;
        Ok(())
    }

    /// Appends a complete RFC 5322 message to a mailbox.
    ///
    /// `internal_date` is the IMAP date-time string to record as the
    /// message's INTERNALDATE; passing the original capture date preserves
    /// ordering relative to mail received around the same time. Returns the
    /// assigned UID when the server announces APPENDUID (UIDPLUS).
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses the append or I/O fails.
    pub async fn append(
        &mut self,
        mailbox: &str,
        flags: Option<Vec<Flag>>,
        internal_date: Option<&str>,
        message: &[u8],
    ) -> Result<Option<Uid>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Append {
            mailbox: Mailbox::new(mailbox),
            flags,
            internal_date: internal_date.map(ToString::to_string),
            size: message.len(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        // The literal may only follow the server's continuation response.
        let response = self.read_response_bounded().await?;
        if !response.starts_with(b"+") {
            if let Response::Tagged { status, text, .. } = ResponseParser::parse(&response)? {
                return match status {
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    _ => Err(Error::Protocol("unexpected response to APPEND".to_string())),
                };
            }
            return Err(Error::Protocol(
                "expected continuation for APPEND".to_string(),
            ));
        }

        self.stream.write_command(message).await?;
        self.stream.write_command(b"\r\n").await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        // Recover the new UID from APPENDUID when the server provides it.
        for response_bytes in responses.iter().rev() {
            if let Ok(Response::Tagged {
                code: Some(ResponseCode::AppendUid { uid, .. }),
                ..
            }) = ResponseParser::parse(response_bytes)
            {
                return Ok(Some(uid));
            }
        }

        Ok(None)
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

/// Parses a mailbox status snapshot from SELECT responses.
pub(super) fn parse_mailbox_status(responses: &[Vec<u8>]) -> MailboxStatus {
    let mut status = MailboxStatus::default();

    for response_bytes in responses {
        if let Ok(Response::Untagged(untagged)) = ResponseParser::parse(response_bytes) {
            match untagged {
                UntaggedResponse::Exists(n) => status.exists = n,
                UntaggedResponse::Recent(n) => status.recent = n,
                UntaggedResponse::Flags(flags) => status.flags = flags,
                UntaggedResponse::Ok {
                    code: Some(code), ..
                } => match code {
                    ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
                    ResponseCode::UidNext(v) => status.uid_next = Some(v),
                    ResponseCode::Unseen(v) => status.unseen = Some(v),
                    _ => {}
                },
                _ => {}
            }
        }
    }

    // READ-ONLY arrives on the tagged line
    for response_bytes in responses {
        if let Ok(Response::Tagged {
            code: Some(ResponseCode::ReadOnly),
            ..
        }) = ResponseParser::parse(response_bytes)
        {
            status.read_only = true;
        }
    }

    status
}
