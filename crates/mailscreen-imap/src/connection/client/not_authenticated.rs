//! Implementation for the not-authenticated state.

use std::marker::PhantomData;

use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use super::states::{Authenticated, NotAuthenticated};
use crate::command::{Command, TagGenerator};
use crate::connection::framed::FramedStream;
use crate::connection::stream::ImapStream;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::ResponseCode;
use crate::{Error, Result};

impl<S> Client<S, NotAuthenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new client from a connected stream.
    ///
    /// Reads the server greeting and any capabilities announced in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting is malformed or the server sends BYE.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut framed = FramedStream::new(stream);

        let greeting = framed.read_response().await?;
        let response = ResponseParser::parse(&greeting)?;

        let mut capabilities = Vec::new();
        if let Response::Untagged(untagged) = response {
            match untagged {
                UntaggedResponse::Ok {
                    code: Some(ResponseCode::Capability(caps)),
                    ..
                }
                | UntaggedResponse::PreAuth {
                    code: Some(ResponseCode::Capability(caps)),
                    ..
                } => {
                    capabilities = caps;
                }
                UntaggedResponse::Bye { text } => {
                    return Err(Error::Bye(text));
                }
                _ => {}
            }
        }

        Ok(Self {
            stream: framed,
            tag_gen: TagGenerator::default(),
            capabilities,
            command_timeout: super::DEFAULT_COMMAND_TIMEOUT,
            _state: PhantomData,
        })
    }

    /// Authenticates with the server using LOGIN.
    ///
    /// Consumes self and returns an authenticated client on success.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication is rejected or I/O fails.
    pub async fn login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        }
        .serialize(&tag);

        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;

        // Update capabilities if included in the login response
        for response_bytes in &responses {
            if let Ok(Response::Untagged(UntaggedResponse::Capability(caps))) =
                ResponseParser::parse(response_bytes)
            {
                self.capabilities = caps;
            }
        }

        Self::check_tagged_ok(&responses, &tag)?;

        Ok(self.transition())
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

impl Client<ImapStream, NotAuthenticated> {
    /// Upgrades the connection to TLS via STARTTLS.
    ///
    /// Sends the STARTTLS command and performs the handshake on the same
    /// socket. Capabilities are cleared; the caller should re-query them
    /// since pre-TLS announcements are untrusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects STARTTLS or the handshake
    /// fails.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        let tag = self.tag_gen.next();
        let cmd = Command::StartTls.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        let responses = self.read_until_tagged(&tag).await?;
        Self::check_tagged_ok(&responses, &tag)?;

        // No data may sit between the tagged response and the TLS handshake
        // per RFC 3501, so dropping the read buffer here is safe.
        let Self {
            stream,
            tag_gen,
            command_timeout,
            ..
        } = self;
        let tls = stream.into_inner().upgrade_to_tls(host).await?;

        Ok(Self {
            stream: FramedStream::new(tls),
            tag_gen,
            capabilities: Vec::new(),
            command_timeout,
            _state: PhantomData,
        })
    }
}
