//! IMAP IDLE support (RFC 2177).
//!
//! IDLE is the only intentionally blocking call in the session layer. The
//! wait is bounded by a caller-supplied timeout and interruptible through a
//! [`CancellationToken`], so a supervisor-initiated stop takes effect
//! promptly instead of waiting out a full idle cycle.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use super::client::{Client, Selected};
use super::framed::FramedStream;
use crate::command::Command;
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{SeqNum, Status};
use crate::{Error, Result};

/// Event received during IDLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// Message count changed (EXISTS response).
    Exists(u32),
    /// Recent count changed.
    Recent(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// Some other untagged response arrived (flag changes etc.).
    Other,
    /// The timeout elapsed without a server event.
    Timeout,
}

/// Handle for an active IDLE session.
///
/// Call [`IdleHandle::wait`] to receive events and [`IdleHandle::done`] to
/// exit IDLE mode before issuing other commands.
pub struct IdleHandle<'a, S> {
    stream: &'a mut FramedStream<S>,
    tag: String,
    command_timeout: Duration,
}

impl<'a, S> IdleHandle<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) const fn new(
        stream: &'a mut FramedStream<S>,
        tag: String,
        command_timeout: Duration,
    ) -> Self {
        Self {
            stream,
            tag,
            command_timeout,
        }
    }

    /// Waits for a server event, a timeout, or cancellation.
    ///
    /// Returns [`IdleEvent::Timeout`] when `duration` elapses quietly and
    /// [`Error::Cancelled`] when the token fires; in both cases the caller
    /// still owns the handle and must send DONE before other commands.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, cancellation, or a server NO/BAD/BYE.
    pub async fn wait(&mut self, duration: Duration, cancel: &CancellationToken) -> Result<IdleEvent> {
        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = tokio::time::timeout(duration, self.stream.read_response()) => {
                match result {
                    Ok(Ok(response)) => self.parse_event(&response),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Ok(IdleEvent::Timeout),
                }
            }
        }
    }

    /// Parses a response received during IDLE into an event.
    fn parse_event(&self, response: &[u8]) -> Result<IdleEvent> {
        match ResponseParser::parse(response)? {
            Response::Untagged(untagged) => match untagged {
                UntaggedResponse::Exists(n) => Ok(IdleEvent::Exists(n)),
                UntaggedResponse::Recent(n) => Ok(IdleEvent::Recent(n)),
                UntaggedResponse::Expunge(seq) => Ok(IdleEvent::Expunge(seq)),
                UntaggedResponse::Bye { text } => Err(Error::Bye(text)),
                _ => Ok(IdleEvent::Other),
            },
            Response::Continuation { .. } => Err(Error::Protocol(
                "unexpected continuation during IDLE".to_string(),
            )),
            Response::Tagged {
                tag, status, text, ..
            } => {
                // A tagged response here means the server ended IDLE itself.
                if tag == self.tag {
                    match status {
                        Status::Ok => Ok(IdleEvent::Timeout),
                        Status::No => Err(Error::No(text)),
                        Status::Bad => Err(Error::Bad(text)),
                        Status::Bye => Err(Error::Bye(text)),
                        Status::PreAuth => {
                            Err(Error::Protocol("unexpected PREAUTH in IDLE".to_string()))
                        }
                    }
                } else {
                    Err(Error::Protocol(format!("unexpected tag {tag} during IDLE")))
                }
            }
        }
    }

    /// Exits IDLE mode by sending DONE and waiting for the tagged response.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, timeout, or a server NO/BAD/BYE.
    pub async fn done(self) -> Result<()> {
        let Self {
            stream,
            tag,
            command_timeout,
        } = self;

        let cmd = Command::Done.serialize("");
        stream.write_command(&cmd).await?;

        tokio::time::timeout(command_timeout, async move {
            loop {
                let response = stream.read_response().await?;
                if let Ok(Response::Tagged {
                    tag: resp_tag,
                    status,
                    text,
                    ..
                }) = ResponseParser::parse(&response)
                    && resp_tag == tag
                {
                    return match status {
                        Status::Ok => Ok(()),
                        Status::No => Err(Error::No(text)),
                        Status::Bad => Err(Error::Bad(text)),
                        Status::Bye => Err(Error::Bye(text)),
                        Status::PreAuth => {
                            Err(Error::Protocol("unexpected PREAUTH after DONE".to_string()))
                        }
                    };
                }
                // untagged responses may still arrive before the tagged reply
            }
        })
        .await
        .map_err(|_| Error::Timeout(command_timeout))?
    }
}

impl<S> Client<S, Selected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Enters IDLE mode for push notifications.
    ///
    /// Check [`Client::supports_idle`] first; servers without the capability
    /// reject the command. Re-issue IDLE periodically (the watcher uses its
    /// keep-alive interval) since servers drop long-idle sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects IDLE.
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        let tag = self.tag_gen.next();
        let cmd = Command::Idle.serialize(&tag);
        self.stream.write_command(&cmd).await?;

        // IDLE is acknowledged with a continuation response.
        let response = self.read_response_bounded().await?;
        if !response.starts_with(b"+") {
            if let Response::Tagged { status, text, .. } = ResponseParser::parse(&response)? {
                return match status {
                    Status::No => Err(Error::No(text)),
                    Status::Bad => Err(Error::Bad(text)),
                    _ => Err(Error::Protocol("unexpected response to IDLE".to_string())),
                };
            }
            return Err(Error::Protocol(
                "expected continuation for IDLE".to_string(),
            ));
        }

        let command_timeout = self.command_timeout;
        Ok(IdleHandle::new(&mut self.stream, tag, command_timeout))
    }
}
