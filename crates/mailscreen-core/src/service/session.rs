//! IMAP session establishment for monitored accounts.
//!
//! Every network call here carries its own bounded timeout so a stuck
//! remote cannot hang a worker beyond a known bound; timeouts surface as
//! ordinary session errors and feed the circuit breaker like any other
//! connection failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use mailscreen_imap::connection::{Client, ImapStream, connect_plain, connect_tls};
use tracing::debug;

use crate::account::{Account, Security};

/// Timeout for establishing the TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for individual protocol commands during setup.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from session establishment and folder setup.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Operation failed after login.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// A setup step exceeded its time bound.
    #[error("Timed out during {0}")]
    Timeout(&'static str),
}

impl SessionError {
    /// Short classification used as the circuit breaker failure reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connect_failed",
            Self::Authentication(_) => "auth_failed",
            Self::Operation(_) => "protocol_error",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Authenticated IMAP client over a TCP/TLS stream.
pub type AuthClient = Client<ImapStream, mailscreen_imap::connection::Authenticated>;

/// Selected IMAP client over a TCP/TLS stream.
pub type SelectedClient = Client<ImapStream, mailscreen_imap::connection::Selected>;

/// Connects to the account's IMAP server and authenticates.
///
/// The secret is the decrypted account credential; this function never
/// touches the vault.
///
/// # Errors
///
/// Returns a [`SessionError`] describing which setup step failed.
pub async fn connect_and_login(account: &Account, secret: &str) -> Result<AuthClient, SessionError> {
    let host = &account.imap.host;
    let port = account.imap.port;

    debug!(host, port, security = ?account.imap.security, "connecting");

    let client = match account.imap.security {
        Security::Tls => {
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, connect_tls(host, port))
                .await
                .map_err(|_| SessionError::Timeout("connect"))?
                .map_err(|e| SessionError::Connection(e.to_string()))?;
            read_greeting(stream).await?
        }
        Security::StartTls => {
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, connect_plain(host, port))
                .await
                .map_err(|_| SessionError::Timeout("connect"))?
                .map_err(|e| SessionError::Connection(e.to_string()))?;
            let client = read_greeting(stream).await?;
            let mut client = tokio::time::timeout(COMMAND_TIMEOUT, client.starttls(host))
                .await
                .map_err(|_| SessionError::Timeout("starttls"))?
                .map_err(|e| SessionError::Connection(e.to_string()))?;
            // pre-TLS capability announcements are untrusted
            tokio::time::timeout(COMMAND_TIMEOUT, client.capability())
                .await
                .map_err(|_| SessionError::Timeout("capability"))?
                .map_err(|e| SessionError::Connection(e.to_string()))?;
            client
        }
        Security::None => {
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, connect_plain(host, port))
                .await
                .map_err(|_| SessionError::Timeout("connect"))?
                .map_err(|e| SessionError::Connection(e.to_string()))?;
            read_greeting(stream).await?
        }
    };

    let auth_client = tokio::time::timeout(
        COMMAND_TIMEOUT,
        client.login(&account.imap.username, secret),
    )
    .await
    .map_err(|_| SessionError::Timeout("login"))?
    .map_err(|e| SessionError::Authentication(e.to_string()))?;

    debug!(username = %account.imap.username, "logged in");
    Ok(auth_client)
}

async fn read_greeting(
    stream: ImapStream,
) -> Result<Client<ImapStream, mailscreen_imap::connection::NotAuthenticated>, SessionError> {
    tokio::time::timeout(COMMAND_TIMEOUT, Client::from_stream(stream))
        .await
        .map_err(|_| SessionError::Timeout("greeting"))?
        .map_err(|e| SessionError::Connection(e.to_string()))
}

/// Ensures a folder exists, treating "already exists" as success.
///
/// # Errors
///
/// Returns an error only on I/O failure or a BAD reply; a NO reply is how
/// most servers report that the mailbox already exists.
pub async fn ensure_folder(client: &mut AuthClient, folder: &str) -> Result<(), SessionError> {
    match tokio::time::timeout(COMMAND_TIMEOUT, client.create(folder)).await {
        Err(_) => Err(SessionError::Timeout("create")),
        Ok(Ok(())) => {
            debug!(folder, "created folder");
            Ok(())
        }
        Ok(Err(mailscreen_imap::Error::No(text))) => {
            debug!(folder, %text, "folder already exists");
            Ok(())
        }
        Ok(Err(e)) => Err(SessionError::Operation(e.to_string())),
    }
}

/// IMAP date-time layout for INTERNALDATE and APPEND, e.g.
/// `17-Jul-1996 02:44:25 -0700`.
const INTERNAL_DATE_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";

/// Formats a timestamp as an IMAP date-time string.
#[must_use]
pub fn format_internal_date(at: DateTime<Utc>) -> String {
    at.format(INTERNAL_DATE_FORMAT).to_string()
}

/// Parses an INTERNALDATE string as reported by a FETCH response.
#[must_use]
pub fn parse_internal_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text.trim(), INTERNAL_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
