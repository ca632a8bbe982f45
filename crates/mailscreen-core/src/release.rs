//! Release engine: re-delivers an edited held message exactly once.
//!
//! Every entry point starts with the state guard: a row that is not `HELD`
//! never causes network I/O. The guard plus the conditional `HELD →`
//! repository updates make retried calls safe — the second caller observes
//! a non-`HELD` state and no-ops.

use chrono::Utc;
use mailscreen_imap::UidSet;
use mailscreen_imap::command::StoreAction;
use mailscreen_imap::types::{Flag, Uid};
use tracing::{debug, info, warn};

use crate::account::{Account, AccountId, AccountRepository, CredentialVault};
use crate::service::{
    SessionError, connect_and_login, ensure_folder, format_internal_date,
};
use crate::store::{HeldStats, HeldSummary, InterceptState, MessageId, MessageRepository};

/// A release request from the reviewer.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// Folder to re-deliver into.
    pub target_folder: String,
    /// Subject override; defaults to the row's (possibly edited) subject.
    pub edited_subject: Option<String>,
    /// Body override; defaults to the row's (possibly edited) body text.
    pub edited_body: Option<String>,
    /// Remove every attachment part before re-delivery.
    pub strip_attachments: bool,
}

impl Default for ReleaseRequest {
    fn default() -> Self {
        Self {
            target_folder: "INBOX".to_string(),
            edited_subject: None,
            edited_body: None,
            strip_attachments: false,
        }
    }
}

/// Result of a successful release.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    /// Folder the message was appended to.
    pub released_to: String,
    /// Filenames of stripped attachments (empty when not stripping).
    pub attachments_removed: Vec<String>,
    /// Message id assigned to the re-delivered copy.
    pub released_message_id: String,
}

/// Release and discard failures.
///
/// The variants map to distinct caller behaviors: [`Self::AlreadyReleased`]
/// is an idempotent no-op, [`Self::Connect`] and [`Self::AppendFailed`] are
/// retryable transport errors (the row is still `HELD`), and
/// [`Self::RawMissing`]/[`Self::SecretUnavailable`] are data-integrity
/// problems a retry will not fix.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// No row with this id.
    #[error("message not found")]
    NotFound,

    /// The row is already `RELEASED`; the work was done by an earlier call.
    #[error("message already released")]
    AlreadyReleased,

    /// The row is not `HELD` (and not `RELEASED` either).
    #[error("message is not held (state: {0})")]
    NotHeld(InterceptState),

    /// Neither a raw-payload pointer nor inline raw bytes are present.
    #[error("raw message content is missing")]
    RawMissing,

    /// The stored secret failed to decrypt.
    #[error("account secret unavailable")]
    SecretUnavailable,

    /// The owning account row is gone.
    #[error("account {0} not found")]
    AccountMissing(AccountId),

    /// Could not open a session against the target mailbox.
    #[error("session error: {0}")]
    Connect(#[from] SessionError),

    /// The append itself failed; the row is left `HELD` for retry.
    #[error("append failed: {0}")]
    AppendFailed(String),

    /// Store access failed.
    #[error("storage error: {0}")]
    Storage(#[from] crate::Error),
}

/// Outcome of an edit call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Fields were updated.
    Updated,
    /// No row with this id.
    NotFound,
    /// The row is not `HELD`.
    NotHeld,
}

/// Releases a held message: applies edits, re-delivers it to the target
/// folder with the original internal date, and retires the row.
///
/// Safe to call twice for the same id: the second call observes a
/// non-`HELD` state and returns [`ReleaseError::AlreadyReleased`] without
/// opening a connection or sending mail.
///
/// # Errors
///
/// See [`ReleaseError`] for the taxonomy.
pub async fn release_message(
    accounts: &AccountRepository,
    messages: &MessageRepository,
    vault: &CredentialVault,
    id: MessageId,
    request: ReleaseRequest,
) -> Result<ReleaseOutcome, ReleaseError> {
    // 1. Idempotency guard: no I/O for non-HELD rows.
    let row = messages.get(id).await?.ok_or(ReleaseError::NotFound)?;
    match row.state {
        InterceptState::Held => {}
        InterceptState::Released => return Err(ReleaseError::AlreadyReleased),
        other => return Err(ReleaseError::NotHeld(other)),
    }

    // 2. Reconstruct the original raw message, preferring the persisted file.
    let raw = load_raw(&row.raw_path, row.raw.as_deref()).await?;
    let mut message =
        mailscreen_mime::Message::parse(&raw).map_err(|_| ReleaseError::RawMissing)?;

    // 3. Apply edits, defaulting to the persisted (possibly pre-edited) row
    //    fields when the request omits them.
    let subject = request
        .edited_subject
        .clone()
        .unwrap_or_else(|| row.subject.clone());
    if !subject.is_empty() {
        message.set_subject(&subject);
    }

    let body = request.edited_body.clone().or_else(|| row.body_text.clone());
    if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
        message.replace_text_body(body);
    }

    let attachments_removed = if request.strip_attachments {
        message.strip_attachments()
    } else {
        Vec::new()
    };

    // Re-delivery produces a new message; stamp a fresh Message-ID and
    // record it as the outgoing id.
    let action_at = Utc::now();
    let released_message_id = format!("<{}.{}@mailscreen>", id.0, action_at.timestamp_millis());
    message.headers.set("Message-ID", &released_message_id);

    // 4. Append against the same account, preserving provider ordering via
    //    the original internal date.
    let account = accounts
        .get(row.account_id)
        .await?
        .ok_or(ReleaseError::AccountMissing(row.account_id))?;
    let secret = vault
        .decrypt(&account.encrypted_secret)
        .filter(|s| !s.is_empty())
        .ok_or(ReleaseError::SecretUnavailable)?;

    let mut client = connect_and_login(&account, &secret).await?;
    ensure_folder(&mut client, &request.target_folder).await?;

    let internal_date = format_internal_date(row.original_internal_date.unwrap_or(row.captured_at));
    client
        .append(
            &request.target_folder,
            None,
            Some(&internal_date),
            &message.to_bytes(),
        )
        .await
        .map_err(|e| ReleaseError::AppendFailed(e.to_string()))?;

    // 5. Durable outcome first: the conditional update is the authoritative
    //    transition. A concurrent release beat us if it reports zero rows.
    let transitioned = messages
        .release(id, &released_message_id, action_at)
        .await?;
    if !transitioned {
        warn!(message_id = id.0, "row left HELD state during release");
        return Err(ReleaseError::AlreadyReleased);
    }

    info!(
        message_id = id.0,
        target = %request.target_folder,
        stripped = attachments_removed.len(),
        "released message"
    );

    // 6. Best-effort quarantine cleanup; never surfaced to the caller.
    if let Some(uid) = row.original_uid.and_then(Uid::new) {
        if let Err(e) = cleanup_quarantine(client, &account, uid).await {
            warn!(
                message_id = id.0,
                uid = uid.get(),
                error = %e,
                "quarantine cleanup failed; held copy may remain"
            );
        }
    } else {
        let _ = client.logout().await;
    }

    Ok(ReleaseOutcome {
        released_to: request.target_folder,
        attachments_removed,
        released_message_id,
    })
}

/// Discards a held message. No network call: a discarded message is never
/// re-delivered.
///
/// # Errors
///
/// Returns [`ReleaseError::NotFound`] or [`ReleaseError::NotHeld`]; like
/// release, the guard makes repeated calls side-effect free.
pub async fn discard_message(
    messages: &MessageRepository,
    id: MessageId,
) -> Result<(), ReleaseError> {
    let state = messages.get_state(id).await?.ok_or(ReleaseError::NotFound)?;
    if state != InterceptState::Held {
        return Err(ReleaseError::NotHeld(state));
    }

    if messages.discard(id, Utc::now()).await? {
        info!(message_id = id.0, "discarded message");
        Ok(())
    } else {
        // lost a race with another transition
        let state = messages
            .get_state(id)
            .await?
            .unwrap_or(InterceptState::Discarded);
        Err(ReleaseError::NotHeld(state))
    }
}

/// Edits the stored subject/body/notes of a held message.
///
/// Only the edit-trail fields are writable from outside; the state never
/// changes here.
///
/// # Errors
///
/// Returns an error only on storage failure; business outcomes are encoded
/// in [`EditOutcome`].
pub async fn edit_held_message(
    messages: &MessageRepository,
    id: MessageId,
    subject: Option<&str>,
    body_text: Option<&str>,
    body_html: Option<&str>,
) -> Result<EditOutcome, crate::Error> {
    if messages.get_state(id).await?.is_none() {
        return Ok(EditOutcome::NotFound);
    }

    let updated = messages
        .update_held_fields(id, subject, body_text, body_html, None)
        .await?;

    if updated {
        debug!(message_id = id.0, "edited held message");
        Ok(EditOutcome::Updated)
    } else {
        Ok(EditOutcome::NotHeld)
    }
}

/// Lists held messages, optionally scoped to one account.
///
/// # Errors
///
/// Returns an error on storage failure.
pub async fn list_held(
    messages: &MessageRepository,
    account_id: Option<AccountId>,
) -> Result<Vec<HeldSummary>, crate::Error> {
    messages.list_held(account_id).await
}

/// Aggregate statistics over the message store.
///
/// # Errors
///
/// Returns an error on storage failure.
pub async fn held_stats(messages: &MessageRepository) -> Result<HeldStats, crate::Error> {
    messages.held_stats().await
}

async fn load_raw(
    raw_path: &Option<String>,
    inline: Option<&[u8]>,
) -> Result<Vec<u8>, ReleaseError> {
    if let Some(path) = raw_path {
        match tokio::fs::read(path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                warn!(path, error = %e, "raw file missing; falling back to inline copy");
            }
        }
    }
    inline
        .filter(|b| !b.is_empty())
        .map(<[u8]>::to_vec)
        .ok_or(ReleaseError::RawMissing)
}

/// Removes the now-redundant copy from the quarantine folder.
async fn cleanup_quarantine(
    client: crate::service::AuthClient,
    account: &Account,
    uid: Uid,
) -> Result<(), mailscreen_imap::Error> {
    let (mut selected, _status) = client.select(&account.quarantine_folder).await?;
    let set = UidSet::single(uid);
    selected
        .uid_store_silent(&set, StoreAction::AddFlags(vec![Flag::Deleted]))
        .await?;
    selected.expunge().await?;
    selected.logout().await
}
