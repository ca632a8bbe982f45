//! Message store model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

/// Unique identifier for a stored message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Mail arriving at the monitored mailbox.
    Inbound,
    /// Mail leaving the monitored mailbox.
    Outbound,
}

impl Direction {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Parses the database representation, defaulting to inbound.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("outbound") {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }
}

/// Interception lifecycle state.
///
/// Transitions are `FETCHED → HELD → {RELEASED | DISCARDED}`; the two final
/// states are terminal. Only the state-guarded repository updates perform
/// the `HELD →` transitions, which is what makes release and discard
/// idempotent under concurrent callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterceptState {
    /// Pulled for inspection; the hold operation has not (yet) succeeded.
    Fetched,
    /// Removed from the source folder and parked in quarantine.
    Held,
    /// Re-delivered to the mailbox. Terminal.
    Released,
    /// Dropped without re-delivery. Terminal.
    Discarded,
}

impl InterceptState {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetched => "FETCHED",
            Self::Held => "HELD",
            Self::Released => "RELEASED",
            Self::Discarded => "DISCARDED",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FETCHED" => Some(Self::Fetched),
            "HELD" => Some(Self::Held),
            "RELEASED" => Some(Self::Released),
            "DISCARDED" => Some(Self::Discarded),
            _ => None,
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Discarded)
    }
}

impl std::fmt::Display for InterceptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An intercepted message: the unit of work and the unit of recovery.
#[derive(Debug, Clone)]
pub struct InterceptedMessage {
    /// Internal row id (None before insert).
    pub id: Option<MessageId>,
    /// Owning account.
    pub account_id: AccountId,
    /// Direction of travel.
    pub direction: Direction,
    /// Lifecycle state.
    pub state: InterceptState,
    /// Provider-assigned message id. Best-effort: may collide across
    /// providers, so uniqueness is enforced on the internal id only.
    pub provider_message_id: Option<String>,
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients, ordered and not deduplicated.
    pub recipients: Vec<String>,
    /// Subject at capture time; edits overwrite this in place.
    pub subject: String,
    /// Plain-text body, if extracted.
    pub body_text: Option<String>,
    /// HTML body, if extracted.
    pub body_html: Option<String>,
    /// Inline raw message bytes.
    pub raw: Option<Vec<u8>>,
    /// Pointer to a persisted raw copy (preferred over `raw` on release).
    pub raw_path: Option<String>,
    /// Remote UID in the source folder at capture time. Frozen as the
    /// historical reference once the hold succeeds.
    pub original_uid: Option<u32>,
    /// Provider internal-date, preserved so re-delivery sorts correctly.
    pub original_internal_date: Option<DateTime<Utc>>,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// When the message was released or discarded.
    pub action_taken_at: Option<DateTime<Utc>>,
    /// Action time minus capture time, milliseconds.
    pub latency_ms: Option<i64>,
    /// Message id assigned to the re-delivered copy on release.
    pub released_message_id: Option<String>,
    /// Free-text reviewer notes.
    pub review_notes: Option<String>,
}

impl InterceptedMessage {
    /// Creates a freshly captured inbound message in state `FETCHED`.
    #[must_use]
    pub fn captured(
        account_id: AccountId,
        uid: u32,
        raw: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            account_id,
            direction: Direction::Inbound,
            state: InterceptState::Fetched,
            provider_message_id: None,
            sender: String::new(),
            recipients: Vec::new(),
            subject: String::new(),
            body_text: None,
            body_html: None,
            raw: Some(raw),
            raw_path: None,
            original_uid: Some(uid),
            original_internal_date: None,
            captured_at,
            action_taken_at: None,
            latency_ms: None,
            released_message_id: None,
            review_notes: None,
        }
    }
}

/// Listing entry for held messages.
#[derive(Debug, Clone, Serialize)]
pub struct HeldSummary {
    /// Internal row id.
    pub id: MessageId,
    /// Owning account.
    pub account_id: AccountId,
    /// Envelope sender.
    pub sender: String,
    /// Envelope recipients.
    pub recipients: Vec<String>,
    /// Current subject (including edits).
    pub subject: String,
    /// Derived latency, present once terminal.
    pub latency_ms: Option<i64>,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

/// Aggregate view over the store for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeldStats {
    /// Messages currently held.
    pub held: i64,
    /// Messages released in the last 24 hours.
    pub released_24h: i64,
    /// Median latency over recent terminal rows, if any.
    pub median_latency_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trip() {
        for state in [
            InterceptState::Fetched,
            InterceptState::Held,
            InterceptState::Released,
            InterceptState::Discarded,
        ] {
            assert_eq!(InterceptState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn state_parse_is_case_insensitive() {
        assert_eq!(InterceptState::parse("held"), Some(InterceptState::Held));
        assert_eq!(InterceptState::parse("nonsense"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(InterceptState::Released.is_terminal());
        assert!(InterceptState::Discarded.is_terminal());
        assert!(!InterceptState::Held.is_terminal());
        assert!(!InterceptState::Fetched.is_terminal());
    }

    #[test]
    fn direction_round_trip() {
        assert_eq!(Direction::parse("outbound"), Direction::Outbound);
        assert_eq!(Direction::parse("inbound"), Direction::Inbound);
        assert_eq!(Direction::parse(""), Direction::Inbound);
    }

    #[test]
    fn captured_starts_fetched_with_uid() {
        let msg = InterceptedMessage::captured(
            AccountId(1),
            120,
            b"raw".to_vec(),
            Utc::now(),
        );
        assert_eq!(msg.state, InterceptState::Fetched);
        assert_eq!(msg.original_uid, Some(120));
        assert!(msg.raw.is_some());
    }
}
