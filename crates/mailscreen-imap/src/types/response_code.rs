//! Response codes carried in bracketed status responses.

use super::{Capability, SeqNum, Uid, UidValidity};

/// Response code from a `[...]` section of an OK/NO/BAD response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// Capabilities announced inline (common in greetings).
    Capability(Vec<Capability>),
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(UidValidity),
    /// Predicted next UID of the selected mailbox.
    UidNext(Uid),
    /// First unseen message.
    Unseen(SeqNum),
    /// UID assigned to an appended message (UIDPLUS, RFC 4315).
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        validity: UidValidity,
        /// UID of the newly appended message.
        uid: Uid,
    },
    /// Mailbox opened read-only.
    ReadOnly,
    /// Mailbox opened read-write.
    ReadWrite,
    /// Target mailbox does not exist but may be created.
    TryCreate,
    /// Any other code, preserved verbatim.
    Other(String),
}

impl ResponseCode {
    /// Parses the contents of a bracketed response code (without brackets).
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let mut words = contents.split_whitespace();
        let Some(name) = words.next() else {
            return Self::Other(String::new());
        };

        match name.to_uppercase().as_str() {
            "CAPABILITY" => Self::Capability(words.map(Capability::parse).collect()),
            "UIDVALIDITY" => words
                .next()
                .and_then(|w| w.parse().ok())
                .and_then(UidValidity::new)
                .map_or_else(|| Self::Other(contents.to_string()), Self::UidValidity),
            "UIDNEXT" => words
                .next()
                .and_then(|w| w.parse().ok())
                .and_then(Uid::new)
                .map_or_else(|| Self::Other(contents.to_string()), Self::UidNext),
            "UNSEEN" => words
                .next()
                .and_then(|w| w.parse().ok())
                .and_then(SeqNum::new)
                .map_or_else(|| Self::Other(contents.to_string()), Self::Unseen),
            "APPENDUID" => {
                let validity = words
                    .next()
                    .and_then(|w| w.parse().ok())
                    .and_then(UidValidity::new);
                // The UID part may be a set on servers with MULTIAPPEND; the
                // first number names the message this crate appended.
                let uid = words
                    .next()
                    .and_then(|w| w.split([':', ',']).next()?.parse().ok())
                    .and_then(Uid::new);
                match (validity, uid) {
                    (Some(validity), Some(uid)) => Self::AppendUid { validity, uid },
                    _ => Self::Other(contents.to_string()),
                }
            }
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "TRYCREATE" => Self::TryCreate,
            _ => Self::Other(contents.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_uidvalidity() {
        assert_eq!(
            ResponseCode::parse("UIDVALIDITY 3857529045"),
            ResponseCode::UidValidity(UidValidity::new(3_857_529_045).unwrap())
        );
    }

    #[test]
    fn parse_uidnext() {
        assert_eq!(
            ResponseCode::parse("UIDNEXT 4392"),
            ResponseCode::UidNext(Uid::new(4392).unwrap())
        );
    }

    #[test]
    fn parse_appenduid() {
        assert_eq!(
            ResponseCode::parse("APPENDUID 38505 3955"),
            ResponseCode::AppendUid {
                validity: UidValidity::new(38505).unwrap(),
                uid: Uid::new(3955).unwrap(),
            }
        );
    }

    #[test]
    fn parse_capability() {
        let code = ResponseCode::parse("CAPABILITY IMAP4rev1 IDLE MOVE");
        let ResponseCode::Capability(caps) = code else {
            panic!("expected capability code");
        };
        assert!(caps.contains(&Capability::Idle));
        assert!(caps.contains(&Capability::Move));
    }

    #[test]
    fn parse_trycreate() {
        assert_eq!(ResponseCode::parse("TRYCREATE"), ResponseCode::TryCreate);
    }

    #[test]
    fn parse_malformed_uidvalidity_is_other() {
        assert_eq!(
            ResponseCode::parse("UIDVALIDITY abc"),
            ResponseCode::Other("UIDVALIDITY abc".to_string())
        );
    }

    #[test]
    fn parse_unknown_preserved() {
        assert_eq!(
            ResponseCode::parse("HIGHESTMODSEQ 715194045007"),
            ResponseCode::Other("HIGHESTMODSEQ 715194045007".to_string())
        );
    }
}
