//! UID sets for addressing message ranges.
//!
//! Interception and release only ever address messages by UID, never by
//! ephemeral sequence number, so this crate carries a single UID-based set
//! type used by every data command.

use super::Uid;

/// UID set for specifying message ranges in UID commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UidSet {
    /// Single UID.
    Single(Uid),
    /// Range of UIDs (inclusive).
    Range(Uid, Uid),
    /// Range from start to the highest UID in the mailbox.
    RangeFrom(Uid),
    /// Multiple UID specifications.
    Set(Vec<Self>),
}

impl UidSet {
    /// Creates a UID set from a single UID.
    #[must_use]
    pub const fn single(uid: Uid) -> Self {
        Self::Single(uid)
    }

    /// Creates an inclusive UID range.
    #[must_use]
    pub const fn range(start: Uid, end: Uid) -> Self {
        Self::Range(start, end)
    }

    /// Creates an open range from `start` to the end of the mailbox (`n:*`).
    #[must_use]
    pub const fn from(start: Uid) -> Self {
        Self::RangeFrom(start)
    }

    /// Builds a set from a list of UIDs, collapsing a single element.
    ///
    /// Returns `None` for an empty list since an empty UID set is not
    /// expressible in the protocol.
    #[must_use]
    pub fn from_uids(uids: &[Uid]) -> Option<Self> {
        match uids {
            [] => None,
            [only] => Some(Self::Single(*only)),
            many => Some(Self::Set(many.iter().copied().map(Self::Single).collect())),
        }
    }
}

impl std::fmt::Display for UidSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::RangeFrom(start) => write!(f, "{start}:*"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    #[test]
    fn display_single() {
        assert_eq!(UidSet::single(uid(5)).to_string(), "5");
    }

    #[test]
    fn display_range() {
        assert_eq!(UidSet::range(uid(1), uid(10)).to_string(), "1:10");
    }

    #[test]
    fn display_range_from() {
        assert_eq!(UidSet::from(uid(120)).to_string(), "120:*");
    }

    #[test]
    fn from_uids_empty() {
        assert!(UidSet::from_uids(&[]).is_none());
    }

    #[test]
    fn from_uids_single() {
        assert_eq!(UidSet::from_uids(&[uid(3)]).unwrap().to_string(), "3");
    }

    #[test]
    fn from_uids_many() {
        let set = UidSet::from_uids(&[uid(3), uid(7), uid(9)]).unwrap();
        assert_eq!(set.to_string(), "3,7,9");
    }
}
