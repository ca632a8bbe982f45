//! Message identifiers: sequence numbers, UIDs, and UIDVALIDITY.

use std::num::NonZeroU32;

/// Message sequence number.
///
/// Sequence numbers are assigned to messages in a mailbox starting from 1.
/// They are ephemeral and change when messages are expunged, so nothing in
/// this crate persists them; they only appear in untagged responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message within a mailbox generation.
///
/// UIDs are provider-assigned, strictly ascending per folder generation, and
/// survive expunges. Combined with [`UidValidity`] they name a message
/// durably, which is what makes them usable as an interception watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a new UID.
    ///
    /// Returns `None` if the value is 0.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UIDVALIDITY value for a mailbox.
///
/// If this value changes between sessions, every cached UID for that mailbox
/// is stale and must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a new UIDVALIDITY.
    #[must_use]
    pub fn new(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self)
    }

    /// Returns the underlying value.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod seq_num_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(SeqNum::new(1).unwrap().get(), 1);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(SeqNum::new(0).is_none());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", SeqNum::new(42).unwrap()), "42");
        }
    }

    mod uid_tests {
        use super::*;

        #[test]
        fn new_valid() {
            assert_eq!(Uid::new(100).unwrap().get(), 100);
        }

        #[test]
        fn new_zero_returns_none() {
            assert!(Uid::new(0).is_none());
        }

        #[test]
        fn ordering() {
            assert!(Uid::new(100).unwrap() < Uid::new(200).unwrap());
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", Uid::new(12345).unwrap()), "12345");
        }
    }

    mod uid_validity_tests {
        use super::*;

        #[test]
        fn new_zero_returns_none() {
            assert!(UidValidity::new(0).is_none());
        }

        #[test]
        fn equality() {
            assert_eq!(UidValidity::new(7).unwrap(), UidValidity::new(7).unwrap());
            assert_ne!(UidValidity::new(7).unwrap(), UidValidity::new(8).unwrap());
        }
    }
}
