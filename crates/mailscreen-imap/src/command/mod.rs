//! IMAP command builders and serialization.
//!
//! Every data command this crate issues addresses messages by UID; the
//! sequence-number variants have no caller in the interception core and are
//! deliberately not modeled.

mod tag_generator;

use crate::types::{Flag, Mailbox, UidSet};

pub use tag_generator::TagGenerator;

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// Custom list of attributes.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// Items fetched when capturing a message for quarantine: the UID, the
    /// provider internal date, and the full raw message without touching
    /// the `\Seen` flag.
    #[must_use]
    pub fn capture() -> Self {
        Self::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::InternalDate,
            FetchAttribute::BodyPeek,
        ])
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message UID.
    Uid,
    /// Message flags.
    Flags,
    /// Provider-assigned internal date.
    InternalDate,
    /// RFC822 size in bytes.
    Rfc822Size,
    /// Full raw message via `BODY.PEEK[]` (does not set `\Seen`).
    BodyPeek,
}

impl FetchAttribute {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "UID",
            Self::Flags => "FLAGS",
            Self::InternalDate => "INTERNALDATE",
            Self::Rfc822Size => "RFC822.SIZE",
            Self::BodyPeek => "BODY.PEEK[]",
        }
    }
}

/// STORE action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace flags.
    SetFlags(Vec<Flag>),
    /// Add flags.
    AddFlags(Vec<Flag>),
    /// Remove flags.
    RemoveFlags(Vec<Flag>),
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command (keep-alive).
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
    },
    /// CREATE command.
    Create {
        /// Mailbox to create.
        mailbox: Mailbox,
    },
    /// UID SEARCH with a raw query string.
    UidSearch {
        /// Search criteria, e.g. `UID 120:*` or `ALL`.
        query: String,
    },
    /// UID FETCH command.
    UidFetch {
        /// UIDs to fetch.
        set: UidSet,
        /// Items to fetch.
        items: FetchItems,
    },
    /// UID STORE command.
    UidStore {
        /// UIDs to modify.
        set: UidSet,
        /// Flag action.
        action: StoreAction,
        /// Silent mode (no untagged FETCH echo).
        silent: bool,
    },
    /// UID COPY command.
    UidCopy {
        /// UIDs to copy.
        set: UidSet,
        /// Target mailbox.
        mailbox: Mailbox,
    },
    /// UID MOVE command (RFC 6851).
    UidMove {
        /// UIDs to move.
        set: UidSet,
        /// Target mailbox.
        mailbox: Mailbox,
    },
    /// EXPUNGE command.
    Expunge,
    /// APPEND command header.
    ///
    /// Serializes the command line with a literal size announcement; the
    /// message bytes follow after the server's continuation response.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags to set on the appended message.
        flags: Option<Vec<Flag>>,
        /// Internal date in IMAP date-time format, quoted verbatim.
        internal_date: Option<String>,
        /// Size in bytes of the literal that follows.
        size: usize,
    },
    /// CLOSE command (expunges and deselects).
    Close,
    /// IDLE command.
    Idle,
    /// DONE (terminates IDLE; carries no tag).
    Done,
}

impl Command {
    /// Serializes the command to bytes with the given tag, including the
    /// trailing CRLF.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        // DONE is the one untagged line the client ever sends
        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Create { mailbox } => {
                buf.extend_from_slice(b"CREATE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::UidSearch { query } => {
                buf.extend_from_slice(b"UID SEARCH ");
                buf.extend_from_slice(query.as_bytes());
            }

            Self::UidFetch { set, items } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::UidStore {
                set,
                action,
                silent,
            } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action, *silent);
            }

            Self::UidCopy { set, mailbox } => {
                buf.extend_from_slice(b"UID COPY ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }

            Self::UidMove { set, mailbox } => {
                buf.extend_from_slice(b"UID MOVE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }

            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::Append {
                mailbox,
                flags,
                internal_date,
                size,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_mailbox(&mut buf, mailbox);
                if let Some(flags) = flags {
                    buf.extend_from_slice(b" (");
                    for (i, flag) in flags.iter().enumerate() {
                        if i > 0 {
                            buf.push(b' ');
                        }
                        buf.extend_from_slice(flag.as_str().as_bytes());
                    }
                    buf.push(b')');
                }
                if let Some(date) = internal_date {
                    buf.extend_from_slice(format!(" \"{date}\"").as_bytes());
                }
                buf.extend_from_slice(format!(" {{{size}}}").as_bytes());
            }

            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Writes an astring (atom or quoted string).
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes a mailbox name.
fn write_mailbox(buf: &mut Vec<u8>, mailbox: &Mailbox) {
    write_astring(buf, mailbox.as_str());
}

/// Returns true if the byte forces quoted-string form.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// Writes FETCH items.
fn write_fetch_items(buf: &mut Vec<u8>, items: &FetchItems) {
    match items {
        FetchItems::Items(attrs) => {
            if let [single] = attrs.as_slice() {
                buf.extend_from_slice(single.as_str().as_bytes());
            } else {
                buf.push(b'(');
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    buf.extend_from_slice(attr.as_str().as_bytes());
                }
                buf.push(b')');
            }
        }
    }
}

/// Writes a STORE action.
fn write_store_action(buf: &mut Vec<u8>, action: &StoreAction, silent: bool) {
    let (prefix, flags) = match action {
        StoreAction::SetFlags(f) => ("FLAGS", f),
        StoreAction::AddFlags(f) => ("+FLAGS", f),
        StoreAction::RemoveFlags(f) => ("-FLAGS", f),
    };
    buf.extend_from_slice(prefix.as_bytes());
    if silent {
        buf.extend_from_slice(b".SILENT");
    }
    buf.extend_from_slice(b" (");
    for (i, flag) in flags.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(flag.as_str().as_bytes());
    }
    buf.push(b')');
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Uid;

    fn serialized(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("A0001")).unwrap()
    }

    #[test]
    fn login_quotes_password_with_spaces() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "p4ss word".to_string(),
        };
        assert_eq!(
            serialized(&cmd),
            "A0001 LOGIN user@example.com \"p4ss word\"\r\n"
        );
    }

    #[test]
    fn login_escapes_quotes() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "a\"b".to_string(),
        };
        assert_eq!(serialized(&cmd), "A0001 LOGIN user \"a\\\"b\"\r\n");
    }

    #[test]
    fn select_quotes_mailbox_with_space() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("Held Mail"),
        };
        assert_eq!(serialized(&cmd), "A0001 SELECT \"Held Mail\"\r\n");
    }

    #[test]
    fn uid_search_range() {
        let cmd = Command::UidSearch {
            query: "UID 120:*".to_string(),
        };
        assert_eq!(serialized(&cmd), "A0001 UID SEARCH UID 120:*\r\n");
    }

    #[test]
    fn uid_fetch_capture_items() {
        let cmd = Command::UidFetch {
            set: UidSet::single(Uid::new(42).unwrap()),
            items: FetchItems::capture(),
        };
        assert_eq!(
            serialized(&cmd),
            "A0001 UID FETCH 42 (UID INTERNALDATE BODY.PEEK[])\r\n"
        );
    }

    #[test]
    fn uid_store_deleted_silent() {
        let cmd = Command::UidStore {
            set: UidSet::single(Uid::new(7).unwrap()),
            action: StoreAction::AddFlags(vec![Flag::Deleted]),
            silent: true,
        };
        assert_eq!(
            serialized(&cmd),
            "A0001 UID STORE 7 +FLAGS.SILENT (\\Deleted)\r\n"
        );
    }

    #[test]
    fn uid_move_serializes_target() {
        let cmd = Command::UidMove {
            set: UidSet::single(Uid::new(9).unwrap()),
            mailbox: Mailbox::new("Quarantine"),
        };
        assert_eq!(serialized(&cmd), "A0001 UID MOVE 9 Quarantine\r\n");
    }

    #[test]
    fn append_with_date_and_literal() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("INBOX"),
            flags: Some(vec![Flag::Seen]),
            internal_date: Some("17-Jul-1996 02:44:25 -0700".to_string()),
            size: 310,
        };
        assert_eq!(
            serialized(&cmd),
            "A0001 APPEND INBOX (\\Seen) \"17-Jul-1996 02:44:25 -0700\" {310}\r\n"
        );
    }

    #[test]
    fn done_carries_no_tag() {
        assert_eq!(
            String::from_utf8(Command::Done.serialize("A0009")).unwrap(),
            "DONE\r\n"
        );
    }
}
