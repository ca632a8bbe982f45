//! # mailscreen-mime
//!
//! MIME parsing and rewriting for held-message release.
//!
//! The release path reconstructs a captured raw message, applies reviewer
//! edits (subject, body, attachment stripping), and re-serializes the result
//! for APPEND. Parsing is deliberately lenient — captured mail is whatever
//! the provider stored — while serialization keeps the original header order
//! and multipart boundary so an un-edited release round-trips faithfully.
//!
//! ## Example
//!
//! ```
//! use mailscreen_mime::Message;
//!
//! let raw = b"From: sender@example.com\r\n\
//!             Subject: INVOICE 42\r\n\
//!             \r\n\
//!             Please pay promptly.";
//!
//! let mut message = Message::parse(raw).unwrap();
//! message.set_subject("[EDITED] INVOICE 42");
//! let bytes = message.to_bytes();
//! assert!(bytes.starts_with(b"From: sender@example.com\r\n"));
//! ```

mod content_type;
pub mod encoding;
mod error;
mod header;
mod message;

pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Body, Message, Part, TransferEncoding};
