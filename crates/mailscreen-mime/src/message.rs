//! MIME message structure, parsing, editing, and serialization.

use std::fmt;

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a transfer encoding from its header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// One part of a multipart message.
///
/// The body is kept in its transfer-encoded form so untouched parts
/// round-trip exactly.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Raw (still transfer-encoded) part body.
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Creates a `text/plain` part carrying the given text as 8bit UTF-8.
    #[must_use]
    pub fn text_plain(text: &str) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", ContentType::text_plain().to_string());
        headers.add("Content-Transfer-Encoding", "8bit");
        Self::new(headers, text.as_bytes().to_vec())
    }

    /// Creates a `text/html` part carrying the given markup as 8bit UTF-8.
    #[must_use]
    pub fn text_html(html: &str) -> Self {
        let mut headers = Headers::new();
        headers.add("Content-Type", ContentType::text_html().to_string());
        headers.add("Content-Transfer-Encoding", "8bit");
        Self::new(headers, html.as_bytes().to_vec())
    }

    /// Gets the content type, defaulting to `text/plain`.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        decode_with(&self.body, self.transfer_encoding())
    }

    /// Gets the decoded body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or UTF-8 conversion fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        String::from_utf8(decoded).map_err(Into::into)
    }

    /// Returns true when this part is an attachment rather than message
    /// content: either announced via `Content-Disposition: attachment` or a
    /// non-text, non-multipart body.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if let Some(disposition) = self.headers.get("content-disposition") {
            let kind = disposition
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if kind == "attachment" {
                return true;
            }
            if kind == "inline" {
                return false;
            }
        }
        let ct = self.content_type();
        !ct.is_text() && !ct.is_multipart()
    }

    /// Best-effort attachment filename from `Content-Disposition` or the
    /// content-type `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        if let Some(disposition) = self.headers.get("content-disposition") {
            for param in disposition.split(';').skip(1) {
                if let Some((key, value)) = param.split_once('=')
                    && key.trim().eq_ignore_ascii_case("filename")
                {
                    return Some(value.trim().trim_matches('"').to_string());
                }
            }
        }
        self.content_type().parameters.get("name").cloned()
    }

    /// Re-parses this part as a nested message when it is itself multipart.
    #[must_use]
    pub fn as_nested_message(&self) -> Option<Message> {
        if !self.content_type().is_multipart() {
            return None;
        }
        let mut raw = self.headers.to_string().into_bytes();
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&self.body);
        Message::parse(&raw).ok()
    }
}

/// Message body: single-part bytes or multipart with a boundary.
#[derive(Debug, Clone)]
pub enum Body {
    /// Single-part raw (still transfer-encoded) body.
    Single(Vec<u8>),
    /// Multipart body.
    Multipart {
        /// The boundary string, without leading dashes.
        boundary: String,
        /// Parts in original order.
        parts: Vec<Part>,
    },
}

/// A parsed MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Top-level message headers, in original order.
    pub headers: Headers,
    /// Message body.
    pub body: Body,
}

impl Message {
    /// Parses a raw RFC 5322 message.
    ///
    /// Parsing is lenient: bare-LF line endings are accepted, and a message
    /// whose multipart boundary never matches degrades to single-part.
    ///
    /// # Errors
    ///
    /// Returns an error only when the input has no header/body structure at
    /// all (not valid UTF-8 in the header block).
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_bytes, body_bytes) = split_header_block(raw);
        let header_text = std::str::from_utf8(header_bytes)
            .map_err(|e| Error::Parse(format!("header block is not UTF-8: {e}")))?;
        let headers = Headers::parse(header_text);

        let content_type = headers
            .get("content-type")
            .and_then(|v| ContentType::parse(v).ok());

        let body = match content_type {
            Some(ct) if ct.is_multipart() => {
                let boundary = ct.boundary().ok_or(Error::MissingBoundary)?.to_string();
                let raw_parts = split_multipart(body_bytes, &boundary);
                if raw_parts.is_empty() {
                    Body::Single(body_bytes.to_vec())
                } else {
                    let parts = raw_parts
                        .into_iter()
                        .map(|raw_part| {
                            let (part_headers, part_body) = split_header_block(&raw_part);
                            let part_header_text = String::from_utf8_lossy(part_headers);
                            Part::new(Headers::parse(&part_header_text), part_body.to_vec())
                        })
                        .collect();
                    Body::Multipart { boundary, parts }
                }
            }
            _ => Body::Single(body_bytes.to_vec()),
        };

        Ok(Self { headers, body })
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("from")
    }

    /// Gets the To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.headers.get("to")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Replaces (or adds) the Subject header in place.
    pub fn set_subject(&mut self, subject: &str) {
        self.headers.set("Subject", subject);
    }

    /// Gets the transfer encoding of a single-part body.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Finds the first `text/plain` body, descending into nested multiparts.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        self.find_text_body("plain")
    }

    /// Finds the first `text/html` body, descending into nested multiparts.
    #[must_use]
    pub fn body_html(&self) -> Option<String> {
        self.find_text_body("html")
    }

    fn find_text_body(&self, sub_type: &str) -> Option<String> {
        match &self.body {
            Body::Single(body) => {
                let ct = self
                    .headers
                    .get("content-type")
                    .and_then(|v| ContentType::parse(v).ok())
                    .unwrap_or_else(ContentType::text_plain);
                if ct.is("text", sub_type) {
                    decode_with(body, self.transfer_encoding())
                        .ok()
                        .map(|b| String::from_utf8_lossy(&b).into_owned())
                } else {
                    None
                }
            }
            Body::Multipart { parts, .. } => {
                for part in parts {
                    if part.content_type().is("text", sub_type) {
                        return part.body_text().ok();
                    }
                    if let Some(nested) = part.as_nested_message()
                        && let Some(text) = nested.find_text_body(sub_type)
                    {
                        return Some(text);
                    }
                }
                None
            }
        }
    }

    /// Replaces the primary plain-text body with the given text.
    ///
    /// For multipart messages the first `text/plain` part is replaced and
    /// any `text/html` part is refreshed from the same text so clients that
    /// prefer HTML display the edit too. A multipart message without a text
    /// part gains one at the front. Single-part messages become plain-text
    /// messages carrying the new body.
    pub fn replace_text_body(&mut self, text: &str) {
        match &mut self.body {
            Body::Single(body) => {
                *body = text.as_bytes().to_vec();
                self.headers
                    .set("Content-Type", ContentType::text_plain().to_string());
                self.headers.set("Content-Transfer-Encoding", "8bit");
            }
            Body::Multipart { parts, .. } => {
                if !replace_text_parts(parts, text) {
                    parts.insert(0, Part::text_plain(text));
                }
            }
        }
    }

    /// Removes every attachment part, keeping only textual content.
    ///
    /// The message collapses to `text/plain`, or `multipart/alternative`
    /// when an HTML part is present. A manifest note listing the removed
    /// filenames is appended to the plain-text body. Returns the removed
    /// filenames; an empty list means the message carried no attachments
    /// and was left untouched.
    pub fn strip_attachments(&mut self) -> Vec<String> {
        let Body::Multipart { boundary, parts } = &self.body else {
            return Vec::new();
        };

        let mut plain: Option<String> = None;
        let mut html: Option<String> = None;
        let mut removed = Vec::new();
        collect_textual_content(parts, &mut plain, &mut html, &mut removed);

        if removed.is_empty() {
            return removed;
        }

        let mut plain = plain.unwrap_or_default();
        let notice = format!("\r\n\r\n[Attachments removed: {}]", removed.join(", "));
        plain.push_str(&notice);

        // Reusing the original boundary is safe: the retained text content
        // was delimited by it, so it cannot appear inside.
        let boundary = boundary.clone();
        self.headers.remove("Content-Transfer-Encoding");
        if let Some(html) = html {
            self.headers.set(
                "Content-Type",
                ContentType::multipart_alternative(&boundary).to_string(),
            );
            self.body = Body::Multipart {
                boundary,
                parts: vec![Part::text_plain(&plain), Part::text_html(&html)],
            };
        } else {
            self.headers
                .set("Content-Type", ContentType::text_plain().to_string());
            self.headers.set("Content-Transfer-Encoding", "8bit");
            self.body = Body::Single(plain.into_bytes());
        }

        removed
    }

    /// Serializes the message back to wire format.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.headers.to_string().into_bytes();
        out.extend_from_slice(b"\r\n");

        match &self.body {
            Body::Single(body) => out.extend_from_slice(body),
            Body::Multipart { boundary, parts } => {
                for part in parts {
                    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
                    out.extend_from_slice(part.headers.to_string().as_bytes());
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(&part.body);
                    if !part.body.ends_with(b"\r\n") {
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
            }
        }

        out
    }
}

/// Replaces text parts in place, recursing into nested multiparts.
///
/// Returns true if a plain-text part was found and replaced.
fn replace_text_parts(parts: &mut [Part], text: &str) -> bool {
    let mut replaced_plain = false;
    let mut replaced_html = false;

    for part in parts.iter_mut() {
        let ct = part.content_type();
        if ct.is("text", "plain") && !replaced_plain {
            part.body = text.as_bytes().to_vec();
            part.headers
                .set("Content-Type", ContentType::text_plain().to_string());
            part.headers.set("Content-Transfer-Encoding", "8bit");
            replaced_plain = true;
        } else if ct.is("text", "html") && !replaced_html {
            let html = format!("<div>{}</div>", text.replace('\n', "<br>"));
            part.body = html.into_bytes();
            part.headers
                .set("Content-Type", ContentType::text_html().to_string());
            part.headers.set("Content-Transfer-Encoding", "8bit");
            replaced_html = true;
        } else if ct.is_multipart()
            && !replaced_plain
            && let Some(mut nested) = part.as_nested_message()
        {
            nested.replace_text_body(text);
            let serialized = nested.to_bytes();
            let (_, nested_body) = split_header_block(&serialized);
            part.body = nested_body.to_vec();
            replaced_plain = true;
        }
    }

    replaced_plain
}

/// Walks parts collecting the first plain/html bodies and attachment names.
fn collect_textual_content(
    parts: &[Part],
    plain: &mut Option<String>,
    html: &mut Option<String>,
    removed: &mut Vec<String>,
) {
    for part in parts {
        let ct = part.content_type();
        if ct.is_multipart() {
            if let Some(nested) = part.as_nested_message()
                && let Body::Multipart {
                    parts: nested_parts,
                    ..
                } = &nested.body
            {
                collect_textual_content(nested_parts, plain, html, removed);
            }
        } else if part.is_attachment() {
            removed.push(part.filename().unwrap_or_else(|| "attachment.bin".to_string()));
        } else if ct.is("text", "plain") {
            if plain.is_none() {
                *plain = part.body_text().ok();
            }
        } else if ct.is("text", "html") && html.is_none() {
            *html = part.body_text().ok();
        }
    }
}

/// Splits a raw message into header block and body at the first blank line.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find_subslice(raw, b"\r\n\r\n") {
        (&raw[..pos], &raw[pos + 4..])
    } else if let Some(pos) = find_subslice(raw, b"\n\n") {
        (&raw[..pos], &raw[pos + 2..])
    } else {
        (raw, &[])
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits a multipart body into raw parts using the boundary.
///
/// Returns the bytes of each part (headers + body), excluding the boundary
/// lines themselves and the trailing CRLF that precedes each boundary.
fn split_multipart(body: &[u8], boundary: &str) -> Vec<Vec<u8>> {
    let delimiter = format!("--{boundary}");
    let terminator = format!("--{boundary}--");

    let mut parts = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    for line in LineIter::new(body) {
        let trimmed = trim_line(line);

        if trimmed == terminator.as_bytes() {
            if let Some(part) = current.take() {
                parts.push(strip_trailing_crlf(part));
            }
            break;
        }

        if trimmed == delimiter.as_bytes() {
            if let Some(part) = current.take() {
                parts.push(strip_trailing_crlf(part));
            }
            current = Some(Vec::new());
            continue;
        }

        if let Some(part) = current.as_mut() {
            part.extend_from_slice(line);
        }
        // content before the first boundary (the preamble) is dropped
    }

    // tolerate a missing terminator line
    if let Some(part) = current.take() {
        parts.push(strip_trailing_crlf(part));
    }

    parts
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\r' || line[end - 1] == b'\n' || line[end - 1] == b' ') {
        end -= 1;
    }
    &line[..end]
}

fn strip_trailing_crlf(mut part: Vec<u8>) -> Vec<u8> {
    if part.ends_with(b"\r\n") {
        part.truncate(part.len() - 2);
    } else if part.ends_with(b"\n") {
        part.truncate(part.len() - 1);
    }
    part
}

/// Iterates over lines including their terminators.
struct LineIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LineIter<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for LineIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.buf[start..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |p| p + 1);
        self.pos = start + end;
        Some(&self.buf[start..start + end])
    }
}

fn decode_with(body: &[u8], encoding: TransferEncoding) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::Base64 => {
            let body_str = String::from_utf8_lossy(body);
            let cleaned: String = body_str.chars().filter(|c| !c.is_whitespace()).collect();
            decode_base64(&cleaned)
        }
        TransferEncoding::QuotedPrintable => {
            let body_str = String::from_utf8_lossy(body);
            decode_quoted_printable(&body_str)
        }
        _ => Ok(body.to_vec()),
    }
}
