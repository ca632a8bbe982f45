//! MIME header handling.
//!
//! Headers keep their original order and spelling. A released message should
//! differ from the capture only where the reviewer edited it, so the header
//! block must round-trip byte-for-byte when untouched; lookups are
//! case-insensitive per RFC 5322.

use std::fmt;

/// Ordered collection of email headers.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header, preserving insertion order.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces the first occurrence of a header in place, or appends it.
    ///
    /// Any additional occurrences are removed so the result carries the
    /// header exactly once.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let mut replaced = false;
        self.entries.retain_mut(|(n, v)| {
            if n.eq_ignore_ascii_case(name) {
                if replaced {
                    return false;
                }
                *v = value.clone();
                replaced = true;
            }
            true
        });
        if !replaced {
            self.entries.push((name.to_string(), value));
        }
    }

    /// Gets the first value for a header (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all occurrences of a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over headers in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a raw header block, unfolding continuation lines.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                // continuation of the previous header
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            } else {
                if let Some((name, value)) = current.take() {
                    headers.add(name, value);
                }
                if let Some((name, value)) = line.split_once(':') {
                    current = Some((name.trim().to_string(), value.trim().to_string()));
                }
                // lines without a colon are malformed; dropped silently
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }

        headers
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.add("From", "a@example.com");
        headers.add("Subject", "original");
        headers.add("To", "b@example.com");

        headers.set("Subject", "edited");

        let order: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["From", "Subject", "To"]);
        assert_eq!(headers.get("Subject"), Some("edited"));
    }

    #[test]
    fn set_appends_when_missing() {
        let mut headers = Headers::new();
        headers.set("Subject", "new");
        assert_eq!(headers.get("Subject"), Some("new"));
    }

    #[test]
    fn set_collapses_duplicates() {
        let mut headers = Headers::new();
        headers.add("Received", "hop1");
        headers.add("Subject", "a");
        headers.add("Subject", "b");
        headers.set("Subject", "only");
        assert_eq!(headers.iter().filter(|(n, _)| *n == "Subject").count(), 1);
    }

    #[test]
    fn parse_with_continuation() {
        let text = "From: sender@example.com\r\n\
                    Content-Type: multipart/mixed;\r\n\
                    \tboundary=abc123\r\n\
                    Subject: Test\r\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("multipart/mixed; boundary=abc123")
        );
        assert_eq!(headers.get("Subject"), Some("Test"));
    }

    #[test]
    fn display_preserves_order_and_case() {
        let mut headers = Headers::new();
        headers.add("X-Custom", "1");
        headers.add("from", "a@example.com");
        assert_eq!(headers.to_string(), "X-Custom: 1\r\nfrom: a@example.com\r\n");
    }
}
