//! IMAP response parser.
//!
//! Parses single server responses (one line plus any embedded literals, as
//! framed by [`crate::connection::FramedStream`]) into typed values. The
//! grammar covered is the subset the client issues: status responses with
//! optional bracketed codes, CAPABILITY, EXISTS/RECENT/EXPUNGE, SEARCH, and
//! FETCH with UID/FLAGS/INTERNALDATE/RFC822.SIZE/BODY[] items.

use crate::types::{Capability, Flag, Flags, ResponseCode, SeqNum, Status, Uid};
use crate::{Error, Result};

/// A parsed server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged completion response.
    Tagged {
        /// Command tag this response completes.
        tag: String,
        /// Completion status.
        status: Status,
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged (`*`) response.
    Untagged(UntaggedResponse),
    /// Continuation request (`+`).
    Continuation {
        /// Text after the `+`.
        text: String,
    },
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// OK response with optional code.
    Ok {
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO response.
    No {
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD response.
    Bad {
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Optional bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE (server is disconnecting).
    Bye {
        /// Human-readable text.
        text: String,
    },
    /// Capability listing.
    Capability(Vec<Capability>),
    /// Message count in the selected mailbox.
    Exists(u32),
    /// Recent message count.
    Recent(u32),
    /// A message was expunged.
    Expunge(SeqNum),
    /// SEARCH result. For `UID SEARCH` the numbers are UIDs.
    Search(Vec<Uid>),
    /// Flags defined for the mailbox.
    Flags(Flags),
    /// FETCH data for one message.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetched items.
        items: Vec<FetchItem>,
    },
}

/// One item inside a FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// Message UID.
    Uid(Uid),
    /// Message flags.
    Flags(Flags),
    /// Provider internal date, verbatim (e.g. `17-Jul-1996 02:44:25 -0700`).
    InternalDate(String),
    /// RFC822 size in bytes.
    Rfc822Size(u32),
    /// Raw message bytes from `BODY[]`, `None` for NIL.
    Body(Option<Vec<u8>>),
}

/// Parser entry point.
#[derive(Debug)]
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a single framed response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when the input does not match the supported
    /// grammar.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut cur = Cursor::new(input);

        if cur.eat(b'+') {
            cur.skip_space();
            return Ok(Response::Continuation {
                text: cur.rest_as_text(),
            });
        }

        if cur.eat(b'*') {
            cur.skip_space();
            return parse_untagged(&mut cur).map(Response::Untagged);
        }

        // Tagged response: tag SP status [code] text
        let tag = cur.read_atom()?;
        cur.skip_space();
        let status = parse_status(&cur.read_atom()?)?;
        cur.skip_space();
        let code = parse_optional_code(&mut cur);
        Ok(Response::Tagged {
            tag,
            status,
            code,
            text: cur.rest_as_text(),
        })
    }
}

fn parse_status(word: &str) -> Result<Status> {
    match word.to_uppercase().as_str() {
        "OK" => Ok(Status::Ok),
        "NO" => Ok(Status::No),
        "BAD" => Ok(Status::Bad),
        "PREAUTH" => Ok(Status::PreAuth),
        "BYE" => Ok(Status::Bye),
        other => Err(Error::Parse(format!("unknown status: {other}"))),
    }
}

fn parse_untagged(cur: &mut Cursor<'_>) -> Result<UntaggedResponse> {
    // Numeric prefix: EXISTS / RECENT / EXPUNGE / FETCH
    if cur.peek().is_some_and(|b| b.is_ascii_digit()) {
        let n = cur.read_number()?;
        cur.skip_space();
        let word = cur.read_atom()?;
        return match word.to_uppercase().as_str() {
            "EXISTS" => Ok(UntaggedResponse::Exists(n)),
            "RECENT" => Ok(UntaggedResponse::Recent(n)),
            "EXPUNGE" => SeqNum::new(n)
                .map(UntaggedResponse::Expunge)
                .ok_or_else(|| Error::Parse("expunge of sequence number 0".to_string())),
            "FETCH" => {
                let seq = SeqNum::new(n)
                    .ok_or_else(|| Error::Parse("fetch of sequence number 0".to_string()))?;
                cur.skip_space();
                let items = parse_fetch_items(cur)?;
                Ok(UntaggedResponse::Fetch { seq, items })
            }
            other => Err(Error::Parse(format!("unknown numeric response: {other}"))),
        };
    }

    let word = cur.read_atom()?;
    cur.skip_space();
    match word.to_uppercase().as_str() {
        "OK" => {
            let code = parse_optional_code(cur);
            Ok(UntaggedResponse::Ok {
                code,
                text: cur.rest_as_text(),
            })
        }
        "NO" => {
            let code = parse_optional_code(cur);
            Ok(UntaggedResponse::No {
                code,
                text: cur.rest_as_text(),
            })
        }
        "BAD" => {
            let code = parse_optional_code(cur);
            Ok(UntaggedResponse::Bad {
                code,
                text: cur.rest_as_text(),
            })
        }
        "PREAUTH" => {
            let code = parse_optional_code(cur);
            Ok(UntaggedResponse::PreAuth {
                code,
                text: cur.rest_as_text(),
            })
        }
        "BYE" => Ok(UntaggedResponse::Bye {
            text: cur.rest_as_text(),
        }),
        "CAPABILITY" => {
            let mut caps = Vec::new();
            while !cur.at_line_end() {
                caps.push(Capability::parse(&cur.read_atom()?));
                cur.skip_space();
            }
            Ok(UntaggedResponse::Capability(caps))
        }
        "SEARCH" => {
            let mut uids = Vec::new();
            while !cur.at_line_end() {
                let n = cur.read_number()?;
                if let Some(uid) = Uid::new(n) {
                    uids.push(uid);
                }
                cur.skip_space();
            }
            Ok(UntaggedResponse::Search(uids))
        }
        "FLAGS" => {
            let flags = parse_flag_list(cur)?;
            Ok(UntaggedResponse::Flags(flags))
        }
        other => Err(Error::Parse(format!("unknown untagged response: {other}"))),
    }
}

/// Parses an optional `[...]` response code at the cursor.
fn parse_optional_code(cur: &mut Cursor<'_>) -> Option<ResponseCode> {
    if cur.peek() != Some(b'[') {
        return None;
    }
    cur.advance();
    let contents = cur.read_until(b']');
    cur.advance(); // consume ']'
    cur.skip_space();
    Some(ResponseCode::parse(&String::from_utf8_lossy(&contents)))
}

/// Parses a parenthesized flag list: `(\Seen \Deleted)`.
fn parse_flag_list(cur: &mut Cursor<'_>) -> Result<Flags> {
    cur.expect(b'(')?;
    let mut flags = Flags::new();
    loop {
        cur.skip_space();
        if cur.eat(b')') {
            break;
        }
        flags.insert(Flag::parse(&cur.read_atom()?));
    }
    Ok(flags)
}

/// Parses the parenthesized item list of a FETCH response.
fn parse_fetch_items(cur: &mut Cursor<'_>) -> Result<Vec<FetchItem>> {
    cur.expect(b'(')?;
    let mut items = Vec::new();

    loop {
        cur.skip_space();
        if cur.eat(b')') {
            break;
        }
        let name = cur.read_fetch_item_name()?;
        cur.skip_space();

        match name.to_uppercase().as_str() {
            "UID" => {
                let n = cur.read_number()?;
                let uid = Uid::new(n).ok_or_else(|| Error::Parse("UID 0".to_string()))?;
                items.push(FetchItem::Uid(uid));
            }
            "FLAGS" => items.push(FetchItem::Flags(parse_flag_list(cur)?)),
            "INTERNALDATE" => {
                let date = cur.read_quoted()?;
                items.push(FetchItem::InternalDate(date));
            }
            "RFC822.SIZE" => items.push(FetchItem::Rfc822Size(cur.read_number()?)),
            // BODY[] / BODY[]<origin> / RFC822 all deliver the raw message
            n if n.starts_with("BODY[") || n == "RFC822" => {
                items.push(FetchItem::Body(cur.read_nstring()?));
            }
            _ => {
                // Unrequested item from a chatty server; skip its value.
                cur.skip_value()?;
            }
        }
    }

    Ok(items)
}

/// Byte cursor over a single framed response.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "expected {:?} at position {}",
                char::from(b),
                self.pos
            )))
        }
    }

    fn skip_space(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'\r' | b'\n'))
    }

    /// Reads an atom: bytes up to space, bracket, paren, or line end.
    fn read_atom(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b' ' | b'\r' | b'\n' | b'(' | b')' | b'[' | b']') {
                break;
            }
            self.advance();
        }
        if self.pos == start {
            return Err(Error::Parse(format!("expected atom at position {start}")));
        }
        Ok(String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned())
    }

    /// Reads a FETCH item name, which may include a bracketed section like
    /// `BODY[]` or `BODY[HEADER]`.
    fn read_fetch_item_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'[' => {
                    // include the bracketed section in the name
                    while let Some(inner) = self.peek() {
                        self.advance();
                        if inner == b']' {
                            break;
                        }
                    }
                }
                b' ' | b'\r' | b'\n' | b'(' | b')' => break,
                _ => self.advance(),
            }
        }
        if self.pos == start {
            return Err(Error::Parse(format!(
                "expected fetch item at position {start}"
            )));
        }
        // BODY[]<0> partial markers are folded into the name as well
        Ok(String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned())
    }

    fn read_number(&mut self) -> Result<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(Error::Parse(format!("expected number at position {start}")));
        }
        std::str::from_utf8(&self.buf[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::Parse("number out of range".to_string()))
    }

    /// Reads a quoted string, handling backslash escapes.
    fn read_quoted(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    if let Some(b) = self.peek() {
                        out.push(b);
                        self.advance();
                    }
                }
                Some(b) => {
                    out.push(b);
                    self.advance();
                }
                None => return Err(Error::Parse("unterminated quoted string".to_string())),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Reads an nstring value: literal, quoted string, or NIL.
    fn read_nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.peek() {
            Some(b'{') => self.read_literal().map(Some),
            Some(b'"') => self.read_quoted().map(|s| Some(s.into_bytes())),
            _ => {
                let atom = self.read_atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(None)
                } else {
                    Err(Error::Parse(format!("expected nstring, got {atom}")))
                }
            }
        }
    }

    /// Reads a `{n}\r\n<n bytes>` literal.
    fn read_literal(&mut self) -> Result<Vec<u8>> {
        self.expect(b'{')?;
        let len = self.read_number()? as usize;
        // tolerate the non-synchronizing marker
        self.eat(b'+');
        self.expect(b'}')?;
        self.eat(b'\r');
        self.expect(b'\n')?;
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(Error::Parse("literal extends past response".to_string()));
        }
        let data = self.buf[self.pos..end].to_vec();
        self.pos = end;
        Ok(data)
    }

    /// Skips one value of any supported shape (for unrequested items).
    fn skip_value(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'(') => {
                let mut depth = 0usize;
                while let Some(b) = self.peek() {
                    self.advance();
                    match b {
                        b'(' => depth += 1,
                        b')' => {
                            depth -= 1;
                            if depth == 0 {
                                return Ok(());
                            }
                        }
                        b'"' => {
                            // skip quoted content inside the list
                            while let Some(q) = self.peek() {
                                self.advance();
                                if q == b'\\' {
                                    self.advance();
                                } else if q == b'"' {
                                    break;
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Err(Error::Parse("unterminated parenthesized value".to_string()))
            }
            Some(b'{') => self.read_literal().map(|_| ()),
            Some(b'"') => self.read_quoted().map(|_| ()),
            _ => self.read_atom().map(|_| ()),
        }
    }

    /// Reads bytes until the given terminator, without consuming it.
    fn read_until(&mut self, terminator: u8) -> Vec<u8> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == terminator {
                break;
            }
            self.advance();
        }
        self.buf[start..self.pos].to_vec()
    }

    /// Returns the remaining input as trimmed text.
    fn rest_as_text(&self) -> String {
        String::from_utf8_lossy(&self.buf[self.pos..])
            .trim_end_matches(['\r', '\n'])
            .trim()
            .to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::UidValidity;

    #[test]
    fn parse_greeting_with_capabilities() {
        let response = b"* OK [CAPABILITY IMAP4rev1 IDLE MOVE UIDPLUS] server ready\r\n";
        let parsed = ResponseParser::parse(response).unwrap();

        let Response::Untagged(UntaggedResponse::Ok {
            code: Some(ResponseCode::Capability(caps)),
            text,
        }) = parsed
        else {
            panic!("expected OK with capability code");
        };
        assert!(caps.contains(&Capability::Idle));
        assert!(caps.contains(&Capability::Move));
        assert_eq!(text, "server ready");
    }

    #[test]
    fn parse_capability_line() {
        let parsed = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Capability(caps)) = parsed else {
            panic!("expected capability response");
        };
        assert_eq!(caps.len(), 2);
    }

    #[test]
    fn parse_exists() {
        let parsed = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
        assert_eq!(parsed, Response::Untagged(UntaggedResponse::Exists(23)));
    }

    #[test]
    fn parse_expunge() {
        let parsed = ResponseParser::parse(b"* 4 EXPUNGE\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Untagged(UntaggedResponse::Expunge(SeqNum::new(4).unwrap()))
        );
    }

    #[test]
    fn parse_search_results() {
        let parsed = ResponseParser::parse(b"* SEARCH 120 121 130\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Search(uids)) = parsed else {
            panic!("expected search response");
        };
        assert_eq!(
            uids,
            vec![
                Uid::new(120).unwrap(),
                Uid::new(121).unwrap(),
                Uid::new(130).unwrap()
            ]
        );
    }

    #[test]
    fn parse_empty_search() {
        let parsed = ResponseParser::parse(b"* SEARCH\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Untagged(UntaggedResponse::Search(Vec::new()))
        );
    }

    #[test]
    fn parse_uidvalidity_code() {
        let parsed = ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Ok {
            code: Some(ResponseCode::UidValidity(v)),
            ..
        }) = parsed
        else {
            panic!("expected UIDVALIDITY code");
        };
        assert_eq!(v, UidValidity::new(3_857_529_045).unwrap());
    }

    #[test]
    fn parse_fetch_with_uid_and_flags() {
        let parsed = ResponseParser::parse(b"* 12 FETCH (FLAGS (\\Seen) UID 100)\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Fetch { seq, items }) = parsed else {
            panic!("expected fetch response");
        };
        assert_eq!(seq, SeqNum::new(12).unwrap());
        assert!(items.contains(&FetchItem::Uid(Uid::new(100).unwrap())));
        assert!(
            items
                .iter()
                .any(|i| matches!(i, FetchItem::Flags(f) if f.contains(&Flag::Seen)))
        );
    }

    #[test]
    fn parse_fetch_with_literal_body() {
        let parsed = ResponseParser::parse(
            b"* 1 FETCH (UID 7 INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" BODY[] {5}\r\nhello)\r\n",
        )
        .unwrap();
        let Response::Untagged(UntaggedResponse::Fetch { items, .. }) = parsed else {
            panic!("expected fetch response");
        };
        assert!(items.contains(&FetchItem::Body(Some(b"hello".to_vec()))));
        assert!(items.contains(&FetchItem::InternalDate(
            "17-Jul-1996 02:44:25 -0700".to_string()
        )));
    }

    #[test]
    fn parse_fetch_nil_body() {
        let parsed = ResponseParser::parse(b"* 1 FETCH (UID 7 BODY[] NIL)\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Fetch { items, .. }) = parsed else {
            panic!("expected fetch response");
        };
        assert!(items.contains(&FetchItem::Body(None)));
    }

    #[test]
    fn parse_fetch_skips_unrequested_items() {
        let parsed =
            ResponseParser::parse(b"* 3 FETCH (MODSEQ (12345) UID 9 RFC822.SIZE 44827)\r\n")
                .unwrap();
        let Response::Untagged(UntaggedResponse::Fetch { items, .. }) = parsed else {
            panic!("expected fetch response");
        };
        assert!(items.contains(&FetchItem::Uid(Uid::new(9).unwrap())));
        assert!(items.contains(&FetchItem::Rfc822Size(44827)));
    }

    #[test]
    fn parse_tagged_ok() {
        let parsed = ResponseParser::parse(b"A0003 OK FETCH completed\r\n").unwrap();
        let Response::Tagged {
            tag, status, text, ..
        } = parsed
        else {
            panic!("expected tagged response");
        };
        assert_eq!(tag, "A0003");
        assert_eq!(status, Status::Ok);
        assert_eq!(text, "FETCH completed");
    }

    #[test]
    fn parse_tagged_appenduid() {
        let parsed = ResponseParser::parse(b"A0007 OK [APPENDUID 38505 3955] APPEND done\r\n")
            .unwrap();
        let Response::Tagged {
            code: Some(ResponseCode::AppendUid { uid, .. }),
            ..
        } = parsed
        else {
            panic!("expected APPENDUID code");
        };
        assert_eq!(uid, Uid::new(3955).unwrap());
    }

    #[test]
    fn parse_tagged_no() {
        let parsed = ResponseParser::parse(b"A0001 NO [TRYCREATE] mailbox missing\r\n").unwrap();
        let Response::Tagged { status, code, .. } = parsed else {
            panic!("expected tagged response");
        };
        assert_eq!(status, Status::No);
        assert_eq!(code, Some(ResponseCode::TryCreate));
    }

    #[test]
    fn parse_continuation() {
        let parsed = ResponseParser::parse(b"+ Ready for literal data\r\n").unwrap();
        assert_eq!(
            parsed,
            Response::Continuation {
                text: "Ready for literal data".to_string()
            }
        );
    }

    #[test]
    fn parse_bye() {
        let parsed = ResponseParser::parse(b"* BYE Autologout; idle for too long\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Bye { text }) = parsed else {
            panic!("expected BYE");
        };
        assert!(text.contains("Autologout"));
    }

    #[test]
    fn reject_garbage() {
        assert!(ResponseParser::parse(b"* 5 FROBNICATE\r\n").is_err());
    }
}
