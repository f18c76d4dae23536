//! Scope grammar: stateless tokenizing functions over a byte window.
//!
//! ```text
//! File   = Signature Scope*
//! Scope  = Name "\n" (Field | Scope)* "ENDSCOPE\n"
//! Field  = Key ": " (QuotedString | FixedWidthBinary | RawPayload) "\n"
//! ```
//!
//! Every function takes the window, a [`Cursor`] and returns
//! [`Step::Incomplete`] without moving the cursor when the window ends
//! before the token does. Tokens are returned as ranges into the window so
//! the caller may refill and compact its buffer between calls.

use std::ops::Range;

use thiserror::Error;

use super::format::END_SCOPE;

/// Position inside the window plus the current line number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    pub pos: usize,
    pub line: u32,
}

impl Default for Cursor {
    fn default() -> Self {
        Self { pos: 0, line: 1 }
    }
}

/// Outcome of a tokenizing step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<T> {
    Ready(T),
    /// The window ends mid-token; refill and retry.
    Incomplete,
}

/// Line-level tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// Identifier alone on its line: a scope name or `ENDSCOPE`.
    Marker(Range<usize>),
    /// Identifier followed by `": "`. The cursor is left on the payload.
    Key(Range<usize>),
    /// Only insignificant bytes remain and the input is exhausted.
    End,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("unexpected byte 0x{byte:02x}, expected {expected}")]
    Unexpected { byte: u8, expected: &'static str },
    #[error("field key must be followed by ': '")]
    MissingSeparator,
}

pub type GrammarResult<T> = std::result::Result<Step<T>, GrammarError>;

/// Byte classes the tokenizer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteClass {
    /// Space, tab or carriage return.
    Space,
    LineEnd,
    /// Part of a scope name or key.
    Ident,
    /// Key-value separator `:`.
    Separator,
    /// String statement delimiter `"`.
    Quote,
    Other,
}

#[inline]
pub fn classify(byte: u8) -> ByteClass {
    match byte {
        b' ' | b'\t' | b'\r' => ByteClass::Space,
        b'\n' => ByteClass::LineEnd,
        b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => ByteClass::Ident,
        b':' => ByteClass::Separator,
        b'"' => ByteClass::Quote,
        _ => ByteClass::Other,
    }
}

/// Whether a marker token closes the innermost scope.
#[inline]
pub fn is_end_scope(name: &[u8]) -> bool {
    name == END_SCOPE
}

/// Skip spaces, tabs, carriage returns and blank lines.
pub fn skip_insignificant(input: &[u8], cur: &mut Cursor) {
    while let Some(&b) = input.get(cur.pos) {
        match classify(b) {
            ByteClass::Space => {}
            ByteClass::LineEnd => cur.line += 1,
            _ => break,
        }
        cur.pos += 1;
    }
}

/// Skip spaces, tabs and carriage returns on the current line.
fn skip_spaces(input: &[u8], pos: &mut usize) {
    while input.get(*pos).map(|&b| classify(b)) == Some(ByteClass::Space) {
        *pos += 1;
    }
}

/// Read the next scope marker or field key.
pub fn next_token(input: &[u8], cur: &mut Cursor, at_eof: bool) -> GrammarResult<Token> {
    let mut c = *cur;
    skip_insignificant(input, &mut c);

    if c.pos == input.len() {
        if at_eof {
            *cur = c;
            return Ok(Step::Ready(Token::End));
        }
        return Ok(Step::Incomplete);
    }

    let start = c.pos;
    let mut pos = start;
    while input.get(pos).map(|&b| classify(b)) == Some(ByteClass::Ident) {
        pos += 1;
    }
    if pos == start {
        return Err(GrammarError::Unexpected {
            byte: input[pos],
            expected: "scope name or field key",
        });
    }
    let ident = start..pos;

    let Some(&next) = input.get(pos) else {
        return Ok(Step::Incomplete);
    };
    match classify(next) {
        ByteClass::Separator => match input.get(pos + 1) {
            None => Ok(Step::Incomplete),
            Some(b' ') => {
                cur.pos = pos + 2;
                cur.line = c.line;
                Ok(Step::Ready(Token::Key(ident)))
            }
            Some(_) => Err(GrammarError::MissingSeparator),
        },
        ByteClass::LineEnd | ByteClass::Space => {
            skip_spaces(input, &mut pos);
            match input.get(pos) {
                None => Ok(Step::Incomplete),
                Some(b'\n') => {
                    cur.pos = pos + 1;
                    cur.line = c.line + 1;
                    Ok(Step::Ready(Token::Marker(ident)))
                }
                Some(&byte) => Err(GrammarError::Unexpected {
                    byte,
                    expected: "line end after scope name",
                }),
            }
        }
        _ => Err(GrammarError::Unexpected {
            byte: next,
            expected: "': ' or line end",
        }),
    }
}

/// Read a quoted string payload, returning the range between the quotes.
///
/// The string ends at the first `"` directly followed by a line end, so
/// quotes inside the text need no escaping.
pub fn read_quoted(input: &[u8], cur: &mut Cursor) -> GrammarResult<Range<usize>> {
    let mut pos = cur.pos;
    skip_spaces(input, &mut pos);
    match input.get(pos) {
        None => return Ok(Step::Incomplete),
        Some(b'"') => {}
        Some(&byte) => {
            return Err(GrammarError::Unexpected {
                byte,
                expected: "opening '\"'",
            })
        }
    }
    let open = pos + 1;
    let Some(close) = input[open..]
        .windows(2)
        .position(|w| w == b"\"\n")
        .map(|i| open + i)
    else {
        return Ok(Step::Incomplete);
    };

    let inner_lines = input[open..close].iter().filter(|&&b| b == b'\n').count() as u32;
    cur.pos = close + 2;
    cur.line += 1 + inner_lines;
    Ok(Step::Ready(open..close))
}

/// Take exactly `n` payload bytes.
pub fn take_fixed(input: &[u8], cur: &mut Cursor, n: usize) -> Step<Range<usize>> {
    if input.len().saturating_sub(cur.pos) < n {
        return Step::Incomplete;
    }
    let range = cur.pos..cur.pos + n;
    cur.pos += n;
    Step::Ready(range)
}

/// Consume the line end that terminates a binary payload.
pub fn expect_line_end(input: &[u8], cur: &mut Cursor) -> GrammarResult<()> {
    let mut pos = cur.pos;
    skip_spaces(input, &mut pos);
    match input.get(pos) {
        None => Ok(Step::Incomplete),
        Some(b'\n') => {
            cur.pos = pos + 1;
            cur.line += 1;
            Ok(Step::Ready(()))
        }
        Some(&byte) => Err(GrammarError::Unexpected {
            byte,
            expected: "line end after value",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(input: &[u8], at_eof: bool) -> (GrammarResult<Token>, Cursor) {
        let mut cur = Cursor::default();
        let r = next_token(input, &mut cur, at_eof);
        (r, cur)
    }

    #[test]
    fn test_marker_and_key() {
        let input = b"\n  BUFFER\nTYPE: ";
        let mut cur = Cursor::default();
        let Ok(Step::Ready(Token::Marker(r))) = next_token(input, &mut cur, false) else {
            panic!("expected marker");
        };
        assert_eq!(&input[r], b"BUFFER");
        assert_eq!(cur.line, 3);

        let Ok(Step::Ready(Token::Key(r))) = next_token(input, &mut cur, false) else {
            panic!("expected key");
        };
        assert_eq!(&input[r], b"TYPE");
        assert_eq!(cur.pos, input.len());
    }

    #[test]
    fn test_crlf_marker() {
        let (r, cur) = token(b"ENDSCOPE\r\n", false);
        assert_eq!(r, Ok(Step::Ready(Token::Marker(0..8))));
        assert_eq!(cur.pos, 10);
        assert!(is_end_scope(b"ENDSCOPE"));
    }

    #[test]
    fn test_incomplete_does_not_move_cursor() {
        for input in [&b"ENDSC"[..], b"ENDSCOPE", b"KEY:", b"   "] {
            let (r, cur) = token(input, false);
            assert_eq!(r, Ok(Step::Incomplete), "{:?}", input);
            assert_eq!(cur, Cursor::default());
        }
    }

    #[test]
    fn test_end_of_input() {
        let (r, _) = token(b" \n\r\n", true);
        assert_eq!(r, Ok(Step::Ready(Token::End)));
    }

    #[test]
    fn test_bad_separator() {
        let (r, _) = token(b"KEY:x", false);
        assert_eq!(r, Err(GrammarError::MissingSeparator));
        let (r, _) = token(b"{", false);
        assert!(matches!(r, Err(GrammarError::Unexpected { byte: b'{', .. })));
        let (r, _) = token(b"NAME x\n", false);
        assert!(r.is_err());
    }

    #[test]
    fn test_quoted_string() {
        let input = b"\"say \"hi\"\"\nNEXT";
        let mut cur = Cursor::default();
        let Ok(Step::Ready(r)) = read_quoted(input, &mut cur) else {
            panic!("expected string");
        };
        assert_eq!(&input[r], b"say \"hi\"");
        assert_eq!(&input[cur.pos..], b"NEXT");
        assert_eq!(cur.line, 2);

        let mut cur = Cursor::default();
        assert_eq!(read_quoted(b"\"open", &mut cur), Ok(Step::Incomplete));
        assert_eq!(cur.pos, 0);
        assert!(read_quoted(b"abc", &mut cur).is_err());
    }

    #[test]
    fn test_fixed_payload_may_contain_delimiters() {
        let input = b"\n:\"E\nrest";
        let mut cur = Cursor::default();
        assert_eq!(take_fixed(input, &mut cur, 4), Step::Ready(0..4));
        assert_eq!(expect_line_end(input, &mut cur), Ok(Step::Ready(())));
        assert_eq!(&input[cur.pos..], b"rest");
        assert_eq!(take_fixed(input, &mut cur, 5), Step::Incomplete);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(b'\t'), ByteClass::Space);
        assert_eq!(classify(b'_'), ByteClass::Ident);
        assert_eq!(classify(b':'), ByteClass::Separator);
        assert_eq!(classify(b'"'), ByteClass::Quote);
        assert_eq!(classify(0xFF), ByteClass::Other);
    }
}
