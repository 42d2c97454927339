/*!
Low-level parsers for RESP frame headers.

Everything in this module operates on plain byte slices and returns the
unparsed tail on success, so callers that buffer a partially received reply
can retry after reading more data. [`Error::UnexpectedEof`] reports a lower
bound on how many additional bytes are needed for that retry to make
progress.
*/

use std::str;

use memchr::memchr2;
use thiserror::Error;

/// Errors that can occur while parsing RESP framing.
#[derive(Debug, Clone, Copy, Error)]
#[non_exhaustive]
pub enum Error {
    /// The input ended in the middle of a frame. The payload is a lower
    /// bound on the number of additional bytes needed to make progress.
    #[error("unexpected end of input; read at least {0} more bytes and try again")]
    UnexpectedEof(usize),

    /// There was a `\r` without a `\n`, or vice versa (all redis newlines
    /// are `\r\n`).
    #[error("malformed newline during parsing (all redis newlines are \\r\\n)")]
    MalformedNewline,

    /// The frame started with a byte that isn't a known RESP2 or RESP3 tag.
    #[error("unrecognized tag byte {0:#x}")]
    BadTag(u8),

    /// A length or integer payload failed to parse as a decimal integer.
    #[error("failed to parse a decimal integer")]
    Number,

    /// A `,` double payload failed to parse.
    #[error("failed to parse a double payload")]
    Double,

    /// A `#` boolean payload was something other than `t` or `f`.
    #[error("a boolean payload must be exactly 't' or 'f'")]
    Boolean,

    /// A `_` null frame carried a payload.
    #[error("a null frame must have an empty payload")]
    NullPayload,
}

/// A parsed frame header: the tag byte plus the value line that follows it.
///
/// For strings, errors, and big numbers the payload is borrowed directly
/// from the input. Bulk string and aggregate headers only carry their
/// announced length; the body follows separately.
#[derive(Debug, Clone, Copy)]
pub enum TaggedHeader<'a> {
    /// `+payload\r\n`
    SimpleString(&'a [u8]),
    /// `-payload\r\n`
    Error(&'a [u8]),
    /// `:1000\r\n`
    Integer(i64),
    /// `$5\r\n`, announcing a 5 byte body
    BulkString(i64),
    /// `*3\r\n`, announcing 3 child frames
    Array(i64),
    /// `,3.14\r\n` (RESP3)
    Double(f64),
    /// `#t\r\n` or `#f\r\n` (RESP3)
    Boolean(bool),
    /// `(3492890328409238509324850943850\r\n` (RESP3)
    BigNumber(&'a [u8]),
    /// `~3\r\n`, announcing 3 child frames (RESP3)
    Set(i64),
    /// `%2\r\n`, announcing 2 key-value frame pairs (RESP3)
    Map(i64),
    /// Any of the nil spellings: `$-1\r\n`, `*-1\r\n`, or the RESP3 `_\r\n`
    Null,
}

impl TaggedHeader<'_> {
    /// The wire tag byte this header was parsed from. `Null` reports `_`
    /// regardless of which nil spelling appeared.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match *self {
            TaggedHeader::SimpleString(..) => b'+',
            TaggedHeader::Error(..) => b'-',
            TaggedHeader::Integer(..) => b':',
            TaggedHeader::BulkString(..) => b'$',
            TaggedHeader::Array(..) => b'*',
            TaggedHeader::Double(..) => b',',
            TaggedHeader::Boolean(..) => b'#',
            TaggedHeader::BigNumber(..) => b'(',
            TaggedHeader::Set(..) => b'~',
            TaggedHeader::Map(..) => b'%',
            TaggedHeader::Null => b'_',
        }
    }
}

/// The result of a parse: the parsed value, plus the unconsumed tail.
pub type ParseResult<'a, O> = Result<(O, &'a [u8]), Error>;

/// Read a single `\r\n` from the input.
pub fn read_endline(input: &[u8]) -> ParseResult<'_, ()> {
    match input {
        [b'\r', b'\n', input @ ..] => Ok(((), input)),
        [b'\r'] => Err(Error::UnexpectedEof(1)),
        [] => Err(Error::UnexpectedEof(2)),
        _ => Err(Error::MalformedNewline),
    }
}

/// Read a tag and its payload line, followed by an endline.
pub fn read_header(input: &[u8]) -> ParseResult<TaggedHeader<'_>> {
    let (&tag, input) = input.split_first().ok_or(Error::UnexpectedEof(3))?;
    let (payload, input) = {
        let idx = memchr2(b'\r', b'\n', input).ok_or(Error::UnexpectedEof(2))?;
        input.split_at(idx)
    };
    let ((), input) = read_endline(input)?;

    match tag {
        b'+' => Ok(TaggedHeader::SimpleString(payload)),
        b'-' => Ok(TaggedHeader::Error(payload)),
        b':' => parse_number(payload).map(TaggedHeader::Integer),
        b'$' => parse_number(payload).map(|len| match len {
            len if len < 0 => TaggedHeader::Null,
            len => TaggedHeader::BulkString(len),
        }),
        b'*' => parse_number(payload).map(|len| match len {
            len if len < 0 => TaggedHeader::Null,
            len => TaggedHeader::Array(len),
        }),
        b',' => parse_double(payload).map(TaggedHeader::Double),
        b'#' => match payload {
            b"t" => Ok(TaggedHeader::Boolean(true)),
            b"f" => Ok(TaggedHeader::Boolean(false)),
            _ => Err(Error::Boolean),
        },
        b'(' => Ok(TaggedHeader::BigNumber(payload)),
        b'_' => match payload {
            b"" => Ok(TaggedHeader::Null),
            _ => Err(Error::NullPayload),
        },
        b'~' => parse_number(payload).map(TaggedHeader::Set),
        b'%' => parse_number(payload).map(TaggedHeader::Map),
        tag => Err(Error::BadTag(tag)),
    }
    .map(|header| (header, input))
}

#[inline]
#[must_use]
fn try_split_at(input: &[u8], idx: usize) -> Option<(&[u8], &[u8])> {
    input.get(..idx).map(|head| (head, &input[idx..]))
}

/// Read a chunk of a specific length, followed by an endline.
pub fn read_exact(length: usize, input: &[u8]) -> ParseResult<'_, &[u8]> {
    let (payload, input) = try_split_at(input, length)
        .ok_or_else(|| Error::UnexpectedEof((length - input.len()).saturating_add(2)))?;

    let ((), input) = read_endline(input)?;

    Ok((payload, input))
}

#[inline]
#[must_use]
const fn ascii_to_digit(b: u8) -> Option<i64> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as i64),
        _ => None,
    }
}

fn parse_number(payload: &[u8]) -> Result<i64, Error> {
    let (payload, positive) = match payload.split_first().ok_or(Error::Number)? {
        (&b'-', tail) => (tail, false),
        (&b'+', tail) => (tail, true),
        _ => (payload, true),
    };

    payload
        .iter()
        .copied()
        .try_fold(0i64, move |accum, b| {
            let digit = ascii_to_digit(b)?;
            let digit = if positive { digit } else { -digit };
            let accum = accum.checked_mul(10)?;
            accum.checked_add(digit)
        })
        .ok_or(Error::Number)
}

// `str::parse` already accepts the `inf`, `-inf`, and `nan` spellings
// RESP3 uses for non-finite doubles.
fn parse_double(payload: &[u8]) -> Result<f64, Error> {
    str::from_utf8(payload)
        .map_err(|_| Error::Double)?
        .parse()
        .map_err(|_| Error::Double)
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;

    use super::*;

    fn parsed(input: &[u8]) -> TaggedHeader<'_> {
        let (header, tail) = read_header(input).expect("failed to parse header");
        assert!(tail.is_empty());
        header
    }

    #[test]
    fn simple_string() {
        assert_matches!(parsed(b"+OK\r\n"), TaggedHeader::SimpleString(b"OK"));
    }

    #[test]
    fn error() {
        assert_matches!(parsed(b"-ERR bad\r\n"), TaggedHeader::Error(b"ERR bad"));
    }

    #[test]
    fn integer() {
        assert_matches!(parsed(b":-1234\r\n"), TaggedHeader::Integer(-1234));
    }

    #[test]
    fn bulk_header() {
        assert_matches!(parsed(b"$5\r\n"), TaggedHeader::BulkString(5));
    }

    #[test]
    fn null_spellings() {
        assert_matches!(parsed(b"$-1\r\n"), TaggedHeader::Null);
        assert_matches!(parsed(b"*-1\r\n"), TaggedHeader::Null);
        assert_matches!(parsed(b"_\r\n"), TaggedHeader::Null);
    }

    #[test]
    fn doubles() {
        assert_matches!(parsed(b",3.25\r\n"), TaggedHeader::Double(value) => {
            assert_eq!(value, 3.25);
        });
        assert_matches!(parsed(b",inf\r\n"), TaggedHeader::Double(value) => {
            assert_eq!(value, f64::INFINITY);
        });
        assert_matches!(parsed(b",-inf\r\n"), TaggedHeader::Double(value) => {
            assert_eq!(value, f64::NEG_INFINITY);
        });
        assert_matches!(parsed(b",nan\r\n"), TaggedHeader::Double(value) => {
            assert!(value.is_nan());
        });
    }

    #[test]
    fn booleans() {
        assert_matches!(parsed(b"#t\r\n"), TaggedHeader::Boolean(true));
        assert_matches!(parsed(b"#f\r\n"), TaggedHeader::Boolean(false));
        assert_matches!(read_header(b"#x\r\n"), Err(Error::Boolean));
    }

    #[test]
    fn big_number() {
        assert_matches!(
            parsed(b"(3492890328409238509324850943850\r\n"),
            TaggedHeader::BigNumber(b"3492890328409238509324850943850"),
        );
    }

    #[test]
    fn aggregates() {
        assert_matches!(parsed(b"*3\r\n"), TaggedHeader::Array(3));
        assert_matches!(parsed(b"~2\r\n"), TaggedHeader::Set(2));
        assert_matches!(parsed(b"%2\r\n"), TaggedHeader::Map(2));
    }

    #[test]
    fn truncated_input_reports_needed_bytes() {
        assert_matches!(read_header(b""), Err(Error::UnexpectedEof(3)));
        assert_matches!(read_header(b"+hello"), Err(Error::UnexpectedEof(2)));
        assert_matches!(read_header(b"+hello\r"), Err(Error::UnexpectedEof(1)));
        assert_matches!(read_exact(5, b"hel"), Err(Error::UnexpectedEof(4)));
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(read_header(b"@5\r\n"), Err(Error::BadTag(b'@')));
        assert_matches!(read_header(b":12a\r\n"), Err(Error::Number));
        assert_matches!(read_header(b"_nope\r\n"), Err(Error::NullPayload));
        assert_matches!(read_endline(b"\n\r"), Err(Error::MalformedNewline));
    }
}
