/*!
Serde deserializer for turning RESP reply data into Rust data structures.

This module contains the reply half of the
[Redis Serialization Protocol](https://redis.io/docs/reference/protocol-spec/),
covering both RESP2 and the RESP3 extensions (doubles, booleans, big
numbers, nulls, sets, and maps).

# Basic example

```
use serde::Deserialize;
use typedis::de::from_bytes;

let data = b"\
    *4\r\n\
    +OK\r\n\
    :24\r\n\
    $8\r\nBorrowed\r\n\
    *3\r\n\
        $-1\r\n\
        +Hello,\r\n\
        +World!\r\n\
";

#[derive(Deserialize, PartialEq, Eq, Debug)]
struct Data<'a>(
    String,
    i32,
    &'a str,
    Vec<Option<String>>,
);

let data: Data = from_bytes(data).expect("failed to deserialize");

assert_eq!(
    data,
    Data(
        "OK".to_owned(),
        24,
        "Borrowed",
        Vec::from([
            None,
            Some("Hello,".to_owned()),
            Some("World!".to_owned()),
        ]),
    ),
);
```

# Decoding is driven by the target type

The deserializer is a recursive descent driven by the *target* type, not by
the wire. The frame tag is checked only for compatibility with the target:

- Numeric targets accept integer (`:`), double (`,`), and big number (`(`)
  frames, and also string frames whose body parses as the right lexical
  form (Redis frequently stores numbers as strings). Out-of-range values
  are [`Error::NumericRange`]; unparseable strings are [`Error::NotANumber`].
- `bool` accepts `#t`/`#f`, integers (zero is false), and the strings
  `"true"` and `"false"`; anything else is [`Error::NotABool`].
- String and bytes targets accept simple strings, bulk strings, and big
  numbers (whose body is delivered verbatim). RESP is binary safe, so
  borrowed `&str` and `&[u8]` decode zero-copy from the payload.
- Sequence targets accept arrays and sets of any length; tuples and fixed
  arrays additionally require the announced length to match.
- Struct targets decode as *keyed records*: from a RESP3 map frame, or from
  the flattened even-length array shape RESP2 uses for things like
  `HGETALL`. Wire keys are matched against field names byte-for-byte, in
  any order. Unknown keys are skipped by default
  (`#[serde(deny_unknown_fields)]` opts into exact matching); a missing
  field is [`Error::MissingField`]. Declare genuinely optional fields with
  `#[serde(default)]`.
- Nil frames (`$-1`, `*-1`, RESP3 `_`) are accepted only by [`Option`]
  (as `None`), by `()`, and by the error-aware components; everywhere else
  they raise [`Error::UnexpectedNil`].
- `()` consumes and discards one frame of any shape, failing only if that
  frame is a server error. This is the natural target for commands whose
  reply is an uninteresting `+OK`.

# Errors and results

A server error frame (`-` tag) encountered by a target that can't represent
it is surfaced as [`Error::Server`], after the frame has been consumed.
Targets that *can* represent it are [`Result`] (whose `Err` variant
receives the raw message) and the richer
[`OrErr`][crate::components::OrErr] /
[`OrFullErr`][crate::components::OrFullErr] components, which also
distinguish nil replies.

```
use typedis::de::from_bytes;

type BoringResult<'a> = Result<(), &'a str>;

let result: BoringResult = from_bytes(b"+OK\r\n")
    .expect("deserialize shouldn't fail");

assert_eq!(result, Ok(()));

let result: BoringResult = from_bytes(b"-ERR error message\r\n")
    .expect("deserialize shouldn't fail");

assert_eq!(result, Err("ERR error message"));
```
*/

mod access;
pub mod parse;

use std::fmt::Display;
use std::str::{self, FromStr};

use paste::paste;
use serde::de;
use thiserror::Error;

use crate::components;

use self::access::{OutcomeAccess, ReplyAccess};
use self::parse::TaggedHeader;

/// Deserialize a `T` object from a string containing RESP data.
pub fn from_str<'a, T: de::Deserialize<'a>>(input: &'a str) -> Result<T, Error> {
    from_bytes(input.as_bytes())
}

/// Deserialize a `T` object from a byte slice containing RESP data.
pub fn from_bytes<'a, T>(mut input: &'a [u8]) -> Result<T, Error>
where
    T: de::Deserialize<'a>,
{
    let deserializer = Deserializer::new(&mut input);
    let value = T::deserialize(deserializer)?;
    input.is_empty().then_some(value).ok_or(Error::TrailingData)
}

/// Errors that can occur while deserializing RESP data.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// There was an error during parsing (such as a \r without a \n).
    #[error("parsing error")]
    Parse(#[from] parse::Error),

    /// The length of an array or bulk string was out of bounds. It might
    /// have exceeded the 512MB limit for bulk strings, or the platform's
    /// address space.
    #[error("an array or bulk string length was out of bounds")]
    Length,

    /// There was leftover data in the input after the deserialize
    /// operation. This is only returned by [`from_bytes`] and similar
    /// functions; the [`Deserializer`] itself will normally just leave that
    /// data untouched, to facilitate response pipelining.
    #[error("the deserialize completed, but didn't consume the entire input")]
    TrailingData,

    /// The `Deserialize` type successfully deserialized from a Redis
    /// array, but didn't consume the whole thing.
    #[error("the `Deserialize` type didn't consume the entire array")]
    UnfinishedArray,

    /// The `Deserialize` type successfully deserialized from a map, but
    /// didn't consume every key-value pair.
    #[error("the `Deserialize` type didn't consume the entire map")]
    UnfinishedMap,

    /// A keyed record was decoded from an array with an odd number of
    /// elements, which can't be chunked into key-value pairs.
    #[error("an array with an odd length can't decode into key-value pairs")]
    OddPairLength,

    /// A nil reply (`$-1`, `*-1`, or `_`) was found where the target type
    /// doesn't admit one. Wrap the target in [`Option`] (or
    /// [`OrErr`][crate::components::OrErr]) if the command can reply nil.
    #[error("a nil reply where the target type doesn't admit one")]
    UnexpectedNil,

    /// The frame's tag can't decode into the target type at all (for
    /// example an aggregate where a number was requested).
    #[error("a '{}' frame isn't compatible with the target type", .0.escape_ascii())]
    UnexpectedTag(u8),

    /// A numeric reply was out of range for the target type.
    #[error("a numeric reply was out of range for the target type")]
    NumericRange,

    /// A string reply didn't parse as a number, but a numeric target
    /// requested it.
    #[error("a string reply didn't parse as a number")]
    NotANumber,

    /// The reply wasn't recognizable as a boolean.
    #[error("the reply wasn't recognizable as a boolean")]
    NotABool,

    /// A string reply was longer than the fixed-capacity buffer it was
    /// asked to decode into.
    #[error("a string reply was longer than the target buffer's capacity")]
    BufferTooSmall,

    /// A keyed record was fully consumed without encountering one of its
    /// required fields.
    #[error("the reply was missing the required field `{0}`")]
    MissingField(&'static str),

    /// A keyed record that demands exact field matching encountered a key
    /// it doesn't declare.
    #[error("the reply contained an unrecognized field `{0}`")]
    UnknownField(String),

    /// We *successfully* deserialized a Redis Error value (with the `-`
    /// tag). The payload is the full error line; its first word is the
    /// conventional error code. See the module docs on `Result`
    /// deserialization for how to avoid this error.
    #[error("error reply from the server: {}", String::from_utf8_lossy(.0))]
    Server(Vec<u8>),

    /// There was an error from the `Deserialize` type
    #[error("error from Deserialize type: {0}")]
    Custom(String),
}

impl de::Error for Error {
    #[inline]
    #[must_use]
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Custom(msg.to_string())
    }

    #[inline]
    fn missing_field(field: &'static str) -> Self {
        Self::MissingField(field)
    }

    #[inline]
    fn unknown_field(field: &str, _expected: &'static [&'static str]) -> Self {
        Self::UnknownField(field.to_owned())
    }
}

#[inline]
fn apply_parser<'de, T>(
    input: &mut &'de [u8],
    parser: impl FnOnce(&'de [u8]) -> parse::ParseResult<'de, T>,
) -> Result<T, parse::Error> {
    parser(input).map(|(value, tail)| {
        *input = tail;
        value
    })
}

/// A RESP Deserializer.
///
/// This is the core serde [`Deserializer`][de::Deserializer] for RESP reply
/// data. It operates on `&mut &[u8]`, a mutable reference to a byte slice,
/// and after a successful deserialize it updates the slice in place to
/// reflect any remaining unparsed content. This is intended to facilitate
/// response pipelining, where a single stream might include many responses;
/// it's also how the [client][crate::client] tracks its position in its
/// reply buffer.
///
/// A single `Deserializer` can be used to deserialize at most one RESP
/// value. They are trivially cheap to create, though, so a new
/// `Deserializer` can be used for each additional value.
///
/// See also [`from_bytes`] and [`from_str`] for more convenient deserialize
/// behavior.
#[derive(Debug)]
pub struct Deserializer<'a, 'de> {
    inner: UnparsedDeserializer<'a, 'de>,
}

impl<'a, 'de> Deserializer<'a, 'de> {
    /// Create a new RESP deserializer.
    ///
    /// The input should contain at least one complete RESP frame (which
    /// might contain additional sub-frames). The input will be mutated
    /// during deserialization, such that after a value is fully
    /// deserialized, the buffer will be at the unused tail of the input.
    #[inline]
    #[must_use]
    pub fn new(input: &'a mut &'de [u8]) -> Self {
        Self {
            inner: UnparsedDeserializer::new(input),
        }
    }
}

macro_rules! forward {
    ($($method:ident $(($($arg:ident : $type:ty),*))?)*) => {$(
        paste! {
            #[inline]
            fn [<deserialize_ $method>]<V>(
                self,
                $($($arg : $type,)*)?
                visitor: V,
            ) -> Result<V::Value, Self::Error>
            where
                V: de::Visitor<'de>
            {
                self.inner.[<deserialize_ $method>]($($($arg,)*)? visitor)
            }
        }
    )*}
}

impl<'a, 'de> de::Deserializer<'de> for Deserializer<'a, 'de> {
    type Error = Error;

    forward! {
        any ignored_any bool
        i8 i16 i32 i64 i128
        u8 u16 u32 u64 u128
        f32 f64
        char str string bytes byte_buf identifier
        option unit
        seq map

        unit_struct(name: &'static str)
        newtype_struct(name: &'static str)
        tuple(len: usize)
        tuple_struct(name: &'static str, len: usize)
        struct(name: &'static str, fields: &'static[&'static str])
        enum(name: &'static str, variants: &'static[&'static str])
    }
}

/// Trait that abstracts the header read operation. At various points during
/// a deserialize, the Deserializer might either need to parse a header, or
/// might already have one from a parse operation. For example, when
/// deserializing an `Option`, if the value is NOT null, the parsed header
/// is retained by the deserializer passed into `deserialize_some`. This
/// trait abstracts over the presence or absence of a parsed header.
trait ReadHeader<'de>: Sized {
    /// Read a header, possibly from the `input`.
    fn read_header(self, input: &mut &'de [u8]) -> Result<TaggedHeader<'de>, parse::Error>;
}

impl<'de> ReadHeader<'de> for TaggedHeader<'de> {
    /// A `TaggedHeader` can simply return itself without touching the input
    #[inline]
    fn read_header(self, _input: &mut &'de [u8]) -> Result<TaggedHeader<'de>, parse::Error> {
        Ok(self)
    }
}

#[derive(Debug)]
struct ParseHeader;

impl<'de> ReadHeader<'de> for ParseHeader {
    /// We don't have a header; we must try to read one from the input.
    #[inline]
    fn read_header(self, input: &mut &'de [u8]) -> Result<TaggedHeader<'de>, parse::Error> {
        apply_parser(input, parse::read_header)
    }
}

#[derive(Debug)]
struct BaseDeserializer<'a, 'de, H> {
    header: H,
    input: &'a mut &'de [u8],
}

type UnparsedDeserializer<'a, 'de> = BaseDeserializer<'a, 'de, ParseHeader>;
type PreParsedDeserializer<'a, 'de> = BaseDeserializer<'a, 'de, TaggedHeader<'de>>;

impl<'a, 'de> UnparsedDeserializer<'a, 'de> {
    #[inline]
    pub fn new(input: &'a mut &'de [u8]) -> Self {
        Self {
            input,
            header: ParseHeader,
        }
    }
}

impl<'a, 'de> PreParsedDeserializer<'a, 'de> {
    #[inline]
    fn new(header: TaggedHeader<'de>, input: &'a mut &'de [u8]) -> Self {
        Self { input, header }
    }
}

// Bulk strings can be up to 512 MB
const MAX_BULK_LENGTH: i64 = 512 * 1024 * 1024;

/// Consume one complete frame (with all of its children) from the front of
/// the input, without building anything.
///
/// This is the skip-frame subroutine: it backs `()` targets, unknown-field
/// tolerance on keyed records, and the client's frame-boundary scan. Server
/// error frames are consumed like any other data.
pub(crate) fn skip_value(input: &mut &[u8]) -> Result<(), Error> {
    UnparsedDeserializer::new(input).read_header()?.skip_rest()
}

impl<'a, 'de, H: ReadHeader<'de>> BaseDeserializer<'a, 'de, H> {
    /// Read the header from a RESP value. The header consists of a single
    /// tag byte, followed by some kind of payload (which may not contain \r
    /// or \n), followed by \r\n.
    #[inline]
    fn read_header(self) -> Result<PreParsedDeserializer<'a, 'de>, parse::Error> {
        let input = self.input;

        self.header
            .read_header(input)
            .map(|header| PreParsedDeserializer::new(header, input))
    }
}

impl<'a, 'de> PreParsedDeserializer<'a, 'de> {
    /// Read the body of a bulk string whose header announced `len` bytes.
    fn bulk_payload(self, len: i64) -> Result<&'de [u8], Error> {
        if len > MAX_BULK_LENGTH {
            return Err(Error::Length);
        }

        let len = len.try_into().map_err(|_| Error::Length)?;
        apply_parser(self.input, |input| parse::read_exact(len, input)).map_err(Error::Parse)
    }

    /// Extract the body of a string-family frame (`+`, `$`, or `(`, whose
    /// big-number body is delivered verbatim), with typed errors for
    /// everything else.
    fn string_payload(self) -> Result<&'de [u8], Error> {
        match self.header {
            TaggedHeader::SimpleString(payload) | TaggedHeader::BigNumber(payload) => Ok(payload),
            TaggedHeader::BulkString(len) => self.bulk_payload(len),
            TaggedHeader::Null => Err(Error::UnexpectedNil),
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
            header => Err(Error::UnexpectedTag(header.tag())),
        }
    }

    /// Consume the remainder of this frame without building anything.
    fn skip_rest(self) -> Result<(), Error> {
        match self.header {
            TaggedHeader::SimpleString(..)
            | TaggedHeader::Error(..)
            | TaggedHeader::Integer(..)
            | TaggedHeader::Double(..)
            | TaggedHeader::Boolean(..)
            | TaggedHeader::BigNumber(..)
            | TaggedHeader::Null => Ok(()),

            TaggedHeader::BulkString(len) => self.bulk_payload(len).map(drop),

            TaggedHeader::Array(len) | TaggedHeader::Set(len) => {
                let len: usize = len.try_into().map_err(|_| Error::Length)?;
                for _ in 0..len {
                    skip_value(self.input)?;
                }
                Ok(())
            }

            TaggedHeader::Map(pairs) => {
                let pairs: usize = pairs.try_into().map_err(|_| Error::Length)?;
                for _ in 0..pairs {
                    skip_value(self.input)?;
                    skip_value(self.input)?;
                }
                Ok(())
            }
        }
    }

    /// Drive a visitor over the `len` elements of an array or set frame.
    fn visit_aggregate<V>(self, len: i64, visitor: V) -> Result<V::Value, Error>
    where
        V: de::Visitor<'de>,
    {
        let mut seq = SeqAccess {
            input: self.input,
            length: len.try_into().map_err(|_| Error::Length)?,
        };

        match visitor.visit_seq(&mut seq) {
            Ok(..) if seq.length > 0 => Err(Error::UnfinishedArray),
            Ok(value) => Ok(value),

            // If there was an unexpected EOF from inside the array,
            // increase the hint by the smallest possible encoding of the
            // elements that haven't started yet (a RESP frame is at least
            // 3 bytes). The hint must stay a lower bound, since readers
            // may block until exactly that many bytes arrive.
            Err(Error::Parse(parse::Error::UnexpectedEof(needed))) => {
                Err(Error::Parse(parse::Error::UnexpectedEof(
                    needed.saturating_add(seq.length.saturating_mul(3)),
                )))
            }

            Err(err) => Err(err),
        }
    }

    /// Drive a visitor over the `pairs` key-value pairs of a map frame (or
    /// the chunked pairs of an even-length array).
    fn visit_pairs<V>(self, pairs: i64, visitor: V) -> Result<V::Value, Error>
    where
        V: de::Visitor<'de>,
    {
        let mut map = MapPairsAccess {
            input: self.input,
            pairs: pairs.try_into().map_err(|_| Error::Length)?,
        };

        match visitor.visit_map(&mut map) {
            Ok(..) if map.pairs > 0 => Err(Error::UnfinishedMap),
            Ok(value) => Ok(value),

            Err(Error::Parse(parse::Error::UnexpectedEof(needed))) => {
                Err(Error::Parse(parse::Error::UnexpectedEof(
                    needed.saturating_add(map.pairs.saturating_mul(6)),
                )))
            }

            Err(err) => Err(err),
        }
    }

    /// Expose a map frame to a *sequence* visitor: each element decodes
    /// from the adjacent key and value frames, as a 2-element sequence.
    /// This is how `Vec<KeyValue<K, V>>` and friends decode from `%n`.
    fn visit_pair_seq<V>(self, pairs: i64, visitor: V) -> Result<V::Value, Error>
    where
        V: de::Visitor<'de>,
    {
        let mut seq = PairSeqAccess {
            input: self.input,
            pairs: pairs.try_into().map_err(|_| Error::Length)?,
        };

        match visitor.visit_seq(&mut seq) {
            Ok(..) if seq.pairs > 0 => Err(Error::UnfinishedMap),
            Ok(value) => Ok(value),

            Err(Error::Parse(parse::Error::UnexpectedEof(needed))) => {
                Err(Error::Parse(parse::Error::UnexpectedEof(
                    needed.saturating_add(seq.pairs.saturating_mul(6)),
                )))
            }

            Err(err) => Err(err),
        }
    }
}

/// Check that a failed integer parse failed because the text wasn't a
/// number at all, as opposed to a number too large for the parse type.
fn is_decimal_literal(text: &str) -> bool {
    let digits = text
        .strip_prefix(|c| c == '-' || c == '+')
        .unwrap_or(text);

    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Parse the body of a string frame as a decimal integer, distinguishing
/// "not a number" from "out of range for the target".
fn parse_integer_payload<W, T>(payload: &[u8]) -> Result<T, Error>
where
    W: FromStr,
    T: TryFrom<W>,
{
    let text = str::from_utf8(payload).map_err(|_| Error::NotANumber)?;

    match text.parse::<W>() {
        Ok(wide) => T::try_from(wide).map_err(|_| Error::NumericRange),
        Err(..) if is_decimal_literal(text) => Err(Error::NumericRange),
        Err(..) => Err(Error::NotANumber),
    }
}

/// Convert a `,` double to an integer, requiring it to be integral and
/// representable.
fn integral_from_double(value: f64) -> Result<i128, Error> {
    let limit = 2f64.powi(127);

    if value.is_finite() && value.fract() == 0.0 && (-limit..limit).contains(&value) {
        Ok(value as i128)
    } else {
        Err(Error::NumericRange)
    }
}

macro_rules! deserialize_ints {
    ($($int:ident via $wide:ident,)*) => {$(
        paste! {
            fn [<deserialize_ $int>]<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: de::Visitor<'de>,
            {
                let parsed = self.read_header()?;

                match parsed.header {
                    TaggedHeader::Integer(value) => visitor.[<visit_ $int>](
                        value.try_into().map_err(|_| Error::NumericRange)?,
                    ),
                    TaggedHeader::Double(value) => visitor.[<visit_ $int>](
                        integral_from_double(value)?
                            .try_into()
                            .map_err(|_| Error::NumericRange)?,
                    ),
                    TaggedHeader::SimpleString(payload) | TaggedHeader::BigNumber(payload) => {
                        visitor.[<visit_ $int>](parse_integer_payload::<$wide, $int>(payload)?)
                    }
                    TaggedHeader::BulkString(len) => visitor.[<visit_ $int>](
                        parse_integer_payload::<$wide, $int>(parsed.bulk_payload(len)?)?,
                    ),
                    TaggedHeader::Null => Err(Error::UnexpectedNil),
                    TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
                    header => Err(Error::UnexpectedTag(header.tag())),
                }
            }
        }
    )*}
}

macro_rules! deserialize_floats {
    ($($float:ident,)*) => {$(
        paste! {
            fn [<deserialize_ $float>]<V>(self, visitor: V) -> Result<V::Value, Self::Error>
            where
                V: de::Visitor<'de>,
            {
                let parsed = self.read_header()?;

                let value = match parsed.header {
                    TaggedHeader::Integer(value) => value as $float,
                    TaggedHeader::Double(value) => value as $float,
                    TaggedHeader::SimpleString(payload)
                    | TaggedHeader::BigNumber(payload) => {
                        parse_float_payload::<$float>(payload)?
                    }
                    TaggedHeader::BulkString(len) => {
                        parse_float_payload::<$float>(parsed.bulk_payload(len)?)?
                    }
                    TaggedHeader::Null => return Err(Error::UnexpectedNil),
                    TaggedHeader::Error(payload) => {
                        return Err(Error::Server(payload.to_owned()))
                    }
                    header => return Err(Error::UnexpectedTag(header.tag())),
                };

                visitor.[<visit_ $float>](value)
            }
        }
    )*}
}

fn parse_float_payload<T: FromStr>(payload: &[u8]) -> Result<T, Error> {
    str::from_utf8(payload)
        .map_err(|_| Error::NotANumber)?
        .parse()
        .map_err(|_| Error::NotANumber)
}

impl<'de, P: ReadHeader<'de>> de::Deserializer<'de> for BaseDeserializer<'_, 'de, P> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            // Simple Strings are handled as byte arrays
            TaggedHeader::SimpleString(payload) => visitor.visit_borrowed_bytes(payload),

            // Errors are handled by default as actual deserialization
            // errors. (see deserialize_enum for how to circumvent this)
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),

            // Integers are parsed then handled as i64. All Redis integers
            // are guaranteed to fit in a signed 64 bit int.
            TaggedHeader::Integer(value) => visitor.visit_i64(value),

            TaggedHeader::Double(value) => visitor.visit_f64(value),

            TaggedHeader::Boolean(value) => visitor.visit_bool(value),

            // A big number's body is delivered verbatim; a numeric target
            // that wants it parsed should use its own deserialize method.
            TaggedHeader::BigNumber(payload) => visitor.visit_borrowed_bytes(payload),

            // Bulk strings are handled as byte arrays
            TaggedHeader::BulkString(len) => {
                let payload = parsed.bulk_payload(len)?;
                visitor.visit_borrowed_bytes(payload)
            }

            // Arrays and sets are handled as serde sequences.
            TaggedHeader::Array(len) | TaggedHeader::Set(len) => parsed.visit_aggregate(len, visitor),

            // Maps are handled as serde maps.
            TaggedHeader::Map(pairs) => parsed.visit_pairs(pairs, visitor),

            // All the nil spellings are a unit
            TaggedHeader::Null => visitor.visit_unit(),
        }
    }

    deserialize_ints! {
        i8 via i128,
        i16 via i128,
        i32 via i128,
        i64 via i128,
        i128 via i128,
        u8 via i128,
        u16 via i128,
        u32 via i128,
        u64 via i128,
        u128 via u128,
    }

    deserialize_floats! {
        f32,
        f64,
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            TaggedHeader::Boolean(value) => visitor.visit_bool(value),
            TaggedHeader::Integer(value) => visitor.visit_bool(value != 0),
            TaggedHeader::SimpleString(payload) => visit_bool_payload(payload, visitor),
            TaggedHeader::BulkString(len) => {
                let payload = parsed.bulk_payload(len)?;
                visit_bool_payload(payload, visitor)
            }
            TaggedHeader::Null => Err(Error::UnexpectedNil),
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
            _ => Err(Error::NotABool),
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            TaggedHeader::Null => visitor.visit_none(),
            _ => visitor.visit_some(parsed),
        }
    }

    /// `()` decodes from (and discards) one frame of any shape; only a
    /// server error fails the decode. This is the `send::<()>` target for
    /// commands whose reply is an uninteresting acknowledgement.
    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
            _ => {
                parsed.skip_rest()?;
                visitor.visit_unit()
            }
        }
    }

    #[inline]
    fn deserialize_unit_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_unit(visitor)
    }

    /// The skip-frame subroutine: consume exactly one frame, including all
    /// of its children. Unlike `deserialize_unit`, even a server error
    /// frame is consumed silently, so skipping an unknown record field
    /// never fails.
    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.read_header()?.skip_rest()?;
        visitor.visit_unit()
    }

    fn deserialize_char<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let payload = self.read_header()?.string_payload()?;
        let text = str::from_utf8(payload)
            .map_err(|_| <Self::Error as de::Error>::invalid_value(de::Unexpected::Bytes(payload), &visitor))?;

        visitor.visit_borrowed_str(text)
    }

    #[inline]
    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let payload = self.read_header()?.string_payload()?;
        visitor.visit_borrowed_bytes(payload)
    }

    #[inline]
    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    #[inline]
    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    #[inline]
    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    #[inline]
    fn deserialize_identifier<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_newtype_struct<V>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        // Pair-sequence adapters hook in here: both the RESP3 map frame
        // and the flattened RESP2 array decode as a sequence of pairs,
        // each pair drawn from two adjacent frames. See
        // `components::KeyValuePairs`.
        if name == components::KEY_VALUE_PAIRS_TOKEN {
            let parsed = self.read_header()?;

            return match parsed.header {
                TaggedHeader::Map(pairs) => parsed.visit_pair_seq(pairs, visitor),
                TaggedHeader::Array(len) if len % 2 == 0 => {
                    parsed.visit_pair_seq(len / 2, visitor)
                }
                TaggedHeader::Array(..) => Err(Error::OddPairLength),
                TaggedHeader::Null => Err(Error::UnexpectedNil),
                TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
                header => Err(Error::UnexpectedTag(header.tag())),
            };
        }

        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            TaggedHeader::Array(len) | TaggedHeader::Set(len) => {
                parsed.visit_aggregate(len, visitor)
            }
            TaggedHeader::Map(pairs) => parsed.visit_pair_seq(pairs, visitor),
            TaggedHeader::Null => Err(Error::UnexpectedNil),
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
            header => Err(Error::UnexpectedTag(header.tag())),
        }
    }

    #[inline]
    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        // Fixed-capacity buffers hook in here; the `len` of the synthetic
        // tuple struct carries the capacity, so an oversized payload can be
        // rejected with a typed error. See `components::FixBuf`.
        if name == components::FIX_BUF_TOKEN {
            let payload = self.read_header()?.string_payload()?;

            if payload.len() > len {
                return Err(Error::BufferTooSmall);
            }

            return visitor.visit_borrowed_bytes(payload);
        }

        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let parsed = self.read_header()?;

        match parsed.header {
            TaggedHeader::Map(pairs) => parsed.visit_pairs(pairs, visitor),

            // RESP2 has no map frame; key-value data arrives as a
            // flattened array, `HGETALL` style.
            TaggedHeader::Array(len) if len % 2 == 0 => parsed.visit_pairs(len / 2, visitor),
            TaggedHeader::Array(..) => Err(Error::OddPairLength),

            TaggedHeader::Null => Err(Error::UnexpectedNil),
            TaggedHeader::Error(payload) => Err(Error::Server(payload.to_owned())),
            header => Err(Error::UnexpectedTag(header.tag())),
        }
    }

    #[inline]
    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match (name, variants) {
            ("Result", ["Ok", "Err"] | ["Err", "Ok"]) => {
                let parsed = self.read_header()?;

                match parsed.header {
                    // "+OK\r\n" can be deserialized to either
                    // Result::Ok("OK") or Result::Ok(())
                    TaggedHeader::SimpleString(b"OK") => {
                        visitor.visit_enum(OutcomeAccess::new_plain_ok())
                    }

                    // "-ERR message\r\n" can be deserialized into:
                    // Err("ERR message")
                    TaggedHeader::Error(message) => {
                        visitor.visit_enum(OutcomeAccess::new_message_err(message))
                    }

                    // For everything else, deserialize inline as a
                    // Result::Ok
                    _ => visitor.visit_enum(OutcomeAccess::new_ok(parsed)),
                }
            }

            (components::OR_ERR_TOKEN, ..) => {
                let parsed = self.read_header()?;

                match parsed.header {
                    TaggedHeader::Error(message) => {
                        visitor.visit_enum(OutcomeAccess::new_code_err(message))
                    }
                    TaggedHeader::Null => visitor.visit_enum(OutcomeAccess::new_nil()),
                    _ => visitor.visit_enum(OutcomeAccess::new_ok(parsed)),
                }
            }

            (components::OR_FULL_ERR_TOKEN, ..) => {
                let parsed = self.read_header()?;

                match parsed.header {
                    TaggedHeader::Error(message) => {
                        visitor.visit_enum(OutcomeAccess::new_full_err(message))
                    }
                    TaggedHeader::Null => visitor.visit_enum(OutcomeAccess::new_nil()),
                    _ => visitor.visit_enum(OutcomeAccess::new_ok(parsed)),
                }
            }

            (components::REPLY_TOKEN, ..) => {
                let parsed = self.read_header()?;
                visitor.visit_enum(ReplyAccess::new(parsed.header, parsed.input))
            }

            _ => self.deserialize_any(visitor),
        }
    }
}

fn visit_bool_payload<'de, V>(payload: &'de [u8], visitor: V) -> Result<V::Value, Error>
where
    V: de::Visitor<'de>,
{
    match payload {
        b"true" => visitor.visit_bool(true),
        b"false" => visitor.visit_bool(false),
        _ => Err(Error::NotABool),
    }
}

struct SeqAccess<'a, 'de> {
    length: usize,
    input: &'a mut &'de [u8],
}

impl<'de> de::SeqAccess<'de> for SeqAccess<'_, 'de> {
    type Error = Error;

    #[inline]
    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        self.length = match self.length.checked_sub(1) {
            Some(length) => length,
            None => return Ok(None),
        };

        seed.deserialize(Deserializer::new(self.input)).map(Some)
    }

    #[inline]
    #[must_use]
    fn size_hint(&self) -> Option<usize> {
        Some(self.length)
    }
}

struct MapPairsAccess<'a, 'de> {
    pairs: usize,
    input: &'a mut &'de [u8],
}

impl<'de> de::MapAccess<'de> for MapPairsAccess<'_, 'de> {
    type Error = Error;

    #[inline]
    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: de::DeserializeSeed<'de>,
    {
        self.pairs = match self.pairs.checked_sub(1) {
            Some(pairs) => pairs,
            None => return Ok(None),
        };

        seed.deserialize(Deserializer::new(self.input)).map(Some)
    }

    #[inline]
    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: de::DeserializeSeed<'de>,
    {
        seed.deserialize(Deserializer::new(self.input))
    }

    #[inline]
    #[must_use]
    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs)
    }
}

/// Sequence access over a map frame: each element is one key-value pair,
/// delivered as a 2-element sequence of the adjacent frames.
struct PairSeqAccess<'a, 'de> {
    pairs: usize,
    input: &'a mut &'de [u8],
}

impl<'de> de::SeqAccess<'de> for PairSeqAccess<'_, 'de> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        self.pairs = match self.pairs.checked_sub(1) {
            Some(pairs) => pairs,
            None => return Ok(None),
        };

        seed.deserialize(PairDeserializer { input: self.input }).map(Some)
    }

    #[inline]
    #[must_use]
    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs)
    }
}

/// Deserializer for a single key-value pair inside a map frame: whatever
/// shape the target requests, it's driven as a sequence of exactly the key
/// frame and the value frame.
struct PairDeserializer<'a, 'de> {
    input: &'a mut &'de [u8],
}

impl<'de> de::Deserializer<'de> for PairDeserializer<'_, 'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let mut seq = SeqAccess {
            input: self.input,
            length: 2,
        };

        match visitor.visit_seq(&mut seq) {
            Ok(..) if seq.length > 0 => Err(Error::UnfinishedArray),
            Ok(value) => Ok(value),
            Err(err) => Err(err),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}
