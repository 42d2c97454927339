/*!
Serde serializer for encoding Redis commands.

Redis commands are uniformly RESP arrays of bulk strings, whatever the
logical types of the arguments, and that encoding is accepted by both RESP2
and RESP3 servers. The [`CommandSerializer`] therefore requires the command
to serialize as a sequence (a tuple, array, slice, or `Vec` of arguments),
and encodes every argument as a bulk string:

- `str` and bytes data is written verbatim (RESP is binary safe; use
  [`serde_bytes::Bytes`] for raw byte arguments).
- Integers are written in decimal, and floats in their shortest
  round-trippable decimal form.
- Booleans are written as `1` / `0`.
- Unit enum variants serialize as their name, which is convenient for flag
  arguments like `NX` or `KEEPTTL`.

Anything structured (nested sequences, maps, options, data-carrying enums)
is rejected: flatten key-value arguments yourself, the way the command's
wire syntax demands. This keeps the mapping from a Rust value to the bytes
on the wire completely predictable.

The serializer writes into a plain `Vec<u8>`, so several commands can be
encoded back-to-back into one buffer and flushed together; that's exactly
how the [client][crate::client] pipelines.

# Example

```
let mut buffer = Vec::new();

typedis::ser::write_command(&mut buffer, &("SET", "key", "42"))
    .expect("failed to serialize");

assert_eq!(buffer, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n");
```
*/

use std::fmt::{Display, Write as _};

use arrayvec::ArrayString;
use lazy_format::lazy_format;
use serde::ser;
use thiserror::Error;

/// Encode one command as a RESP array of bulk strings, appending the bytes
/// to `dest`.
pub fn write_command<T>(dest: &mut Vec<u8>, command: &T) -> Result<(), Error>
where
    T: ser::Serialize + ?Sized,
{
    command.serialize(CommandSerializer::new(dest))
}

/// Errors that can occur while encoding a command.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The command wasn't a sequence. Commands are always an ordered list
    /// of arguments, even when there's only one.
    #[error("a command must serialize as a sequence of arguments")]
    NotASequence,

    /// The command was a sequence of unknown length. The argument count
    /// has to be written before the arguments themselves.
    #[error("can't serialize sequences of unknown length")]
    UnknownSeqLength,

    /// The command serialized more or fewer arguments than it declared.
    #[error("attempted to serialize too many or too few arguments")]
    BadSeqLength,

    /// There was an error from the `Serialize` type, including any attempt
    /// to serialize a structured (non-scalar) argument value.
    #[error("error from Serialize type: {0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Custom(msg.to_string())
    }
}

#[inline]
fn invalid_argument<T>(kind: &str) -> Result<T, Error> {
    Err(ser::Error::custom(lazy_format!(
        "can't serialize {kind} as a command argument"
    )))
}

/// Append a length-style line (`*3\r\n`, `$5\r\n`) to the output.
fn write_length(dest: &mut Vec<u8>, tag: u8, length: usize) -> Result<(), Error> {
    let mut buffer: ArrayString<24> = ArrayString::new();

    write!(&mut buffer, "{length}")
        .map_err(|_| ser::Error::custom("length was more than 24 digits"))?;

    dest.push(tag);
    dest.extend_from_slice(buffer.as_bytes());
    dest.extend_from_slice(b"\r\n");

    Ok(())
}

/// The command serializer. See the [module docs][self] for the encoding
/// rules.
#[derive(Debug)]
pub struct CommandSerializer<'a> {
    dest: &'a mut Vec<u8>,
}

impl<'a> CommandSerializer<'a> {
    /// Create a serializer that appends one command to `dest`.
    #[inline]
    #[must_use]
    pub fn new(dest: &'a mut Vec<u8>) -> Self {
        Self { dest }
    }
}

impl<'a> ser::Serializer for CommandSerializer<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = SerializeArgs<'a>;
    type SerializeTuple = TupleSeqAdapter<SerializeArgs<'a>>;
    type SerializeTupleStruct = TupleSeqAdapter<SerializeArgs<'a>>;

    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        let len = len.ok_or(Error::UnknownSeqLength)?;
        write_length(self.dest, b'*', len)?;

        Ok(SerializeArgs {
            dest: self.dest,
            remaining: len,
        })
    }

    #[inline]
    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        self.serialize_seq(Some(len)).map(TupleSeqAdapter::new)
    }

    #[inline]
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        self.serialize_tuple(len)
    }

    #[inline]
    fn serialize_newtype_struct<T: ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_i8(self, _v: i8) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_i16(self, _v: i16) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_i32(self, _v: i32) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_i64(self, _v: i64) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_i128(self, _v: i128) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_u8(self, _v: u8) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_u16(self, _v: u16) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_u32(self, _v: u32) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_u64(self, _v: u64) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_u128(self, _v: u128) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_f32(self, _v: f32) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_f64(self, _v: f64) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_char(self, _v: char) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_str(self, _v: &str) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_some<T: ?Sized>(self, _value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        Err(Error::NotASequence)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        Err(Error::NotASequence)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(Error::NotASequence)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(Error::NotASequence)
    }
}

/// Argument-by-argument serializer for the body of a command, enforcing
/// the declared argument count.
#[derive(Debug)]
pub struct SerializeArgs<'a> {
    remaining: usize,
    dest: &'a mut Vec<u8>,
}

impl<'a> ser::SerializeSeq for SerializeArgs<'a> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ser::Serialize,
    {
        match self.remaining.checked_sub(1) {
            Some(remain) => self.remaining = remain,
            None => return Err(Error::BadSeqLength),
        }

        value.serialize(ArgSerializer { dest: self.dest })
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        match self.remaining {
            0 => Ok(()),
            _ => Err(Error::BadSeqLength),
        }
    }
}

/// Serializer for a single argument: one bulk string, with scalar values
/// coerced to their canonical string form.
struct ArgSerializer<'a> {
    dest: &'a mut Vec<u8>,
}

impl<'a> ArgSerializer<'a> {
    fn write_bulk(self, payload: &[u8]) -> Result<(), Error> {
        write_length(self.dest, b'$', payload.len())?;
        self.dest.extend_from_slice(payload);
        self.dest.extend_from_slice(b"\r\n");

        Ok(())
    }

    fn write_number(self, value: impl Display) -> Result<(), Error> {
        // 64 characters is far more than any decimal i128 or shortest
        // round-trip float
        let mut buffer: ArrayString<64> = ArrayString::new();

        write!(&mut buffer, "{value}")
            .map_err(|_| ser::Error::custom("number was more than 64 digits"))?;

        self.write_bulk(buffer.as_bytes())
    }
}

impl<'a> ser::Serializer for ArgSerializer<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = ser::Impossible<(), Error>;
    type SerializeTuple = ser::Impossible<(), Error>;
    type SerializeTupleStruct = ser::Impossible<(), Error>;
    type SerializeTupleVariant = ser::Impossible<(), Error>;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    #[inline]
    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        self.write_bulk(if v { b"1" } else { b"0" })
    }

    #[inline]
    fn serialize_i8(self, v: i8) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_i16(self, v: i16) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_i32(self, v: i32) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_i128(self, v: i128) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_u8(self, v: u8) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_u16(self, v: u16) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_u32(self, v: u32) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_u64(self, v: u64) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_u128(self, v: u128) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        self.write_number(v)
    }

    #[inline]
    fn serialize_char(self, v: char) -> Result<Self::Ok, Self::Error> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    #[inline]
    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        self.write_bulk(v.as_bytes())
    }

    #[inline]
    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        self.write_bulk(v)
    }

    #[inline]
    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        invalid_argument("an option")
    }

    #[inline]
    fn serialize_some<T: ?Sized>(self, _value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        invalid_argument("an option")
    }

    #[inline]
    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        invalid_argument("a unit")
    }

    #[inline]
    fn serialize_unit_struct(self, name: &'static str) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(name)
    }

    #[inline]
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        self.serialize_str(variant)
    }

    #[inline]
    fn serialize_newtype_struct<T: ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        value.serialize(self)
    }

    #[inline]
    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: ser::Serialize,
    {
        invalid_argument("a data enum")
    }

    #[inline]
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        invalid_argument("a nested sequence")
    }

    #[inline]
    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        invalid_argument("a nested tuple")
    }

    #[inline]
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        invalid_argument("a nested struct")
    }

    #[inline]
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        invalid_argument("a data enum")
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        invalid_argument("a map")
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        invalid_argument("a struct")
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        invalid_argument("a data enum")
    }
}

/// Utility type intended to reduce serde serializer boilerplate
///
/// Many of the serialization traits are functionally identical. This type
/// wraps some inner type and forwards the trait implementations
/// accordingly (for instance, from [`ser::SerializeSeq`] to
/// [`ser::SerializeTuple`])
#[derive(Debug, Clone, Copy, Default)]
pub struct TupleSeqAdapter<T> {
    inner: T,
}

impl<T> TupleSeqAdapter<T> {
    #[inline]
    #[must_use]
    fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<S: ser::SerializeSeq> ser::SerializeTuple for TupleSeqAdapter<S> {
    type Ok = S::Ok;
    type Error = S::Error;

    #[inline]
    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ser::Serialize,
    {
        self.inner.serialize_element(value)
    }

    #[inline]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

impl<S: ser::SerializeSeq> ser::SerializeTupleStruct for TupleSeqAdapter<S> {
    type Ok = S::Ok;
    type Error = S::Error;

    #[inline]
    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: ser::Serialize,
    {
        self.inner.serialize_element(value)
    }

    #[inline]
    fn end(self) -> Result<Self::Ok, Self::Error> {
        self.inner.end()
    }
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;
    use serde_bytes::Bytes;

    use super::*;

    fn encoded(command: &impl ser::Serialize) -> Vec<u8> {
        let mut buffer = Vec::new();
        write_command(&mut buffer, command).expect("failed to serialize");
        buffer
    }

    #[test]
    fn test_basic_command() {
        assert_eq!(
            encoded(&("SET", "key", "42")),
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n",
        );
    }

    #[test]
    fn test_slice_command() {
        assert_eq!(
            encoded(&["GET", "key"]),
            b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n",
        );

        let args: Vec<&str> = vec!["PING"];
        assert_eq!(encoded(&args), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(
            encoded(&("INCRBY", "counter", 5)),
            b"*3\r\n$6\r\nINCRBY\r\n$7\r\ncounter\r\n$1\r\n5\r\n",
        );
        assert_eq!(
            encoded(&("SET", "pi", 3.25)),
            b"*3\r\n$3\r\nSET\r\n$2\r\npi\r\n$4\r\n3.25\r\n",
        );
        assert_eq!(
            encoded(&("SET", "neg", -12i64)),
            b"*3\r\n$3\r\nSET\r\n$3\r\nneg\r\n$3\r\n-12\r\n",
        );
    }

    #[test]
    fn test_bool_coercion() {
        assert_eq!(
            encoded(&("SET", "flag", true)),
            b"*3\r\n$3\r\nSET\r\n$4\r\nflag\r\n$1\r\n1\r\n",
        );
    }

    #[test]
    fn test_binary_argument() {
        assert_eq!(
            encoded(&("SET", "key", Bytes::new(b"\x00\xffbinary\r\n"))),
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$10\r\n\x00\xffbinary\r\n\r\n",
        );
    }

    #[test]
    fn test_flag_argument() {
        #[derive(serde::Serialize)]
        enum Expiry {
            #[serde(rename = "KEEPTTL")]
            Keep,
        }

        assert_eq!(
            encoded(&("SET", "key", "value", Expiry::Keep)),
            b"*4\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n$7\r\nKEEPTTL\r\n",
        );
    }

    #[test]
    fn test_rejects_bare_scalar() {
        let mut buffer = Vec::new();
        assert_matches!(
            write_command(&mut buffer, "GET"),
            Err(Error::NotASequence),
        );
    }

    #[test]
    fn test_rejects_structured_argument() {
        let mut buffer = Vec::new();
        assert_matches!(
            write_command(&mut buffer, &("DEL", vec!["a", "b"])),
            Err(Error::Custom(message)) => {
                assert!(message.contains("nested sequence"));
            },
        );

        let mut buffer = Vec::new();
        assert_matches!(
            write_command(&mut buffer, &("GET", Some("key"))),
            Err(Error::Custom(..)),
        );
    }

    #[test]
    fn test_back_to_back_commands() {
        let mut buffer = Vec::new();
        write_command(&mut buffer, &("GET", "a")).expect("failed to serialize");
        write_command(&mut buffer, &("GET", "b")).expect("failed to serialize");

        assert_eq!(
            buffer,
            b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\nb\r\n",
        );
    }
}
