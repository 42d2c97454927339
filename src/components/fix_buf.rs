use std::fmt;
use std::ops::Deref;
use std::str;

use arrayvec::ArrayVec;
use serde::{de, ser};

use super::FIX_BUF_TOKEN;

/**
An inline, fixed-capacity byte buffer.

`FixBuf` decodes from any string-family reply (simple string, bulk string,
or big number) whose body is at most `N` bytes, copying the bytes into the
buffer itself rather than onto the heap. It's the string target of choice
when decoding must not allocate; pair it with borrowed `&str` when the
reply can stay tied to the session's buffer, or `String` when it can't and
allocation is fine.

A reply longer than `N` fails with
[`BufferTooSmall`][crate::de::Error::BufferTooSmall]; bytes are never
silently truncated.

Equality is bytewise over the valid prefix, and compares directly against
slices, arrays, and `str`:

```
use typedis::components::FixBuf;
use typedis::de::from_bytes;

let name: FixBuf<16> = from_bytes(b"$5\r\nhello\r\n").expect("failed to deserialize");

assert_eq!(name, *b"hello");
assert_eq!(name.as_str(), Some("hello"));
assert_eq!(name.len(), 5);
```
*/
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FixBuf<const N: usize> {
    data: ArrayVec<u8, N>,
}

impl<const N: usize> FixBuf<N> {
    /// The maximum number of bytes this buffer can hold.
    pub const CAPACITY: usize = N;

    /// Create an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: ArrayVec::new(),
        }
    }

    /// The valid bytes of the buffer.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The buffer's contents as a string, if they're valid UTF-8.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        str::from_utf8(self.as_slice()).ok()
    }

    /// The number of valid bytes in the buffer.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<const N: usize> Deref for FixBuf<N> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const N: usize> AsRef<[u8]> for FixBuf<N> {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<const N: usize> fmt::Debug for FixBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixBuf(b\"{}\")", self.as_slice().escape_ascii())
    }
}

impl<'a, const N: usize> TryFrom<&'a [u8]> for FixBuf<N> {
    type Error = arrayvec::CapacityError;

    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let mut data = ArrayVec::new();
        data.try_extend_from_slice(bytes)?;

        Ok(Self { data })
    }
}

impl<const N: usize> PartialEq<[u8]> for FixBuf<N> {
    #[inline]
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl<const N: usize> PartialEq<&[u8]> for FixBuf<N> {
    #[inline]
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl<const N: usize, const M: usize> PartialEq<[u8; M]> for FixBuf<N> {
    #[inline]
    fn eq(&self, other: &[u8; M]) -> bool {
        self.as_slice() == other
    }
}

impl<const N: usize> PartialEq<str> for FixBuf<N> {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.as_slice() == other.as_bytes()
    }
}

impl<const N: usize> PartialEq<&str> for FixBuf<N> {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.as_slice() == other.as_bytes()
    }
}

impl<'de, const N: usize> de::Deserialize<'de> for FixBuf<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // The capacity rides along as the tuple struct length, so the RESP
        // deserializer can reject an oversized payload with a typed error
        // before it reaches the visitor.
        deserializer.deserialize_tuple_struct(FIX_BUF_TOKEN, N, Visitor)
    }
}

struct Visitor<const N: usize>;

impl<'de, const N: usize> de::Visitor<'de> for Visitor<N> {
    type Value = FixBuf<N>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string of at most {N} bytes")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        FixBuf::try_from(v).map_err(|_| de::Error::invalid_length(v.len(), &self))
    }

    #[inline]
    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_bytes(v.as_bytes())
    }
}

impl<const N: usize> ser::Serialize for FixBuf<N> {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;

    use crate::de::{from_bytes, Error};

    use super::*;

    #[test]
    fn test_exact_capacity() {
        let buf: FixBuf<5> = from_bytes(b"$5\r\nhello\r\n").expect("failed to deserialize");
        assert_eq!(buf, "hello");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_shorter_than_capacity() {
        let buf: FixBuf<11> = from_bytes(b"$10\r\nyes please\r\n").expect("failed to deserialize");
        assert_eq!(buf, *b"yes please");
        assert_eq!(buf.as_str(), Some("yes please"));
    }

    #[test]
    fn test_over_capacity() {
        assert_matches!(
            from_bytes::<FixBuf<9>>(b"$10\r\nyes please\r\n"),
            Err(Error::BufferTooSmall),
        );
    }

    #[test]
    fn test_from_simple_string() {
        let buf: FixBuf<2> = from_bytes(b"+OK\r\n").expect("failed to deserialize");
        assert_eq!(buf, "OK");
    }

    #[test]
    fn test_nil_is_not_a_buffer() {
        assert_matches!(from_bytes::<FixBuf<8>>(b"$-1\r\n"), Err(Error::UnexpectedNil));
    }

    #[test]
    fn test_empty() {
        let buf: FixBuf<4> = from_bytes(b"$0\r\n\r\n").expect("failed to deserialize");
        assert!(buf.is_empty());
        assert_eq!(buf, FixBuf::new());
    }

    #[test]
    fn test_binary_contents() {
        let buf: FixBuf<4> = from_bytes(b"$3\r\n\x00\x01\xff\r\n").expect("failed to deserialize");
        assert_eq!(buf, *b"\x00\x01\xff");
        assert_eq!(buf.as_str(), None);
        assert_eq!(format!("{buf:?}"), r#"FixBuf(b"\x00\x01\xff")"#);
    }
}
