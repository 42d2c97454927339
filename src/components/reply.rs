use std::fmt;

use serde::de;

use super::{FullError, KeyValue, REPLY_TOKEN};

/**
A fully dynamic reply: one variant for every RESP frame tag, recursive at
the aggregates.

`Reply` is the target of last resort, for commands whose reply shape isn't
known at compile time (`COMMAND`, module commands, debugging sessions). It
owns all of its data (strings become owned buffers, aggregates become
`Vec`s), so it requires the owned (allocating) decode, and dropping the
tree releases everything it acquired.

Decoding never conflates the tags: a simple string, a bulk string, and a
big number stay distinguishable, as do arrays and sets. Server error
frames decode into [`Reply::Error`] rather than failing the decode.

```
use typedis::components::Reply;
use typedis::de::from_bytes;

let reply: Reply = from_bytes(b"*3\r\n:1\r\n$1\r\nx\r\n#t\r\n").expect("failed to deserialize");

assert_eq!(
    reply,
    Reply::Array(vec![
        Reply::Int(1),
        Reply::Blob(b"x".to_vec()),
        Reply::Boolean(true),
    ]),
);
```

[`Reply::encode`] writes the canonical RESP3 form back out, so a decoded
tree can be re-sent byte-for-byte; handy for proxies and for test
servers.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A `+` simple string.
    Simple(Vec<u8>),
    /// A `-` error reply, kept as a value.
    Error(FullError),
    /// A `:` integer.
    Int(i64),
    /// A `$` bulk string.
    Blob(Vec<u8>),
    /// A `*` array of nested replies.
    Array(Vec<Reply>),
    /// A `,` double.
    Double(f64),
    /// A `#` boolean.
    Boolean(bool),
    /// A `(` big number, kept verbatim as its decimal digits.
    BigNumber(Vec<u8>),
    /// Any of the nil spellings (`$-1`, `*-1`, `_`).
    Nil,
    /// A `~` set of nested replies.
    Set(Vec<Reply>),
    /// A `%` map of nested reply pairs.
    Map(Vec<KeyValue<Reply, Reply>>),
}

impl Reply {
    /// True if the reply is nil.
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// The reply's bytes, if it's any of the string-family variants.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Simple(bytes) | Self::Blob(bytes) | Self::BigNumber(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The reply as an integer, if it's a `:` frame.
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Self::Int(value) => Some(value),
            _ => None,
        }
    }

    /// Append the canonical RESP3 encoding of this reply to `dest`.
    ///
    /// Nil is written as the RESP3 `_\r\n` regardless of which spelling it
    /// was decoded from; everything else round-trips byte-for-byte.
    pub fn encode(&self, dest: &mut Vec<u8>) {
        match self {
            Self::Simple(payload) => write_line(dest, b'+', payload),
            Self::Error(error) => write_line(dest, b'-', error.message.as_bytes()),
            Self::Int(value) => write_line(dest, b':', value.to_string().as_bytes()),
            Self::Blob(payload) => {
                write_line(dest, b'$', payload.len().to_string().as_bytes());
                dest.extend_from_slice(payload);
                dest.extend_from_slice(b"\r\n");
            }
            Self::Array(items) => {
                write_line(dest, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(dest);
                }
            }
            Self::Double(value) => {
                if value.is_nan() {
                    write_line(dest, b',', b"nan");
                } else {
                    write_line(dest, b',', value.to_string().as_bytes());
                }
            }
            Self::Boolean(value) => write_line(dest, b'#', if *value { b"t" } else { b"f" }),
            Self::BigNumber(digits) => write_line(dest, b'(', digits),
            Self::Nil => dest.extend_from_slice(b"_\r\n"),
            Self::Set(items) => {
                write_line(dest, b'~', items.len().to_string().as_bytes());
                for item in items {
                    item.encode(dest);
                }
            }
            Self::Map(pairs) => {
                write_line(dest, b'%', pairs.len().to_string().as_bytes());
                for pair in pairs {
                    pair.key.encode(dest);
                    pair.value.encode(dest);
                }
            }
        }
    }

    /// The canonical RESP3 encoding of this reply as a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut dest = Vec::new();
        self.encode(&mut dest);
        dest
    }
}

fn write_line(dest: &mut Vec<u8>, tag: u8, payload: &[u8]) {
    dest.push(tag);
    dest.extend_from_slice(payload);
    dest.extend_from_slice(b"\r\n");
}

const REPLY_VARIANTS: &[&str] = &[
    "Simple",
    "Error",
    "Int",
    "Blob",
    "Array",
    "Double",
    "Boolean",
    "BigNumber",
    "Nil",
    "Set",
    "Map",
];

enum Kind {
    Simple,
    Error,
    Int,
    Blob,
    Array,
    Double,
    Boolean,
    BigNumber,
    Nil,
    Set,
    Map,
}

impl<'de> de::Deserialize<'de> for Kind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = Kind;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a reply variant name")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match v {
                    "Simple" => Ok(Kind::Simple),
                    "Error" => Ok(Kind::Error),
                    "Int" => Ok(Kind::Int),
                    "Blob" => Ok(Kind::Blob),
                    "Array" => Ok(Kind::Array),
                    "Double" => Ok(Kind::Double),
                    "Boolean" => Ok(Kind::Boolean),
                    "BigNumber" => Ok(Kind::BigNumber),
                    "Nil" => Ok(Kind::Nil),
                    "Set" => Ok(Kind::Set),
                    "Map" => Ok(Kind::Map),
                    _ => Err(de::Error::unknown_variant(v, REPLY_VARIANTS)),
                }
            }
        }

        deserializer.deserialize_identifier(Visitor)
    }
}

/// Seed that decodes a string-family payload into an owned buffer.
struct OwnedBytes;

impl<'de> de::DeserializeSeed<'de> for OwnedBytes {
    type Value = Vec<u8>;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = Vec<u8>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte string")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.as_bytes().to_vec())
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.into_bytes())
            }
        }

        deserializer.deserialize_byte_buf(Visitor)
    }
}

impl<'de> de::Deserialize<'de> for Reply {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = Reply;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any RESP reply")
            }

            fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
            where
                A: de::EnumAccess<'de>,
            {
                use de::VariantAccess as _;

                let (kind, access) = data.variant()?;

                match kind {
                    Kind::Simple => access.newtype_variant_seed(OwnedBytes).map(Reply::Simple),
                    Kind::Error => access.newtype_variant().map(Reply::Error),
                    Kind::Int => access.newtype_variant().map(Reply::Int),
                    Kind::Blob => access.newtype_variant_seed(OwnedBytes).map(Reply::Blob),
                    Kind::Array => access.newtype_variant().map(Reply::Array),
                    Kind::Double => access.newtype_variant().map(Reply::Double),
                    Kind::Boolean => access.newtype_variant().map(Reply::Boolean),
                    Kind::BigNumber => {
                        access.newtype_variant_seed(OwnedBytes).map(Reply::BigNumber)
                    }
                    Kind::Nil => access.unit_variant().map(|()| Reply::Nil),
                    Kind::Set => access.newtype_variant().map(Reply::Set),
                    Kind::Map => access.newtype_variant().map(Reply::Map),
                }
            }
        }

        deserializer.deserialize_enum(REPLY_TOKEN, REPLY_VARIANTS, Visitor)
    }
}

#[cfg(test)]
mod tests {
    use std::alloc::{GlobalAlloc, Layout, System};
    use std::cell::Cell;

    use cool_asserts::assert_matches;

    use crate::de::from_bytes;

    use super::*;

    #[test]
    fn test_scalar_variants() {
        assert_eq!(from_bytes::<Reply>(b"+OK\r\n").unwrap(), Reply::Simple(b"OK".to_vec()));
        assert_eq!(from_bytes::<Reply>(b":42\r\n").unwrap(), Reply::Int(42));
        assert_eq!(from_bytes::<Reply>(b"$2\r\nhi\r\n").unwrap(), Reply::Blob(b"hi".to_vec()));
        assert_eq!(from_bytes::<Reply>(b",2.5\r\n").unwrap(), Reply::Double(2.5));
        assert_eq!(from_bytes::<Reply>(b"#f\r\n").unwrap(), Reply::Boolean(false));
        assert_eq!(from_bytes::<Reply>(b"$-1\r\n").unwrap(), Reply::Nil);
        assert_eq!(from_bytes::<Reply>(b"_\r\n").unwrap(), Reply::Nil);
        assert_eq!(
            from_bytes::<Reply>(b"(12345678901234567890123\r\n").unwrap(),
            Reply::BigNumber(b"12345678901234567890123".to_vec()),
        );
    }

    #[test]
    fn test_error_variant_is_data() {
        let reply: Reply = from_bytes(b"-ERR unknown command\r\n").expect("failed to deserialize");

        assert_matches!(reply, Reply::Error(error) => {
            assert_eq!(error.code, "ERR");
            assert_eq!(error.message, "ERR unknown command");
        });
    }

    #[test]
    fn test_nested_aggregates() {
        let reply: Reply = from_bytes(
            b"*3\r\n~2\r\n:1\r\n:2\r\n%1\r\n+key\r\n$5\r\nvalue\r\n$-1\r\n",
        )
        .expect("failed to deserialize");

        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Set(vec![Reply::Int(1), Reply::Int(2)]),
                Reply::Map(vec![KeyValue {
                    key: Reply::Simple(b"key".to_vec()),
                    value: Reply::Blob(b"value".to_vec()),
                }]),
                Reply::Nil,
            ]),
        );
    }

    #[test]
    fn test_round_trip() {
        // Decode, re-encode as a simulated server, decode again; the trees
        // must be equal, and the canonical bytes must be stable.
        let wire: &[u8] = b"*4\r\n\
            %2\r\n+a\r\n:1\r\n+b\r\n,1.5\r\n\
            ~1\r\n#t\r\n\
            -WRONGTYPE bad key\r\n\
            (999999999999999999999999\r\n";

        let reply: Reply = from_bytes(wire).expect("failed to deserialize");
        let encoded = reply.to_bytes();
        let again: Reply = from_bytes(&encoded).expect("failed to re-deserialize");

        assert_eq!(reply, again);
        assert_eq!(encoded, again.to_bytes());
    }

    #[test]
    fn test_nil_encodes_canonically() {
        let reply: Reply = from_bytes(b"*2\r\n$-1\r\n_\r\n").expect("failed to deserialize");
        assert_eq!(reply.to_bytes(), b"*2\r\n_\r\n_\r\n");
    }

    #[test]
    fn test_accessors() {
        assert!(from_bytes::<Reply>(b"_\r\n").unwrap().is_nil());
        assert_eq!(from_bytes::<Reply>(b":9\r\n").unwrap().as_int(), Some(9));
        assert_eq!(
            from_bytes::<Reply>(b"+hi\r\n").unwrap().as_bytes(),
            Some(&b"hi"[..]),
        );
    }

    // A counting allocator wrapper, tracking this thread's live bytes so
    // parallel tests can't perturb the measurement.
    struct CountingAllocator;

    thread_local! {
        static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
    }

    unsafe impl GlobalAlloc for CountingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            LIVE_BYTES.with(|live| live.set(live.get() + layout.size() as isize));
            System.alloc(layout)
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            LIVE_BYTES.with(|live| live.set(live.get() - layout.size() as isize));
            System.dealloc(ptr, layout)
        }
    }

    #[global_allocator]
    static ALLOCATOR: CountingAllocator = CountingAllocator;

    #[test]
    fn test_dropping_a_reply_frees_every_allocation() {
        let wire: &[u8] = b"*3\r\n\
            $5\r\nhello\r\n\
            %2\r\n+a\r\n*2\r\n:1\r\n$3\r\nabc\r\n+b\r\n-ERR nested\r\n\
            ~2\r\n(123\r\n$0\r\n\r\n";

        let before = LIVE_BYTES.with(Cell::get);

        let reply: Reply = from_bytes(wire).expect("failed to deserialize");
        assert!(LIVE_BYTES.with(Cell::get) > before);

        drop(reply);
        assert_eq!(LIVE_BYTES.with(Cell::get), before);
    }
}
