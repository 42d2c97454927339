use std::fmt;
use std::marker::PhantomData;

use serde::de;

use super::KEY_VALUE_PAIRS_TOKEN;

/**
One key-value pair.

`KeyValue` decodes from a 2-element aggregate, or (when the surrounding
target is a sequence and the wire frame is a RESP3 map) from the adjacent
key and value frames of one map entry. There are no further invariants;
both fields are plain public data.

```
use typedis::components::KeyValue;
use typedis::de::from_bytes;

// One entry of a map frame
let pairs: Vec<KeyValue<String, i64>> =
    from_bytes(b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n").expect("failed to deserialize");

assert_eq!(pairs[0], KeyValue { key: "a".to_owned(), value: 1 });
assert_eq!(pairs[1].value, 2);
```
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyValue<K, V> {
    /// The entry's key.
    pub key: K,
    /// The entry's value.
    pub value: V,
}

impl<'de, K, V> de::Deserialize<'de> for KeyValue<K, V>
where
    K: de::Deserialize<'de>,
    V: de::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> de::Visitor<'de> for Visitor<K, V>
        where
            K: de::Deserialize<'de>,
            V: de::Deserialize<'de>,
        {
            type Value = KeyValue<K, V>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a key-value pair")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let key = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                Ok(KeyValue { key, value })
            }
        }

        deserializer.deserialize_tuple(2, Visitor(PhantomData))
    }
}

/**
Adapter that decodes a sequence of pairs from either map shape on the wire.

RESP3 servers reply to key-value commands with a real map frame (`%n`);
RESP2 servers reply with a flattened array of alternating keys and values
(`*2n`), the `HGETALL` shape. A sequence-of-pairs target such as
`Vec<KeyValue<K, V>>` or `Vec<(K, V)>` decodes from the map frame
directly, but has no way to know that a flat array should be chunked two
frames at a time. Wrapping the collection in `KeyValuePairs` opts into
exactly that chunking, and accepts both wire shapes.

Use a plain struct or `HashMap` target instead when you want keyed access;
`KeyValuePairs` is for when the entry *order* matters or keys repeat.

```
use typedis::components::{KeyValue, KeyValuePairs};
use typedis::de::from_bytes;

// The RESP2 flat shape...
let KeyValuePairs(pairs): KeyValuePairs<Vec<(String, i64)>> =
    from_bytes(b"*4\r\n+a\r\n:1\r\n+b\r\n:2\r\n").expect("failed to deserialize");

assert_eq!(pairs, [("a".to_owned(), 1), ("b".to_owned(), 2)]);

// ...and the RESP3 map shape decode identically.
let KeyValuePairs(pairs): KeyValuePairs<Vec<(String, i64)>> =
    from_bytes(b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n").expect("failed to deserialize");

assert_eq!(pairs, [("a".to_owned(), 1), ("b".to_owned(), 2)]);
```
*/
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyValuePairs<C>(pub C);

impl<'de, C> de::Deserialize<'de> for KeyValuePairs<C>
where
    C: de::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<C>(PhantomData<C>);

        impl<'de, C> de::Visitor<'de> for Visitor<C>
        where
            C: de::Deserialize<'de>,
        {
            type Value = KeyValuePairs<C>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a sequence of key-value pairs")
            }

            fn visit_seq<A>(self, seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                C::deserialize(de::value::SeqAccessDeserializer::new(seq)).map(KeyValuePairs)
            }

            fn visit_newtype_struct<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                C::deserialize(deserializer).map(KeyValuePairs)
            }
        }

        deserializer.deserialize_newtype_struct(KEY_VALUE_PAIRS_TOKEN, Visitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;

    use crate::de::{from_bytes, Error};

    use super::*;

    #[test]
    fn test_pair_is_deserializer_agnostic() {
        use serde_test::{assert_de_tokens, Token};

        assert_de_tokens(
            &KeyValue {
                key: "a".to_owned(),
                value: 1i64,
            },
            &[
                Token::Seq { len: Some(2) },
                Token::Str("a"),
                Token::I64(1),
                Token::SeqEnd,
            ],
        );
    }

    #[test]
    fn test_pair_from_sub_aggregate() {
        let pair: KeyValue<String, i64> =
            from_bytes(b"*2\r\n+cursor\r\n:17\r\n").expect("failed to deserialize");

        assert_eq!(pair.key, "cursor");
        assert_eq!(pair.value, 17);
    }

    #[test]
    fn test_pairs_from_nested_aggregates() {
        let pairs: Vec<KeyValue<String, i64>> = from_bytes(
            b"*2\r\n*2\r\n+a\r\n:1\r\n*2\r\n+b\r\n:2\r\n",
        )
        .expect("failed to deserialize");

        assert_eq!(
            pairs,
            [
                KeyValue { key: "a".to_owned(), value: 1 },
                KeyValue { key: "b".to_owned(), value: 2 },
            ],
        );
    }

    #[test]
    fn test_pairs_from_map_frame() {
        let pairs: Vec<KeyValue<String, i64>> =
            from_bytes(b"%2\r\n+a\r\n:1\r\n+b\r\n:2\r\n").expect("failed to deserialize");

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], KeyValue { key: "b".to_owned(), value: 2 });
    }

    #[test]
    fn test_flat_pairs_require_the_adapter() {
        // Without the adapter, a flat array is a sequence of single
        // frames, and each element fails to decode as a pair.
        assert_matches!(
            from_bytes::<Vec<KeyValue<String, i64>>>(b"*4\r\n+a\r\n:1\r\n+b\r\n:2\r\n"),
            Err(Error::UnexpectedTag(b'+')),
        );

        let KeyValuePairs(pairs): KeyValuePairs<Vec<KeyValue<String, i64>>> =
            from_bytes(b"*4\r\n+a\r\n:1\r\n+b\r\n:2\r\n").expect("failed to deserialize");

        assert_eq!(pairs[0], KeyValue { key: "a".to_owned(), value: 1 });
        assert_eq!(pairs[1], KeyValue { key: "b".to_owned(), value: 2 });
    }

    #[test]
    fn test_flat_pairs_odd_length() {
        assert_matches!(
            from_bytes::<KeyValuePairs<Vec<(String, i64)>>>(b"*3\r\n+a\r\n:1\r\n+b\r\n"),
            Err(Error::OddPairLength),
        );
    }

    #[test]
    fn test_duplicate_keys_are_preserved() {
        let KeyValuePairs(pairs): KeyValuePairs<Vec<(String, i64)>> =
            from_bytes(b"*4\r\n+a\r\n:1\r\n+a\r\n:2\r\n").expect("failed to deserialize");

        assert_eq!(pairs, [("a".to_owned(), 1), ("a".to_owned(), 2)]);
    }
}
