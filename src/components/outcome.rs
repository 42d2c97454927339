use std::fmt;

use serde::de;

use super::{FixBuf, OR_ERR_TOKEN, OR_FULL_ERR_TOKEN};

/// The conventional error code from a server error reply: the first
/// whitespace-delimited token of the error line (`ERR`, `WRONGTYPE`,
/// `EXECABORT`, ...), stored inline. A pathologically long code is
/// truncated to the buffer capacity rather than rejected, so an exotic
/// server error can never mask the error outcome itself.
pub type ErrorCode = FixBuf<32>;

/**
A three-way command outcome: a value, a nil reply, or a server error
reduced to its [code][ErrorCode].

By default the deserializer treats a `-` error frame as a decode failure
([`Error::Server`][crate::de::Error::Server]) and a nil frame against a
non-optional target as [`Error::UnexpectedNil`][crate::de::Error::UnexpectedNil].
`OrErr` opts out of both: all three outcomes become ordinary values, which
is what you want when a command is *expected* to fail sometimes and the
code is enough to tell why. Nothing here allocates, so `OrErr` works
equally well for decoding into inline targets.

```
use typedis::components::OrErr;
use typedis::de::from_bytes;

let outcome: OrErr<i64> = from_bytes(b":5\r\n").expect("failed to deserialize");
assert_eq!(outcome, OrErr::Ok(5));

let outcome: OrErr<i64> = from_bytes(b"$-1\r\n").expect("failed to deserialize");
assert_eq!(outcome, OrErr::Nil);

let outcome: OrErr<i64> = from_bytes(b"-ERR value is not an integer or out of range\r\n")
    .expect("failed to deserialize");
assert!(outcome.err().is_some_and(|code| code == "ERR"));
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrErr<T> {
    /// The command succeeded with a value.
    Ok(T),
    /// The command replied nil.
    Nil,
    /// The command failed; the payload is the error code.
    Err(ErrorCode),
}

impl<T> OrErr<T> {
    /// The success value, if there is one.
    #[inline]
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// The error code, if the server replied with an error.
    #[inline]
    #[must_use]
    pub fn err(self) -> Option<ErrorCode> {
        match self {
            Self::Err(code) => Some(code),
            _ => None,
        }
    }

    /// True if the server replied nil.
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Convert into a [`Result`], with nil becoming `Ok(None)`.
    #[inline]
    pub fn into_result(self) -> Result<Option<T>, ErrorCode> {
        match self {
            Self::Ok(value) => Ok(Some(value)),
            Self::Nil => Ok(None),
            Self::Err(code) => Err(code),
        }
    }
}

impl<'de, T> de::Deserialize<'de> for OrErr<T>
where
    T: de::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<T>(std::marker::PhantomData<T>);

        impl<'de, T: de::Deserialize<'de>> de::Visitor<'de> for Visitor<T> {
            type Value = OrErr<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a value, a nil reply, or an error reply")
            }

            fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
            where
                A: de::EnumAccess<'de>,
            {
                use de::VariantAccess as _;

                let (kind, access) = data.variant()?;

                match kind {
                    OutcomeKind::Ok => access.newtype_variant().map(OrErr::Ok),
                    OutcomeKind::Nil => access.unit_variant().map(|()| OrErr::Nil),
                    OutcomeKind::Err => access.newtype_variant().map(OrErr::Err),
                }
            }
        }

        deserializer.deserialize_enum(OR_ERR_TOKEN, OUTCOME_VARIANTS, Visitor(std::marker::PhantomData))
    }
}

/**
A three-way command outcome that keeps the whole error message.

Identical to [`OrErr`], except that the error variant carries a
[`FullError`]: the leading code *and* the complete message line as an owned
`String`. Use it with the owned (allocating) decode when the full error
text matters; in a non-allocating decode, prefer [`OrErr`], whose code is
stored inline.

```
use typedis::components::OrFullErr;
use typedis::de::from_bytes;

let outcome: OrFullErr<i64> = from_bytes(b"-ERR foo bar\r\n").expect("failed to deserialize");

match outcome {
    OrFullErr::Err(error) => {
        assert_eq!(error.code, "ERR");
        assert_eq!(error.message, "ERR foo bar");
    }
    other => panic!("expected an error, got {other:?}"),
}
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrFullErr<T> {
    /// The command succeeded with a value.
    Ok(T),
    /// The command replied nil.
    Nil,
    /// The command failed; the payload carries the code and full message.
    Err(FullError),
}

impl<T> OrFullErr<T> {
    /// The success value, if there is one.
    #[inline]
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// The error, if the server replied with one.
    #[inline]
    #[must_use]
    pub fn err(self) -> Option<FullError> {
        match self {
            Self::Err(error) => Some(error),
            _ => None,
        }
    }

    /// True if the server replied nil.
    #[inline]
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Convert into a [`Result`], with nil becoming `Ok(None)`.
    #[inline]
    pub fn into_result(self) -> Result<Option<T>, FullError> {
        match self {
            Self::Ok(value) => Ok(Some(value)),
            Self::Nil => Ok(None),
            Self::Err(error) => Err(error),
        }
    }
}

impl<'de, T> de::Deserialize<'de> for OrFullErr<T>
where
    T: de::Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<T>(std::marker::PhantomData<T>);

        impl<'de, T: de::Deserialize<'de>> de::Visitor<'de> for Visitor<T> {
            type Value = OrFullErr<T>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a value, a nil reply, or an error reply")
            }

            fn visit_enum<A>(self, data: A) -> Result<Self::Value, A::Error>
            where
                A: de::EnumAccess<'de>,
            {
                use de::VariantAccess as _;

                let (kind, access) = data.variant()?;

                match kind {
                    OutcomeKind::Ok => access.newtype_variant().map(OrFullErr::Ok),
                    OutcomeKind::Nil => access.unit_variant().map(|()| OrFullErr::Nil),
                    OutcomeKind::Err => access.newtype_variant().map(OrFullErr::Err),
                }
            }
        }

        deserializer.deserialize_enum(
            OR_FULL_ERR_TOKEN,
            OUTCOME_VARIANTS,
            Visitor(std::marker::PhantomData),
        )
    }
}

/// A server error reply in full: the conventional leading
/// [code][ErrorCode], plus the complete message line (which includes the
/// code) as an owned string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullError {
    /// The first whitespace-delimited token of the error line.
    pub code: ErrorCode,
    /// The whole error line, code included.
    pub message: String,
}

impl fmt::Display for FullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FullError {}

impl<'de> de::Deserialize<'de> for FullError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = FullError;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an error code and message pair")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let code = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let message = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                Ok(FullError { code, message })
            }
        }

        deserializer.deserialize_tuple(2, Visitor)
    }
}

const OUTCOME_VARIANTS: &[&str] = &["Ok", "Nil", "Err"];

enum OutcomeKind {
    Ok,
    Nil,
    Err,
}

impl<'de> de::Deserialize<'de> for OutcomeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = OutcomeKind;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an outcome variant name")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match v {
                    "Ok" => Ok(OutcomeKind::Ok),
                    "Nil" => Ok(OutcomeKind::Nil),
                    "Err" => Ok(OutcomeKind::Err),
                    _ => Err(de::Error::unknown_variant(v, OUTCOME_VARIANTS)),
                }
            }
        }

        deserializer.deserialize_identifier(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;

    use crate::components::FixBuf;
    use crate::de::{from_bytes, Error};

    use super::*;

    #[test]
    fn test_ok_value() {
        assert_eq!(
            from_bytes::<OrErr<i64>>(b":42\r\n").expect("failed to deserialize"),
            OrErr::Ok(42),
        );
    }

    #[test]
    fn test_nil() {
        assert_eq!(
            from_bytes::<OrErr<i64>>(b"$-1\r\n").expect("failed to deserialize"),
            OrErr::Nil,
        );
        assert_eq!(
            from_bytes::<OrFullErr<i64>>(b"_\r\n").expect("failed to deserialize"),
            OrFullErr::Nil,
        );
    }

    #[test]
    fn test_error_code() {
        let outcome: OrErr<i64> =
            from_bytes(b"-ERR value is not an integer or out of range\r\n")
                .expect("failed to deserialize");

        assert_matches!(outcome, OrErr::Err(code) => assert_eq!(code, "ERR"));
    }

    #[test]
    fn test_error_code_is_first_token() {
        let outcome: OrErr<()> =
            from_bytes(b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n")
                .expect("failed to deserialize");

        assert_matches!(outcome, OrErr::Err(code) => assert_eq!(code, "WRONGTYPE"));
    }

    #[test]
    fn test_overlong_code_is_truncated() {
        let outcome: OrErr<()> =
            from_bytes(b"-THISCODEISMUCHLONGERTHANTHIRTYTWOBYTES oops\r\n")
                .expect("failed to deserialize");

        assert_matches!(
            outcome,
            OrErr::Err(code) => assert_eq!(code, "THISCODEISMUCHLONGERTHANTHIRTYTW"),
        );
    }

    #[test]
    fn test_full_error() {
        let outcome: OrFullErr<i64> =
            from_bytes(b"-ERR foo bar\r\n").expect("failed to deserialize");

        assert_matches!(outcome, OrFullErr::Err(error) => {
            assert_eq!(error.code, "ERR");
            assert_eq!(error.message, "ERR foo bar");
            assert_eq!(error.to_string(), "ERR foo bar");
        });
    }

    #[test]
    fn test_ok_from_plain_acknowledgement() {
        assert_eq!(
            from_bytes::<OrErr<()>>(b"+OK\r\n").expect("failed to deserialize"),
            OrErr::Ok(()),
        );
        assert_eq!(
            from_bytes::<OrErr<FixBuf<10>>>(b"+OK\r\n")
                .expect("failed to deserialize")
                .ok()
                .expect("expected a value"),
            "OK",
        );
    }

    #[test]
    fn test_nested_outcome() {
        let outcome: OrErr<Option<Vec<i64>>> =
            from_bytes(b"*2\r\n:1\r\n:2\r\n").expect("failed to deserialize");

        assert_eq!(outcome, OrErr::Ok(Some(vec![1, 2])));
    }

    #[test]
    fn test_inner_decode_errors_still_surface() {
        // The reply isn't an error frame, so the Ok path decodes the inner
        // type, and *its* failure is a real failure.
        assert_matches!(
            from_bytes::<OrErr<i64>>(b"+notanumber\r\n"),
            Err(Error::NotANumber),
        );
    }

    #[test]
    fn test_into_result() {
        assert_eq!(OrErr::Ok(1).into_result(), Ok(Some(1)));
        assert_eq!(OrErr::<i64>::Nil.into_result(), Ok(None));
        assert!(OrErr::<i64>::Err(ErrorCode::new()).into_result().is_err());
    }
}
