// Helpers for deserializing the error-aware sums from RESP values (and in
// particular for handling `-ERR message\r\n` as an enum variant rather than
// a failure), plus the tag dispatch behind the dynamic `Reply` tree.

use serde::{de, forward_to_deserialize_any};

use crate::components::ErrorCode;

use super::parse::TaggedHeader;
use super::{Error, PreParsedDeserializer};

/// Extract the conventional error code from an error line: the first
/// whitespace-delimited token, truncated to the inline code capacity so the
/// token always fits an [`ErrorCode`].
fn error_code(message: &[u8]) -> &[u8] {
    let token = message
        .split(|b: &u8| b.is_ascii_whitespace())
        .next()
        .unwrap_or(b"");

    &token[..token.len().min(ErrorCode::CAPACITY)]
}

pub(super) struct OutcomeAccess<T> {
    access: T,
}

impl<T> OutcomeAccess<T> {
    #[inline]
    #[must_use]
    fn new(access: T) -> Self {
        Self { access }
    }
}

impl OutcomeAccess<PlainOkPattern> {
    /// The `+OK\r\n` acknowledgement, deliverable as `Ok(())` or
    /// `Ok("OK")`.
    #[inline]
    #[must_use]
    pub fn new_plain_ok() -> Self {
        Self::new(PlainOkPattern)
    }
}

impl<'a, 'de> OutcomeAccess<OkPattern<'a, 'de>> {
    /// Any non-error, non-nil frame, delivered inline to the `Ok` payload.
    #[inline]
    #[must_use]
    pub fn new_ok(deserializer: PreParsedDeserializer<'a, 'de>) -> Self {
        Self::new(OkPattern { deserializer })
    }
}

impl<'de> OutcomeAccess<MessageErrPattern<'de>> {
    /// An error frame whose `Err` payload is the whole message line.
    #[inline]
    #[must_use]
    pub fn new_message_err(message: &'de [u8]) -> Self {
        Self::new(MessageErrPattern { message })
    }
}

impl<'de> OutcomeAccess<CodeErrPattern<'de>> {
    /// An error frame whose `Err` payload is just the leading code token.
    #[inline]
    #[must_use]
    pub fn new_code_err(message: &'de [u8]) -> Self {
        Self::new(CodeErrPattern {
            code: error_code(message),
        })
    }
}

impl<'de> OutcomeAccess<FullErrPattern<'de>> {
    /// An error frame whose `Err` payload is the (code, message) pair.
    #[inline]
    #[must_use]
    pub fn new_full_err(message: &'de [u8]) -> Self {
        Self::new(FullErrPattern { message })
    }
}

impl OutcomeAccess<NilPattern> {
    /// A nil frame, delivered as the unit `Nil` variant.
    #[inline]
    #[must_use]
    pub fn new_nil() -> Self {
        Self::new(NilPattern)
    }
}

impl<'de, T: OutcomePattern<'de>> de::EnumAccess<'de> for OutcomeAccess<T> {
    type Error = Error;
    type Variant = Self;

    #[inline]
    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant), Self::Error>
    where
        V: de::DeserializeSeed<'de>,
    {
        seed.deserialize(de::value::BorrowedStrDeserializer::new(T::VARIANT))
            .map(|value| (value, self))
    }
}

impl<'de, T: OutcomePattern<'de>> de::VariantAccess<'de> for OutcomeAccess<T> {
    type Error = Error;

    #[inline]
    fn newtype_variant_seed<S>(self, seed: S) -> Result<S::Value, Self::Error>
    where
        S: de::DeserializeSeed<'de>,
    {
        self.access.value(seed)
    }

    #[inline]
    fn unit_variant(self) -> Result<(), Self::Error> {
        self.access.unit()
    }

    #[inline]
    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::NewtypeVariant,
            &visitor,
        ))
    }

    #[inline]
    fn struct_variant<V>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::NewtypeVariant,
            &visitor,
        ))
    }
}

trait OutcomePattern<'de> {
    /// The name of the variant being accessed: `Ok`, `Nil`, or `Err`.
    const VARIANT: &'static str;

    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>;

    fn unit(self) -> Result<(), Error>
    where
        Self: Sized,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::NewtypeVariant,
            &"a unit variant",
        ))
    }
}

pub(super) struct PlainOkPattern;

impl<'de> OutcomePattern<'de> for PlainOkPattern {
    const VARIANT: &'static str = "Ok";

    #[inline]
    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(self)
    }
}

impl<'de> de::Deserializer<'de> for PlainOkPattern {
    type Error = Error;

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        option unit_struct newtype_struct seq tuple
        tuple_struct map struct identifier ignored_any enum
    }

    #[inline]
    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_borrowed_str("OK")
    }

    #[inline]
    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_borrowed_bytes(b"OK")
    }

    #[inline]
    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_bytes(visitor)
    }

    #[inline]
    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_unit()
    }
}

pub(super) struct OkPattern<'a, 'de> {
    deserializer: PreParsedDeserializer<'a, 'de>,
}

impl<'de> OutcomePattern<'de> for OkPattern<'_, 'de> {
    const VARIANT: &'static str = "Ok";

    #[inline]
    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(self.deserializer)
    }
}

pub(super) struct MessageErrPattern<'de> {
    message: &'de [u8],
}

impl<'de> OutcomePattern<'de> for MessageErrPattern<'de> {
    const VARIANT: &'static str = "Err";

    #[inline]
    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(de::value::BorrowedBytesDeserializer::new(self.message))
    }
}

pub(super) struct CodeErrPattern<'de> {
    code: &'de [u8],
}

impl<'de> OutcomePattern<'de> for CodeErrPattern<'de> {
    const VARIANT: &'static str = "Err";

    #[inline]
    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(de::value::BorrowedBytesDeserializer::new(self.code))
    }
}

pub(super) struct FullErrPattern<'de> {
    message: &'de [u8],
}

impl<'de> OutcomePattern<'de> for FullErrPattern<'de> {
    const VARIANT: &'static str = "Err";

    #[inline]
    fn value<T>(self, seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        seed.deserialize(ErrorLineDeserializer {
            message: self.message,
        })
    }
}

pub(super) struct NilPattern;

impl<'de> OutcomePattern<'de> for NilPattern {
    const VARIANT: &'static str = "Nil";

    #[inline]
    fn value<T>(self, _seed: T) -> Result<T::Value, Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::UnitVariant,
            &"a newtype variant",
        ))
    }

    #[inline]
    fn unit(self) -> Result<(), Error> {
        Ok(())
    }
}

/// Deserializer for an error line, delivering the `(code, message)` pair as
/// a 2-element sequence. This is how `FullError` receives its fields.
struct ErrorLineDeserializer<'de> {
    message: &'de [u8],
}

impl<'de> de::Deserializer<'de> for ErrorLineDeserializer<'de> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_seq(ErrorLineAccess {
            message: self.message,
            index: 0,
        })
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

struct ErrorLineAccess<'de> {
    message: &'de [u8],
    index: u8,
}

impl<'de> de::SeqAccess<'de> for ErrorLineAccess<'de> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: de::DeserializeSeed<'de>,
    {
        let payload = match self.index {
            0 => error_code(self.message),
            1 => self.message,
            _ => return Ok(None),
        };

        self.index += 1;
        seed.deserialize(de::value::BorrowedBytesDeserializer::new(payload))
            .map(Some)
    }

    #[inline]
    #[must_use]
    fn size_hint(&self) -> Option<usize> {
        Some(2usize.saturating_sub(usize::from(self.index)))
    }
}

/// Enum access for the dynamic [`Reply`][crate::components::Reply] tree:
/// the variant is chosen by the frame tag, and aggregate payloads recurse
/// through the main deserializer.
pub(super) struct ReplyAccess<'a, 'de> {
    header: TaggedHeader<'de>,
    input: &'a mut &'de [u8],
}

impl<'a, 'de> ReplyAccess<'a, 'de> {
    #[inline]
    #[must_use]
    pub fn new(header: TaggedHeader<'de>, input: &'a mut &'de [u8]) -> Self {
        Self { header, input }
    }
}

const fn variant_name(header: &TaggedHeader<'_>) -> &'static str {
    match header {
        TaggedHeader::SimpleString(..) => "Simple",
        TaggedHeader::Error(..) => "Error",
        TaggedHeader::Integer(..) => "Int",
        TaggedHeader::BulkString(..) => "Blob",
        TaggedHeader::Array(..) => "Array",
        TaggedHeader::Double(..) => "Double",
        TaggedHeader::Boolean(..) => "Boolean",
        TaggedHeader::BigNumber(..) => "BigNumber",
        TaggedHeader::Set(..) => "Set",
        TaggedHeader::Map(..) => "Map",
        TaggedHeader::Null => "Nil",
    }
}

impl<'de> de::EnumAccess<'de> for ReplyAccess<'_, 'de> {
    type Error = Error;
    type Variant = Self;

    #[inline]
    fn variant_seed<V>(self, seed: V) -> Result<(V::Value, Self::Variant), Self::Error>
    where
        V: de::DeserializeSeed<'de>,
    {
        seed.deserialize(de::value::BorrowedStrDeserializer::new(variant_name(
            &self.header,
        )))
        .map(|value| (value, self))
    }
}

impl<'de> de::VariantAccess<'de> for ReplyAccess<'_, 'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<(), Self::Error> {
        match self.header {
            TaggedHeader::Null => Ok(()),
            _ => Err(de::Error::invalid_type(
                de::Unexpected::NewtypeVariant,
                &"a unit variant",
            )),
        }
    }

    fn newtype_variant_seed<S>(self, seed: S) -> Result<S::Value, Self::Error>
    where
        S: de::DeserializeSeed<'de>,
    {
        match self.header {
            TaggedHeader::SimpleString(payload) | TaggedHeader::BigNumber(payload) => {
                seed.deserialize(de::value::BorrowedBytesDeserializer::new(payload))
            }
            TaggedHeader::Error(message) => {
                seed.deserialize(ErrorLineDeserializer { message })
            }
            TaggedHeader::Integer(value) => {
                seed.deserialize(de::value::I64Deserializer::new(value))
            }
            TaggedHeader::Double(value) => {
                seed.deserialize(de::value::F64Deserializer::new(value))
            }
            TaggedHeader::Boolean(value) => {
                seed.deserialize(de::value::BoolDeserializer::new(value))
            }
            TaggedHeader::BulkString(..)
            | TaggedHeader::Array(..)
            | TaggedHeader::Set(..)
            | TaggedHeader::Map(..) => {
                seed.deserialize(PreParsedDeserializer::new(self.header, self.input))
            }
            TaggedHeader::Null => Err(de::Error::invalid_type(
                de::Unexpected::UnitVariant,
                &"a newtype variant",
            )),
        }
    }

    #[inline]
    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::NewtypeVariant,
            &visitor,
        ))
    }

    #[inline]
    fn struct_variant<V>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        Err(de::Error::invalid_type(
            de::Unexpected::NewtypeVariant,
            &visitor,
        ))
    }
}
