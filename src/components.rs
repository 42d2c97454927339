/*!
Reply container types.

The [deserializer][crate::de] is deliberately unclever: a frame decodes
into the obvious Rust shape, or it doesn't decode at all. The components in
this module are the opt-in vocabulary for everything beyond that:

- [`FixBuf`]: an inline fixed-capacity string buffer, for decoding without
  touching the heap.
- [`OrErr`] and [`OrFullErr`]: three-way outcomes that capture server
  error replies and nil replies as values instead of failures.
- [`KeyValue`] and [`KeyValuePairs`]: key-value pairs, and the adapter
  that decodes pair sequences from both RESP3 map frames and the
  flattened even-length arrays RESP2 uses for things like `HGETALL`.
- [`Reply`]: the fully dynamic reply tree, one variant per frame tag, for
  when the shape of the reply isn't known in advance.

Each component is an ordinary `Deserialize` type; use them standalone, as
struct fields, or nested in each other
(`OrErr<Option<Vec<KeyValue<String, i64>>>>` is a perfectly good target).
*/

mod fix_buf;
mod key_value;
mod outcome;
mod reply;

pub use self::fix_buf::FixBuf;
pub use self::key_value::{KeyValue, KeyValuePairs};
pub use self::outcome::{ErrorCode, FullError, OrErr, OrFullErr};
pub use self::reply::Reply;

// The deserializer recognizes the components through these type names, the
// same way it recognizes `Result`; see `de::Deserializer::deserialize_enum`
// and friends.
pub(crate) const FIX_BUF_TOKEN: &str = "FixBuf";
pub(crate) const KEY_VALUE_PAIRS_TOKEN: &str = "KeyValuePairs";
pub(crate) const OR_ERR_TOKEN: &str = "OrErr";
pub(crate) const OR_FULL_ERR_TOKEN: &str = "OrFullErr";
pub(crate) const REPLY_TOKEN: &str = "Reply";
