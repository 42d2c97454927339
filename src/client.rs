/*!
A blocking client session over any byte-stream connection.

A [`Client`] owns an established connection (a TCP stream, a Unix socket,
anything `Read + Write`) and layers the typed codec on top of it: commands
go out through the [command serializer][crate::ser], replies come back
through the [typed deserializer][crate::de], and the session keeps the two
aligned frame-by-frame.

# Borrowed and owned decoding

Every operation comes in two flavors. The plain methods ([`Client::send`],
[`Client::pipe`], [`Client::transaction`]) admit *borrowed* targets:
`&str`, `&[u8]`, and [`FixBuf`][crate::components::FixBuf] fields decode
zero-copy straight out of the session's reply buffer, at the price of the
value borrowing the session: the borrow checker will insist the value is
dropped (or copied out) before the next command. The `_owned` variants
require `DeserializeOwned`: everything is copied onto the heap, the value
is independent of the session, and dropping it releases every allocation
the decode made.

# Pipelining and transactions

[`Client::pipe`] writes any number of encoded commands in one flush and
decodes exactly one reply per command, in order, into a tuple (or a
derived struct, filled in field declaration order). [`Client::transaction`]
wraps the same batch in `MULTI`/`EXEC`; since `EXEC` itself can fail or
abort to nil, its target should be wrapped in
[`OrErr`][crate::components::OrErr] or
[`OrFullErr`][crate::components::OrFullErr].

# Failure handling

Transport failures (I/O errors, an unexpected EOF, malformed framing)
poison the session: the `broken` fuse trips, and every later operation
fails fast with [`Error::Broken`], because the frame boundary on the wire
can no longer be trusted. Typed decode failures are different: the session
only decodes frames it has already buffered in full, so a
[`Server`][crate::de::Error::Server] error, an
[`UnexpectedNil`][crate::de::Error::UnexpectedNil], a
[`BufferTooSmall`][crate::de::Error::BufferTooSmall] and friends leave the
session aligned and perfectly usable.

# Example

```no_run
use typedis::client::Client;
use typedis::components::OrErr;

let conn = std::net::TcpStream::connect("127.0.0.1:6379")?;
let mut client = Client::new(conn);

let (): () = client.send(&("SET", "answer", 42))?;
let answer: i64 = client.send(&("GET", "answer"))?;
assert_eq!(answer, 42);

// A transaction: one round trip, atomic on the server.
let outcome: OrErr<(OrErr<()>, OrErr<i64>)> = client
    .transaction(&[&["SET", "counter", "10"][..], &["INCR", "counter"][..]])?;

let (_set, incremented) = outcome
    .into_result()
    .expect("EXEC failed")
    .expect("EXEC aborted");

assert_eq!(incremented, OrErr::Ok(11));
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::io::{self, Read, Write};

use serde::{de as serde_de, ser as serde_ser};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{de, ser};

/// How much to grow the reply buffer per read when the parser hasn't said
/// how much it needs.
const READ_CHUNK: usize = 4 * 1024;

/// Errors that can occur on a client session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection failed at the I/O level. The session is broken.
    #[error("i/o failure on the connection")]
    Io(#[from] io::Error),

    /// The server closed the connection mid-conversation. The session is
    /// broken.
    #[error("the server closed the connection")]
    ConnectionClosed,

    /// An earlier transport or framing failure broke the session; the
    /// connection should be closed and re-established.
    #[error("the session is broken from an earlier failure")]
    Broken,

    /// The command couldn't be encoded. Nothing was sent; the session is
    /// still usable.
    #[error("failed to encode the command")]
    Encode(#[from] ser::Error),

    /// The reply couldn't be decoded into the target type (this includes
    /// server error replies, as [`de::Error::Server`]). The offending
    /// reply was consumed in full, so the session is still usable.
    #[error("failed to decode the reply")]
    Reply(#[from] de::Error),

    /// A transaction acknowledgement deviated from `+OK` / `+QUEUED`.
    #[error("the server sent an unexpected transaction acknowledgement")]
    BadAck,

    /// The pipeline target finished decoding before consuming one reply
    /// per command.
    #[error("expected {expected} pipeline replies, but the target decoded {decoded}")]
    ReplyCount {
        /// One per command sent.
        expected: usize,
        /// How many the target type actually consumed.
        decoded: usize,
    },
}

/// A blocking client session. See the [module docs][self].
#[derive(Debug)]
pub struct Client<C> {
    conn: C,
    request: Vec<u8>,
    reply: Vec<u8>,
    /// End of the frames already decoded out of `reply`.
    consumed: usize,
    /// End of the frames verified complete in `reply`.
    scanned: usize,
    broken: bool,
}

impl<C> Client<C> {
    /// Create a session over an established connection.
    ///
    /// The connection is used exclusively by this session until
    /// [`close`][Self::close] or [`into_inner`][Self::into_inner]; one
    /// session processes one command or pipeline at a time, and parallel
    /// callers should each own a session of their own.
    #[must_use]
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            request: Vec::new(),
            reply: Vec::new(),
            consumed: 0,
            scanned: 0,
            broken: false,
        }
    }

    /// True if a transport or framing failure has poisoned this session.
    #[inline]
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Release the underlying connection without closing it.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C: Read + Write> Client<C> {
    /// Send one command and decode its reply into `T`, borrowing from the
    /// session's reply buffer where `T` asks for borrowed data.
    pub fn send<'de, T, Cmd>(&'de mut self, command: &Cmd) -> Result<T, Error>
    where
        T: serde_de::Deserialize<'de>,
        Cmd: serde_ser::Serialize + ?Sized,
    {
        self.begin()?;
        ser::write_command(&mut self.request, command)?;
        self.flush_request()?;
        self.buffer_replies(1)?;
        self.decode_next()
    }

    /// Send one command and decode its reply into an owned `T`,
    /// independent of the session. Dropping the value releases everything
    /// the decode allocated.
    pub fn send_owned<T, Cmd>(&mut self, command: &Cmd) -> Result<T, Error>
    where
        T: serde_de::DeserializeOwned,
        Cmd: serde_ser::Serialize + ?Sized,
    {
        self.send(command)
    }

    /// Send a batch of commands in a single write, then decode exactly one
    /// reply per command, in order, into `T`: a tuple or derived struct
    /// whose fields are filled in wire order.
    ///
    /// All commands in the batch share a Rust type; use `&[&str]` slices
    /// when the argument lists differ in shape.
    pub fn pipe<'de, T, Cmd>(&'de mut self, commands: &[Cmd]) -> Result<T, Error>
    where
        T: serde_de::Deserialize<'de>,
        Cmd: serde_ser::Serialize,
    {
        self.begin()?;

        for command in commands {
            ser::write_command(&mut self.request, command)?;
        }

        debug!(commands = commands.len(), "sending pipeline");
        self.flush_request()?;
        self.buffer_replies(commands.len())?;
        self.decode_pipeline(commands.len())
    }

    /// [`pipe`][Self::pipe], decoding into an owned `T`.
    pub fn pipe_owned<T, Cmd>(&mut self, commands: &[Cmd]) -> Result<T, Error>
    where
        T: serde_de::DeserializeOwned,
        Cmd: serde_ser::Serialize,
    {
        self.pipe(commands)
    }

    /// Send a batch of commands wrapped in `MULTI`/`EXEC` and decode the
    /// final aggregate reply into `T`.
    ///
    /// The session consumes the `+OK` acknowledgement of `MULTI` and one
    /// `+QUEUED` per command before decoding the `EXEC` reply. `EXEC`
    /// replies with an array of one sub-reply per command, decoded like a
    /// pipeline record (positionally), but it can also fail outright or
    /// abort to nil, so wrap the record in
    /// [`OrErr`][crate::components::OrErr] /
    /// [`OrFullErr`][crate::components::OrFullErr].
    pub fn transaction<'de, T, Cmd>(&'de mut self, commands: &[Cmd]) -> Result<T, Error>
    where
        T: serde_de::Deserialize<'de>,
        Cmd: serde_ser::Serialize,
    {
        self.begin()?;

        ser::write_command(&mut self.request, &("MULTI",))?;
        for command in commands {
            ser::write_command(&mut self.request, command)?;
        }
        ser::write_command(&mut self.request, &("EXEC",))?;

        debug!(commands = commands.len(), "sending transaction");
        self.flush_request()?;
        self.buffer_replies(commands.len() + 2)?;

        self.expect_ack(b"OK")?;
        for _ in 0..commands.len() {
            self.expect_ack(b"QUEUED")?;
        }

        self.decode_next()
    }

    /// [`transaction`][Self::transaction], decoding into an owned `T`.
    pub fn transaction_owned<T, Cmd>(&mut self, commands: &[Cmd]) -> Result<T, Error>
    where
        T: serde_de::DeserializeOwned,
        Cmd: serde_ser::Serialize,
    {
        self.transaction(commands)
    }

    /// Flush anything pending and drop the connection, closing it.
    pub fn close(mut self) -> io::Result<()> {
        self.conn.flush()
    }

    /// Start a fresh operation: fail fast on a broken session and recycle
    /// the buffers.
    ///
    /// A single read can deliver the end of one reply coalesced with the
    /// start of the next, so reply bytes past the scan cursor must be
    /// carried into the next operation, not dropped. Bytes up to the scan
    /// cursor belonged to earlier operations' replies (decoded, or
    /// abandoned when an operation failed mid-decode) and are released.
    fn begin(&mut self) -> Result<(), Error> {
        if self.broken {
            return Err(Error::Broken);
        }

        self.request.clear();
        self.reply.drain(..self.scanned);
        self.scanned = 0;
        self.consumed = 0;

        Ok(())
    }

    fn flush_request(&mut self) -> Result<(), Error> {
        trace!(bytes = self.request.len(), "writing request");

        let outcome = self
            .conn
            .write_all(&self.request)
            .and_then(|()| self.conn.flush());

        outcome.map_err(|error| {
            self.broken = true;
            Error::Io(error)
        })
    }

    /// Read from the connection until `count` complete top-level frames
    /// are buffered past the scan cursor.
    ///
    /// The scan uses the skip-frame routine, which reports a lower bound
    /// on the missing bytes whenever a frame is still incomplete; that
    /// bound drives the read loop.
    fn buffer_replies(&mut self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            loop {
                let mut probe = &self.reply[self.scanned..];
                let available = probe.len();

                match de::skip_value(&mut probe) {
                    Ok(()) => {
                        self.scanned += available - probe.len();
                        break;
                    }
                    Err(de::Error::Parse(de::parse::Error::UnexpectedEof(needed))) => {
                        self.fill(needed)?;
                    }
                    Err(error) => {
                        // Framing is broken; the reply boundary is lost.
                        self.broken = true;
                        return Err(Error::Reply(error));
                    }
                }
            }
        }

        trace!(bytes = self.scanned, replies = count, "buffered replies");

        Ok(())
    }

    /// Read at least `needed` additional bytes into the reply buffer.
    ///
    /// `needed` comes from the parser and is a lower bound on what's
    /// missing, so blocking until it arrives can't overshoot the frames
    /// we're owed.
    fn fill(&mut self, needed: usize) -> Result<(), Error> {
        let mut remaining = needed;

        while remaining > 0 {
            let start = self.reply.len();
            self.reply.resize(start + READ_CHUNK.max(remaining), 0);

            match self.conn.read(&mut self.reply[start..]) {
                Ok(0) => {
                    self.reply.truncate(start);
                    self.broken = true;
                    return Err(Error::ConnectionClosed);
                }
                Ok(count) => {
                    self.reply.truncate(start + count);
                    remaining = remaining.saturating_sub(count);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    self.reply.truncate(start);
                }
                Err(error) => {
                    self.reply.truncate(start);
                    self.broken = true;
                    return Err(Error::Io(error));
                }
            }
        }

        Ok(())
    }

    /// Decode the next buffered frame into `T`, advancing the decode
    /// cursor past it.
    fn decode_next<'de, T>(&'de mut self) -> Result<T, Error>
    where
        T: serde_de::Deserialize<'de>,
    {
        let mut frame = &self.reply[self.consumed..self.scanned];
        let value = T::deserialize(de::Deserializer::new(&mut frame));

        self.consumed = self.scanned - frame.len();
        value.map_err(Error::Reply)
    }

    /// Decode a transaction acknowledgement, which must be exactly
    /// `expected`. A server error at queue time surfaces as that error;
    /// any other deviation is [`Error::BadAck`].
    fn expect_ack(&mut self, expected: &[u8]) -> Result<(), Error> {
        let ack: &[u8] = self.decode_next()?;

        if ack == expected {
            Ok(())
        } else {
            Err(Error::BadAck)
        }
    }

    /// Decode `expected` buffered frames into `T` through the positional
    /// replies deserializer.
    fn decode_pipeline<'de, T>(&'de mut self, expected: usize) -> Result<T, Error>
    where
        T: serde_de::Deserialize<'de>,
    {
        let mut frames = &self.reply[self.consumed..self.scanned];

        let (value, leftover) = {
            let mut replies = Replies {
                input: &mut frames,
                remaining: expected,
            };

            let value = T::deserialize(RepliesDeserializer {
                replies: &mut replies,
            });

            (value, replies.remaining)
        };

        self.consumed = self.scanned - frames.len();
        let value = value.map_err(Error::Reply)?;

        match leftover {
            0 => Ok(value),
            _ => Err(Error::ReplyCount {
                expected,
                decoded: expected - leftover,
            }),
        }
    }
}

/// Sequence access over several top-level frames: the reply stream of a
/// pipeline. Unlike an array frame, there's no announced length on the
/// wire; the expected count comes from the number of commands written.
struct Replies<'a, 'de> {
    input: &'a mut &'de [u8],
    remaining: usize,
}

impl<'de> serde_de::SeqAccess<'de> for Replies<'_, 'de> {
    type Error = de::Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: serde_de::DeserializeSeed<'de>,
    {
        self.remaining = match self.remaining.checked_sub(1) {
            Some(remaining) => remaining,
            None => return Ok(None),
        };

        seed.deserialize(de::Deserializer::new(self.input)).map(Some)
    }

    #[inline]
    #[must_use]
    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

/// Deserializer for a pipeline's replies: the target must be
/// sequence-shaped (a tuple, array, or struct decoded positionally), with
/// one element per reply.
struct RepliesDeserializer<'r, 'a, 'de> {
    replies: &'r mut Replies<'a, 'de>,
}

impl<'de> serde_de::Deserializer<'de> for RepliesDeserializer<'_, '_, 'de> {
    type Error = de::Error;

    fn deserialize_any<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        Err(serde_de::Error::custom(
            "a pipeline decodes into a tuple or struct with one field per command",
        ))
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        visitor.visit_seq(&mut *self.replies)
    }

    #[inline]
    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    #[inline]
    fn deserialize_tuple_struct<V>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    #[inline]
    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    #[inline]
    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: serde_de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct map enum identifier
        ignored_any
    }
}

#[cfg(test)]
mod tests {
    use cool_asserts::assert_matches;
    use serde::Deserialize;

    use crate::components::{FixBuf, OrErr, OrFullErr, Reply};

    use super::*;

    /// A scripted connection: replies come from a fixed transcript,
    /// writes are captured, and reads can be throttled to exercise the
    /// incremental read loop.
    struct Mock {
        replies: Vec<u8>,
        position: usize,
        written: Vec<u8>,
        max_read: usize,
    }

    impl Mock {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: replies.to_vec(),
                position: 0,
                written: Vec::new(),
                max_read: usize::MAX,
            }
        }

        fn trickle(replies: &[u8], max_read: usize) -> Self {
            Self {
                max_read,
                ..Self::new(replies)
            }
        }
    }

    impl Read for Mock {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let available = &self.replies[self.position..];
            let count = buf.len().min(available.len()).min(self.max_read);

            buf[..count].copy_from_slice(&available[..count]);
            self.position += count;

            Ok(count)
        }
    }

    impl Write for Mock {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_send_void() {
        let mut client = Client::new(Mock::new(b"+OK\r\n"));

        let (): () = client
            .send(&("SET", "key", "42"))
            .expect("failed to send");

        assert_eq!(
            client.into_inner().written,
            b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n",
        );
    }

    #[test]
    fn test_send_integer_from_bulk_reply() {
        let mut client = Client::new(Mock::new(b"$2\r\n42\r\n"));

        let value: i64 = client.send(&("GET", "key")).expect("failed to send");
        assert_eq!(value, 42);

        assert_eq!(client.into_inner().written, b"*2\r\n$3\r\nGET\r\n$3\r\nkey\r\n");
    }

    #[test]
    fn test_send_missing_key_is_none() {
        let mut client = Client::new(Mock::new(b"$-1\r\n"));

        let value: Option<i64> = client.send(&("GET", "nokey")).expect("failed to send");
        assert_eq!(value, None);
    }

    #[test]
    fn test_send_server_error_as_outcome() {
        let mut client = Client::new(Mock::new(
            b"-ERR value is not an integer or out of range\r\n+PONG\r\n",
        ));

        let outcome: OrErr<i64> = client.send(&("INCR", "stringkey")).expect("failed to send");
        assert_matches!(outcome, OrErr::Err(code) => assert_eq!(code, "ERR"));

        // The error was data, not a failure; the session keeps working.
        let pong: FixBuf<4> = client.send(&("PING",)).expect("failed to send");
        assert_eq!(pong, "PONG");
    }

    #[test]
    fn test_send_server_error_as_failure() {
        let mut client = Client::new(Mock::new(b"-ERR nope\r\n+PONG\r\n"));

        assert_matches!(
            client.send::<i64, _>(&("INCR", "stringkey")),
            Err(Error::Reply(de::Error::Server(message))) => {
                assert_eq!(message, b"ERR nope");
            },
        );

        // The offending frame was consumed in full; the session survives.
        assert!(!client.is_broken());
        let pong: String = client.send(&("PING",)).expect("failed to send");
        assert_eq!(pong, "PONG");
    }

    #[test]
    fn test_send_record_from_hgetall() {
        #[derive(Deserialize, PartialEq, Debug)]
        struct Inventory {
            banana: FixBuf<11>,
            price: f32,
        }

        let mut client = Client::new(Mock::new(
            b"*4\r\n$6\r\nbanana\r\n$10\r\nyes please\r\n$5\r\nprice\r\n$4\r\n9.99\r\n",
        ));

        let inventory: Inventory = client.send(&("HGETALL", "myhash")).expect("failed to send");

        assert_eq!(inventory.banana, *b"yes please");
        assert_eq!(inventory.price, 9.99);
    }

    #[test]
    fn test_send_borrowed_reply() {
        let mut client = Client::new(Mock::new(b"$5\r\nhello\r\n"));

        let value: &str = client.send(&("GET", "key")).expect("failed to send");
        assert_eq!(value, "hello");
    }

    #[test]
    fn test_send_owned_outlives_the_next_command() {
        let mut client = Client::new(Mock::new(b"$5\r\nhello\r\n$5\r\nworld\r\n"));

        let first: String = client.send_owned(&("GET", "a")).expect("failed to send");
        let second: String = client.send_owned(&("GET", "b")).expect("failed to send");

        assert_eq!(first, "hello");
        assert_eq!(second, "world");
    }

    #[test]
    fn test_send_dynamic_reply() {
        let mut client = Client::new(Mock::new(b"*2\r\n:1\r\n%1\r\n+a\r\n#t\r\n"));

        let reply: Reply = client.send_owned(&("COMMAND",)).expect("failed to send");
        assert_matches!(reply, Reply::Array(items) => assert_eq!(items.len(), 2));
    }

    #[test]
    fn test_trickled_reply_is_reassembled() {
        // Three bytes per read forces the scan to report missing bytes
        // repeatedly before the frame completes.
        let mut client = Client::new(Mock::trickle(
            b"*2\r\n$5\r\nhello\r\n$11\r\nlong values\r\n",
            3,
        ));

        let value: (String, String) = client.send(&("MGET", "a", "b")).expect("failed to send");
        assert_eq!(value, ("hello".to_owned(), "long values".to_owned()));
    }

    #[test]
    fn test_pipe() {
        let mut client = Client::new(Mock::new(b"+OK\r\n:11\r\n$5\r\nfruit\r\n"));

        let (set, count, name): ((), i64, String) = client
            .pipe(&[
                &["SET", "counter", "10"][..],
                &["INCR", "counter"][..],
                &["GET", "name"][..],
            ])
            .expect("failed to pipe");

        let () = set;
        assert_eq!(count, 11);
        assert_eq!(name, "fruit");

        assert_eq!(
            client.into_inner().written,
            b"*3\r\n$3\r\nSET\r\n$7\r\ncounter\r\n$2\r\n10\r\n\
              *2\r\n$4\r\nINCR\r\n$7\r\ncounter\r\n\
              *2\r\n$3\r\nGET\r\n$4\r\nname\r\n",
        );
    }

    #[test]
    fn test_pipe_into_struct() {
        #[derive(Deserialize, Debug)]
        struct Results {
            first: i64,
            second: OrErr<i64>,
        }

        let mut client = Client::new(Mock::new(b":1\r\n-ERR oops\r\n"));

        let results: Results = client
            .pipe(&[&["INCR", "a"][..], &["INCR", "b"][..]])
            .expect("failed to pipe");

        assert_eq!(results.first, 1);
        assert_matches!(results.second, OrErr::Err(code) => assert_eq!(code, "ERR"));
    }

    #[test]
    fn test_pipe_reply_count_mismatch() {
        let mut client = Client::new(Mock::new(b":1\r\n:2\r\n"));

        assert_matches!(
            client.pipe::<(i64,), _>(&[&["INCR", "a"][..], &["INCR", "b"][..]]),
            Err(Error::ReplyCount {
                expected: 2,
                decoded: 1,
            }),
        );
    }

    #[test]
    fn test_transaction() {
        let mut client = Client::new(Mock::new(
            b"+OK\r\n\
              +QUEUED\r\n+QUEUED\r\n+QUEUED\r\n\
              *3\r\n+OK\r\n:1\r\n-ERR value is not an integer or out of range\r\n",
        ));

        let outcome: OrErr<(OrErr<FixBuf<10>>, u64, OrErr<()>)> = client
            .transaction(&[
                &["SET", "banana", "no, thanks"][..],
                &["INCR", "counter"][..],
                &["INCR", "banana"][..],
            ])
            .expect("failed to run transaction");

        assert_matches!(outcome, OrErr::Ok((first, second, third)) => {
            assert_matches!(first, OrErr::Ok(ack) => assert_eq!(ack, "OK"));
            assert_eq!(second, 1);
            assert_matches!(third, OrErr::Err(code) => assert_eq!(code, "ERR"));
        });

        let written = client.into_inner().written;
        assert!(written.starts_with(b"*1\r\n$5\r\nMULTI\r\n"));
        assert!(written.ends_with(b"*1\r\n$4\r\nEXEC\r\n"));
    }

    #[test]
    fn test_transaction_abort_is_nil() {
        // A WATCH elsewhere invalidated the transaction; EXEC replies nil.
        let mut client = Client::new(Mock::new(b"+OK\r\n+QUEUED\r\n*-1\r\n"));

        let outcome: OrErr<(OrErr<i64>,)> = client
            .transaction(&[&["INCR", "counter"][..]])
            .expect("failed to run transaction");

        assert!(outcome.is_nil());
    }

    #[test]
    fn test_transaction_queue_error_surfaces() {
        let mut client = Client::new(Mock::new(
            b"+OK\r\n\
              -ERR unknown command 'FROB'\r\n\
              *-1\r\n",
        ));

        assert_matches!(
            client.transaction::<OrFullErr<(OrErr<i64>,)>, _>(&[&["FROB", "x"][..]]),
            Err(Error::Reply(de::Error::Server(message))) => {
                assert_eq!(message, b"ERR unknown command 'FROB'");
            },
        );
    }

    #[test]
    fn test_transaction_bad_ack() {
        let mut client = Client::new(Mock::new(b"+WAT\r\n+QUEUED\r\n*-1\r\n+PONG\r\n"));

        assert_matches!(
            client.transaction::<OrErr<(OrErr<i64>,)>, _>(&[&["INCR", "counter"][..]]),
            Err(Error::BadAck),
        );

        // The failed transaction's remaining replies are released, while
        // reply bytes read past them stay buffered for the next command.
        let pong: String = client.send(&("PING",)).expect("failed to send");
        assert_eq!(pong, "PONG");
    }

    #[test]
    fn test_closed_connection_breaks_the_session() {
        let mut client = Client::new(Mock::new(b"+PA"));

        assert_matches!(
            client.send::<String, _>(&("PING",)),
            Err(Error::ConnectionClosed),
        );

        assert!(client.is_broken());
        assert_matches!(client.send::<String, _>(&("PING",)), Err(Error::Broken));
    }

    #[test]
    fn test_malformed_framing_breaks_the_session() {
        let mut client = Client::new(Mock::new(b"@bogus\r\n"));

        assert_matches!(
            client.send::<String, _>(&("PING",)),
            Err(Error::Reply(de::Error::Parse(..))),
        );

        assert!(client.is_broken());
    }

    #[test]
    fn test_encode_error_leaves_session_usable() {
        let mut client = Client::new(Mock::new(b"+PONG\r\n"));

        assert_matches!(
            client.send::<(), _>(&("DEL", vec!["a", "b"])),
            Err(Error::Encode(..)),
        );

        let pong: String = client.send(&("PING",)).expect("failed to send");
        assert_eq!(pong, "PONG");
    }
}
