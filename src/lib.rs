/*!
`typedis` is a strongly typed client for
[RESP](https://redis.io/docs/reference/protocol-spec/), the Redis
Serialization Protocol, versions 2 and 3. It is built on the [serde] data
model: the type you want is the description of the reply you expect, and
the [deserializer][crate::de] decodes one wire frame directly into it,
with no intermediate reply tree unless you ask for one.

```no_run
use typedis::client::Client;

let conn = std::net::TcpStream::connect("127.0.0.1:6379")?;
let mut client = Client::new(conn);

let (): () = client.send(&("SET", "fruit", "banana"))?;
let fruit: String = client.send(&("GET", "fruit"))?;
assert_eq!(fruit, "banana");
# Ok::<(), Box<dyn std::error::Error>>(())
```

# Predictable

`typedis` is a mostly faithful serde rendering of RESP. A frame decodes
into the obvious Rust shape (integers into integers, also out of the
string frames Redis loves; strings into `&str`/`String`/bytes; arrays and
sets into sequences; maps into structs or `HashMap`s), or the decode fails
with a precise, typed [error][crate::de::Error]. The deserializer never
guesses: behavior beyond the obvious is opted into through the
[components][crate::components]:

- [`FixBuf`][crate::components::FixBuf] decodes strings into an inline
  fixed-capacity buffer, for replies that should never touch the heap.
- [`OrErr`][crate::components::OrErr] and
  [`OrFullErr`][crate::components::OrFullErr] turn server error replies
  and nil replies into values instead of failures.
- [`KeyValue`][crate::components::KeyValue] and
  [`KeyValuePairs`][crate::components::KeyValuePairs] decode pair
  sequences from RESP3 maps and RESP2's flattened key-value arrays alike.
- [`Reply`][crate::components::Reply] is the fully dynamic tree, one
  variant per frame tag, for replies whose shape is only known at runtime.

# Borrowed or owned

Both decoding modes share one code path and differ only in the target
type. Borrowed targets (`&str`, `&[u8]`, `FixBuf` and friends) decode
without allocating, straight out of the reply buffer, and the borrow
checker pins their lifetime to the session. Owned targets (`String`,
`Vec`, `Box`, [`Reply`][crate::components::Reply]) copy onto the heap;
every allocation the decode makes is owned by the returned value, and
dropping that value releases all of it.

# The session

The [client][crate::client] owns a blocking connection and keeps the
command stream and reply stream aligned: single commands
([`send`][crate::client::Client::send]), pipelines decoded one reply per
command into a record ([`pipe`][crate::client::Client::pipe]), and
`MULTI`/`EXEC` transactions
([`transaction`][crate::client::Client::transaction]). Replies are scanned
to a frame boundary before they're decoded, so a failed decode never
desyncs the connection; only transport and framing failures poison a
session.

Commands are encoded by the [serializer][crate::ser] as RESP2-style arrays
of bulk strings, which both protocol versions accept. Replies are accepted
in either protocol; to actually receive RESP3 frames, opt in yourself by
sending `HELLO 3` (it's just a command). The library never sends anything
on its own.
*/

#![deny(missing_docs)]

pub mod client;
pub mod components;
pub mod de;
pub mod ser;
