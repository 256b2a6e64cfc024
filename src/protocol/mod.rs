//! RESP Wire Protocol
//!
//! CinderKV speaks the text-framed, length-prefixed request/response protocol
//! used by Redis clients. The two halves live in separate modules:
//!
//! - `parser`: incremental decoder turning raw bytes into command argument
//!   vectors (dual array/inline grammar)
//! - `types`: the [`Reply`] enum and its wire serialization
//!
//! ## Example
//!
//! ```
//! use cinderkv::protocol::{decode_command, Reply};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (args, consumed) = decode_command(data).unwrap().unwrap();
//! assert_eq!(args[0], Bytes::from("GET"));
//! assert_eq!(consumed, data.len());
//!
//! let reply = Reply::bulk(Bytes::from("value"));
//! assert_eq!(reply.serialize(), b"$5\r\nvalue\r\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{decode_command, ParseError, ParseResult, MAX_BULK_SIZE};
pub use types::Reply;
