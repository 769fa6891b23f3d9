//! Canonical bencode encoding and decoding for serde types.
//!
//! Records map to dictionaries through their serde field names: each named struct member is
//! stored under its field name, or under the key given with `#[serde(rename = "...")]`. Encoding
//! always sorts dictionary keys, so equal values produce equal bytes. Decoding first parses the
//! whole input, so malformed input is reported with the exact byte offset of the problem and never
//! leaves a half-filled value behind.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Simple {
//!     x: i64,
//!     yy: i64,
//!     #[serde(rename = "zzz")]
//!     z: String,
//! }
//!
//! let value = Simple { x: 651, yy: 123, z: "hello".to_owned() };
//! let encoded = bencoding::to_bytes(&value).unwrap();
//! assert_eq!(encoded, b"d1:xi651e2:yyi123e3:zzz5:helloe");
//!
//! let decoded: Simple = bencoding::from_bytes(&encoded).unwrap();
//! assert_eq!(decoded, value);
//!
//! let err = bencoding::from_bytes::<Simple>(b"d1:xi651").unwrap_err();
//! assert_eq!(err.offset(), Some(8));
//! ```
//!
//! Strings must be ASCII. Arbitrary binary data goes through `serde_bytes`.

mod de;
mod error;
mod node;
mod parse;
mod ser;

pub use crate::de::{from_bytes, from_bytes_into, Decoder, NodeDeserializer, UnknownKeys};
pub use crate::error::{Error, Result, Shape};
pub use crate::node::{Entry, Kind, Node, Value};
pub use crate::parse::{parse, DEFAULT_MAX_DEPTH};
pub use crate::ser::to_bytes;
