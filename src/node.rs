//! Bencode grammar: node kinds, their marker bytes and the parse tree.

use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serialize, Serializer,
};
use std::fmt;

pub(crate) const INTEGER: u8 = b'i';
pub(crate) const LIST: u8 = b'l';
pub(crate) const DICTIONARY: u8 = b'd';
pub(crate) const TERMINATOR: u8 = b'e';
pub(crate) const LENGTH_SEPARATOR: u8 = b':';
pub(crate) const MINUS: u8 = b'-';

/// Whether `byte` can start a node.
pub(crate) fn starts_node(byte: u8) -> bool {
    byte.is_ascii_digit() || matches!(byte, INTEGER | LIST | DICTIONARY)
}

/// The four kinds of bencode nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Integer,
    ByteString,
    List,
    Dictionary,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::ByteString => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::Dictionary => write!(f, "dictionary"),
        }
    }
}

/// A parsed node together with the offset of its first byte in the input.
///
/// Byte strings borrow from the input the tree was parsed from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node<'a> {
    pub offset: usize,
    pub value: Value<'a>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value<'a> {
    Integer(i64),
    ByteString(&'a [u8]),
    List(Vec<Node<'a>>),
    /// Entries in input order. Keys are unique.
    Dictionary(Vec<Entry<'a>>),
}

/// A dictionary entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a [u8],
    pub key_offset: usize,
    pub value: Node<'a>,
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            Value::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            Value::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the byte string as UTF-8, if it is one.
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.as_bytes()?).ok()
    }

    pub fn as_list(&self) -> Option<&[Node<'a>]> {
        match &self.value {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&[Entry<'a>]> {
        match &self.value {
            Value::Dictionary(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up `key` if this node is a dictionary.
    pub fn get(&self, key: &[u8]) -> Option<&Node<'a>> {
        self.as_dictionary()?
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }
}

impl Value<'_> {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Integer(_) => Kind::Integer,
            Self::ByteString(_) => Kind::ByteString,
            Self::List(_) => Kind::List,
            Self::Dictionary(_) => Kind::Dictionary,
        }
    }
}

// Serializing a tree through `crate::to_bytes` yields its canonical encoding: the encoder sorts
// the dictionary keys.
impl Serialize for Node<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match &self.value {
            Value::Integer(value) => s.serialize_i64(*value),
            Value::ByteString(bytes) => serde_bytes::Bytes::new(bytes).serialize(s),
            Value::List(items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dictionary(entries) => {
                let mut map = s.serialize_map(Some(entries.len()))?;
                for entry in entries {
                    map.serialize_entry(serde_bytes::Bytes::new(entry.key), &entry.value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_starts() {
        for byte in b"0123456789ild" {
            assert!(starts_node(*byte), "{}", *byte as char);
        }
        for byte in b"e-:x \0" {
            assert!(!starts_node(*byte), "{}", *byte as char);
        }
    }

    #[test]
    fn accessors() {
        let node = Node {
            offset: 0,
            value: Value::Dictionary(vec![Entry {
                key: b"name",
                key_offset: 1,
                value: Node {
                    offset: 7,
                    value: Value::ByteString(b"spam"),
                },
            }]),
        };

        assert_eq!(node.kind(), Kind::Dictionary);
        assert_eq!(node.get(b"name").and_then(Node::as_str), Some("spam"));
        assert_eq!(node.get(b"missing"), None);
        assert_eq!(node.as_integer(), None);
        assert_eq!(node.as_list(), None);
    }
}
