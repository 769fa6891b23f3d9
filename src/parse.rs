//! Recursive-descent bencode parser.
//!
//! This is the first decoding phase: the whole input is validated against the grammar and turned
//! into an immutable [`Node`] tree before anything is written into the caller's target.

use crate::{
    error::{Error, Result},
    node::{self, Entry, Node, Value, DICTIONARY, INTEGER, LIST, TERMINATOR},
};
use std::collections::BTreeSet;

/// Default limit on how deeply lists and dictionaries may nest.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parses `data` into a tree. The input must hold exactly one node.
///
/// ```
/// let node = bencoding::parse(b"d3:cow3:moo4:spami42ee").unwrap();
/// assert_eq!(node.get(b"cow").and_then(|n| n.as_str()), Some("moo"));
/// assert_eq!(node.get(b"spam").and_then(|n| n.as_integer()), Some(42));
/// ```
pub fn parse(data: &[u8]) -> Result<Node<'_>> {
    Parser::new(data, DEFAULT_MAX_DEPTH).parse_document()
}

pub(crate) struct Parser<'a> {
    data: &'a [u8],
    offset: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(data: &'a [u8], max_depth: usize) -> Self {
        Self {
            data,
            offset: 0,
            max_depth,
        }
    }

    pub(crate) fn parse_document(mut self) -> Result<Node<'a>> {
        let node = self.parse_node(0)?;

        if self.offset < self.data.len() {
            return Err(Error::TrailingData {
                offset: self.offset,
            });
        }

        log::trace!("parsed {} node spanning {} bytes", node.kind(), self.offset);

        Ok(node)
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    // End of the run of ASCII digits starting at `start`.
    fn digits_end(&self, start: usize) -> usize {
        self.data[start..]
            .iter()
            .position(|byte| !byte.is_ascii_digit())
            .map_or(self.data.len(), |len| start + len)
    }

    // `depth` is the number of containers enclosing the node.
    fn parse_node(&mut self, depth: usize) -> Result<Node<'a>> {
        match self.peek() {
            None => Err(Error::NoData {
                offset: self.offset,
            }),
            Some(byte) if byte.is_ascii_digit() => {
                let offset = self.offset;
                let bytes = self.parse_byte_string()?;

                Ok(Node {
                    offset,
                    value: Value::ByteString(bytes),
                })
            }
            Some(INTEGER) => self.parse_integer(),
            Some(LIST) => self.parse_list(depth),
            Some(DICTIONARY) => self.parse_dictionary(depth),
            Some(byte) => Err(Error::UnexpectedByte {
                offset: self.offset,
                byte,
            }),
        }
    }

    fn parse_byte_string(&mut self) -> Result<&'a [u8]> {
        let start = self.offset;
        let digits_end = self.digits_end(start);

        if self.data.get(digits_end) != Some(&node::LENGTH_SEPARATOR) {
            return Err(Error::MalformedStringLength { offset: start });
        }

        // A run of zeroes is a valid length of zero, so no leading zero check here.
        let length = self.data[start..digits_end]
            .iter()
            .try_fold(0usize, |acc, digit| {
                acc.checked_mul(10)?.checked_add(usize::from(digit - b'0'))
            })
            .ok_or(Error::MalformedStringLength { offset: start })?;

        let body = digits_end + 1;

        if length > self.data.len() - body {
            return Err(Error::StringLengthOverrun {
                offset: start,
                length,
            });
        }

        self.offset = body + length;

        Ok(&self.data[body..self.offset])
    }

    fn parse_integer(&mut self) -> Result<Node<'a>> {
        let offset = self.offset;
        let body = offset + 1;
        let negative = self.data.get(body) == Some(&node::MINUS);
        let digits_start = if negative { body + 1 } else { body };
        let digits_end = self.digits_end(digits_start);
        let digits = &self.data[digits_start..digits_end];

        if digits.is_empty()
            || (digits.len() > 1 && digits[0] == b'0')
            || (negative && digits == b"0")
        {
            return Err(Error::MalformedInteger { offset: body });
        }

        if self.data.get(digits_end) != Some(&TERMINATOR) {
            return Err(Error::MissingIntegerTerminator { offset: digits_end });
        }

        // Accumulate towards negative infinity so that `i64::MIN` is representable.
        let value = digits
            .iter()
            .try_fold(0i64, |acc, digit| {
                acc.checked_mul(10)?.checked_sub(i64::from(digit - b'0'))
            })
            .and_then(|value| if negative { Some(value) } else { value.checked_neg() })
            .ok_or(Error::MalformedInteger { offset: body })?;

        self.offset = digits_end + 1;

        Ok(Node {
            offset,
            value: Value::Integer(value),
        })
    }

    fn enter(&mut self, depth: usize) -> Result<usize> {
        let offset = self.offset;

        if depth >= self.max_depth {
            return Err(Error::NestingTooDeep {
                offset,
                limit: self.max_depth,
            });
        }

        self.offset += 1;

        Ok(offset)
    }

    fn parse_list(&mut self, depth: usize) -> Result<Node<'a>> {
        let offset = self.enter(depth)?;
        let mut items = Vec::new();

        loop {
            match self.peek() {
                Some(TERMINATOR) => break,
                Some(byte) if node::starts_node(byte) => items.push(self.parse_node(depth + 1)?),
                _ => {
                    return Err(Error::UnterminatedList {
                        offset: self.offset,
                    })
                }
            }
        }

        self.offset += 1;

        Ok(Node {
            offset,
            value: Value::List(items),
        })
    }

    fn parse_dictionary(&mut self, depth: usize) -> Result<Node<'a>> {
        let offset = self.enter(depth)?;
        let mut entries = Vec::new();
        let mut seen = BTreeSet::new();

        loop {
            let key_offset = self.offset;

            match self.peek() {
                Some(TERMINATOR) => break,
                Some(byte) if byte.is_ascii_digit() => (),
                Some(INTEGER | LIST | DICTIONARY) => {
                    return Err(Error::DictionaryKeyNotString { offset: key_offset })
                }
                _ => return Err(Error::UnterminatedDictionary { offset: key_offset }),
            }

            let key = self.parse_byte_string()?;

            if !seen.insert(key) {
                return Err(Error::DuplicateKey {
                    offset: key_offset,
                    key: String::from_utf8_lossy(key).into_owned(),
                });
            }

            let value = self.parse_node(depth + 1)?;

            entries.push(Entry {
                key,
                key_offset,
                value,
            });
        }

        self.offset += 1;

        Ok(Node {
            offset,
            value: Value::Dictionary(entries),
        })
    }
}
