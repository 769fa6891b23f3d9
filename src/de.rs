//! Decoding bencode into typed values.
//!
//! Decoding happens in two phases. [`crate::parse`] first validates the whole input and builds an
//! immutable tree, then the tree is materialized into a fresh value of the target type through
//! serde. The caller's value is only touched once both phases succeeded, so a failed decode
//! leaves it exactly as it was.

use crate::{
    error::{Error, Result, Shape},
    node::{Entry, Node, Value},
    parse::{Parser, DEFAULT_MAX_DEPTH},
};
use serde::de::{
    self,
    value::{BorrowedBytesDeserializer, BorrowedStrDeserializer},
    DeserializeSeed, IntoDeserializer, Visitor,
};
use std::slice;

/// Decodes `bytes` into a `T` using the default [`Decoder`] settings.
///
/// ```
/// use serde::Deserialize;
///
/// #[derive(Debug, PartialEq, Deserialize)]
/// struct Point {
///     x: i64,
/// }
///
/// // The unknown "xxx" entry is skipped.
/// let point: Point = bencoding::from_bytes(b"d3:xxxi1e1:xi2ee").unwrap();
/// assert_eq!(point, Point { x: 2 });
/// ```
pub fn from_bytes<'de, T>(bytes: &'de [u8]) -> Result<T>
where
    T: de::Deserialize<'de>,
{
    Decoder::default().decode(bytes)
}

/// Decodes `bytes` into `target` using the default [`Decoder`] settings.
///
/// On error `target` is left unmodified.
pub fn from_bytes_into<'de, T>(bytes: &'de [u8], target: &mut T) -> Result<()>
where
    T: de::Deserialize<'de>,
{
    Decoder::default().decode_into(bytes, target)
}

/// What to do with dictionary keys that don't name any member of the target record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownKeys {
    /// Skip the entry, unless the target type is `#[serde(deny_unknown_fields)]`.
    #[default]
    Ignore,
    /// Fail with [`Error::UnknownKey`].
    Reject,
}

/// Decoder settings.
#[derive(Clone, Copy, Debug)]
pub struct Decoder {
    unknown_keys: UnknownKeys,
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            unknown_keys: UnknownKeys::Ignore,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the policy for dictionary keys the target record doesn't map.
    pub fn set_unknown_keys(mut self, unknown_keys: UnknownKeys) -> Self {
        self.unknown_keys = unknown_keys;
        self
    }

    /// Set how deeply lists and dictionaries may nest.
    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decode `bytes` into a new `T`.
    pub fn decode<'de, T>(&self, bytes: &'de [u8]) -> Result<T>
    where
        T: de::Deserialize<'de>,
    {
        let tree = Parser::new(bytes, self.max_depth).parse_document()?;
        T::deserialize(NodeDeserializer::new(&tree, self))
    }

    /// Decode `bytes` into `target`, which is only assigned once decoding succeeded.
    pub fn decode_into<'de, T>(&self, bytes: &'de [u8], target: &mut T) -> Result<()>
    where
        T: de::Deserialize<'de>,
    {
        *target = self.decode(bytes)?;
        log::trace!("committed {} decoded bytes", bytes.len());
        Ok(())
    }
}

/// Deserializer over a parsed [`Node`].
pub struct NodeDeserializer<'a, 'de> {
    node: &'a Node<'de>,
    decoder: &'a Decoder,
}

impl<'a, 'de> NodeDeserializer<'a, 'de> {
    fn new(node: &'a Node<'de>, decoder: &'a Decoder) -> Self {
        Self { node, decoder }
    }

    fn mismatch(&self, expected: Shape) -> Error {
        Error::TypeMismatch {
            offset: self.node.offset,
            found: self.node.kind(),
            expected,
        }
    }

    fn integer<I: TryFrom<i64>>(&self, target: &'static str) -> Result<I> {
        match self.node.value {
            Value::Integer(value) => I::try_from(value).map_err(|_| Error::IntegerOutOfRange {
                offset: self.node.offset,
                value,
                target,
            }),
            _ => Err(self.mismatch(Shape::Integer)),
        }
    }

    fn byte_string(&self, expected: Shape) -> Result<&'de [u8]> {
        match self.node.value {
            Value::ByteString(bytes) => Ok(bytes),
            _ => Err(self.mismatch(expected)),
        }
    }

    // Strings that aren't UTF-8 are offered as bytes, which string visitors reject.
    fn visit_text<V: Visitor<'de>>(&self, bytes: &'de [u8], visitor: V) -> Result<V::Value> {
        match std::str::from_utf8(bytes) {
            Ok(s) => visitor.visit_borrowed_str(s),
            Err(_) => visitor.visit_borrowed_bytes(bytes),
        }
    }

    fn visit_list<V: Visitor<'de>>(&self, items: &'a [Node<'de>], visitor: V) -> Result<V::Value> {
        let mut access = ListAccess {
            items: items.iter(),
            decoder: self.decoder,
        };
        let value = visitor.visit_seq(&mut access)?;
        let remaining = access.items.len();

        if remaining > 0 {
            return Err(Error::Invalid {
                offset: self.node.offset,
                message: format!("list has {} more elements than expected", remaining),
            });
        }

        Ok(value)
    }

    fn visit_dictionary<V: Visitor<'de>>(
        &self,
        entries: &'a [Entry<'de>],
        fields: Option<&'static [&'static str]>,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_map(DictionaryAccess {
            entries: entries.iter(),
            pending: None,
            fields,
            decoder: self.decoder,
        })
    }
}

macro_rules! deserialize_integer {
    ($($method:ident => $visit:ident: $ty:ident,)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let value = self.integer::<$ty>(stringify!($ty))?;
                visitor.$visit::<Error>(value).map_err(|e| e.at(self.node.offset))
            }
        )*
    };
}

impl<'a, 'de> de::Deserializer<'de> for NodeDeserializer<'a, 'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.node;
        let result = match &node.value {
            Value::Integer(value) => visitor.visit_i64(*value),
            Value::ByteString(bytes) => self.visit_text(*bytes, visitor),
            Value::List(items) => self.visit_list(items, visitor),
            Value::Dictionary(entries) => self.visit_dictionary(entries, None, visitor),
        };

        result.map_err(|e| e.at(node.offset))
    }

    deserialize_integer! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
    }

    fn deserialize_bool<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::UnsupportedType { ty: "bool" })
    }

    fn deserialize_f32<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::UnsupportedType { ty: "f32" })
    }

    fn deserialize_f64<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::UnsupportedType { ty: "f64" })
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let bytes = self.byte_string(Shape::String)?;
        self.visit_text(bytes, visitor)
            .map_err(|e| e.at(self.node.offset))
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let bytes = self.byte_string(Shape::Bytes)?;
        visitor
            .visit_borrowed_bytes::<Error>(bytes)
            .map_err(|e| e.at(self.node.offset))
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_bytes(visitor)
    }

    // A node that is present is always `Some`. Absent record members are handled by serde.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::UnsupportedType { ty: "()" })
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        let node = self.node;

        match &node.value {
            Value::Dictionary(entries) => {
                let mut access = DictionaryAccess {
                    entries: entries.iter(),
                    pending: None,
                    fields: Some(&[]),
                    decoder: self.decoder,
                };
                // Runs the unknown key policy over the entries.
                de::MapAccess::next_key::<de::IgnoredAny>(&mut access)?;
                visitor.visit_unit()
            }
            _ => Err(self.mismatch(Shape::Record(name))),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.node;

        match &node.value {
            Value::List(items) => self
                .visit_list(items, visitor)
                .map_err(|e| e.at(self.node.offset)),
            _ => Err(self.mismatch(Shape::Sequence)),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value> {
        Err(Error::MissingFieldTag { record: name })
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.node;

        match &node.value {
            Value::Dictionary(entries) => self
                .visit_dictionary(entries, None, visitor)
                .map_err(|e| e.at(self.node.offset)),
            _ => Err(self.mismatch(Shape::Map)),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let node = self.node;

        match &node.value {
            Value::Dictionary(entries) => self
                .visit_dictionary(entries, Some(fields), visitor)
                .map_err(|e| e.at(self.node.offset)),
            _ => Err(self.mismatch(Shape::Record(name))),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(Error::UnsupportedType { ty: name })
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    // The parser already validated the node, so there is nothing left to skip.
    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct ListAccess<'a, 'de> {
    items: slice::Iter<'a, Node<'de>>,
    decoder: &'a Decoder,
}

impl<'a, 'de> de::SeqAccess<'de> for ListAccess<'a, 'de> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        self.items
            .next()
            .map(|item| seed.deserialize(NodeDeserializer::new(item, self.decoder)))
            .transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct DictionaryAccess<'a, 'de> {
    entries: slice::Iter<'a, Entry<'de>>,
    pending: Option<&'a Node<'de>>,
    // Keys of the target record, `None` when decoding a map.
    fields: Option<&'static [&'static str]>,
    decoder: &'a Decoder,
}

impl<'a, 'de> DictionaryAccess<'a, 'de> {
    // Unmapped keys still reach the visitor under `Ignore`, which skips them through
    // `deserialize_ignored_any` unless the type denies unknown fields.
    fn check_key(&self, entry: &Entry<'de>) -> Result<()> {
        let fields = match self.fields {
            Some(fields) => fields,
            None => return Ok(()),
        };

        if fields.iter().any(|field| field.as_bytes() == entry.key) {
            return Ok(());
        }

        let key = String::from_utf8_lossy(entry.key);

        match self.decoder.unknown_keys {
            UnknownKeys::Ignore => {
                log::debug!(
                    "unmapped dictionary key {:?} at offset {}",
                    key,
                    entry.key_offset
                );
                Ok(())
            }
            UnknownKeys::Reject => Err(Error::UnknownKey {
                offset: entry.key_offset,
                key: key.into_owned(),
            }),
        }
    }
}

impl<'a, 'de> de::MapAccess<'de> for DictionaryAccess<'a, 'de> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let entry = match self.entries.next() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        self.check_key(entry)?;
        self.pending = Some(&entry.value);

        let key = match std::str::from_utf8(entry.key) {
            Ok(key) => seed.deserialize(BorrowedStrDeserializer::<Error>::new(key)),
            Err(_) => seed.deserialize(BorrowedBytesDeserializer::<Error>::new(entry.key)),
        };

        key.map(Some).map_err(|e| e.at(entry.key_offset))
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let node = self
            .pending
            .take()
            .ok_or_else(|| Error::Message("dictionary value requested before its key".to_owned()))?;

        seed.deserialize(NodeDeserializer::new(node, self.decoder))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}

// Allows `Node` to stand in for a deserializer, e.g. to decode a subtree picked out of a parsed
// document.
impl<'a, 'de> IntoDeserializer<'de, Error> for &'a Node<'de> {
    type Deserializer = NodeDeserializer<'a, 'de>;

    fn into_deserializer(self) -> Self::Deserializer {
        NodeDeserializer::new(self, &DEFAULT_DECODER)
    }
}

static DEFAULT_DECODER: Decoder = Decoder::new();
