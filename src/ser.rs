//! Canonical bencode encoder.

use crate::{
    error::{Error, Result},
    node::{DICTIONARY, INTEGER, LENGTH_SEPARATOR, LIST, TERMINATOR},
};
use serde::ser::{self, Impossible, Serialize};
use std::fmt::Display;

/// Encodes `value` into canonical bencode.
///
/// Records (structs with named fields) become dictionaries keyed by their serde field names, with
/// the keys sorted. `None` record members are left out.
///
/// # Errors
///
/// Fails if the value contains a type bencode can't represent, a string with non-ASCII
/// characters, or a struct member with no key tag (a tuple struct).
///
/// Members are encoded in declaration order and the first failure is reported. A member that
/// fails to encode is therefore reported ahead of a later member's missing or duplicate tag.
///
/// ```
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Info {
///     name: String,
///     #[serde(rename = "piece length")]
///     piece_length: u32,
/// }
///
/// let info = Info { name: "a.txt".to_owned(), piece_length: 16384 };
/// let encoded = bencoding::to_bytes(&info).unwrap();
/// assert_eq!(encoded, b"d4:name5:a.txt12:piece lengthi16384ee");
/// ```
pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    Serializer::encode(value)?.ok_or(Error::UnsupportedType { ty: "none" })
}

/// What serializing a value produced.
pub(crate) enum Emitted {
    Value,
    // `None`. Only meaningful as a record member or map value, which is then left out.
    Nothing,
}

pub(crate) struct Serializer {
    output: Vec<u8>,
}

impl Serializer {
    // Encodes `value` into a buffer of its own, returning `None` if it was `None`.
    fn encode<T>(value: &T) -> Result<Option<Vec<u8>>>
    where
        T: ?Sized + Serialize,
    {
        let mut serializer = Serializer { output: Vec::new() };

        match value.serialize(&mut serializer)? {
            Emitted::Value => Ok(Some(serializer.output)),
            Emitted::Nothing => Ok(None),
        }
    }

    fn write_integer<I: Display>(&mut self, value: I) -> Result<Emitted> {
        self.output.push(INTEGER);
        self.output.extend_from_slice(value.to_string().as_bytes());
        self.output.push(TERMINATOR);
        Ok(Emitted::Value)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<Emitted> {
        write_byte_string(&mut self.output, bytes);
        Ok(Emitted::Value)
    }
}

fn write_byte_string(output: &mut Vec<u8>, bytes: &[u8]) {
    output.extend_from_slice(bytes.len().to_string().as_bytes());
    output.push(LENGTH_SEPARATOR);
    output.extend_from_slice(bytes);
}

fn check_ascii(s: &str) -> Result<()> {
    if s.is_ascii() {
        Ok(())
    } else {
        Err(Error::NonAsciiString(s.to_owned()))
    }
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = Emitted;
    type Error = Error;

    type SerializeSeq = ListEncoder<'a>;
    type SerializeTuple = ListEncoder<'a>;
    type SerializeTupleStruct = Impossible<Emitted, Error>;
    type SerializeTupleVariant = Impossible<Emitted, Error>;
    type SerializeMap = DictionaryEncoder<'a>;
    type SerializeStruct = DictionaryEncoder<'a>;
    type SerializeStructVariant = Impossible<Emitted, Error>;

    fn serialize_bool(self, _: bool) -> Result<Emitted> {
        Err(Error::UnsupportedType { ty: "bool" })
    }

    fn serialize_i8(self, v: i8) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_i16(self, v: i16) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_i32(self, v: i32) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_i64(self, v: i64) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_u16(self, v: u16) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_u32(self, v: u32) -> Result<Emitted> {
        self.write_integer(v)
    }

    fn serialize_u64(self, v: u64) -> Result<Emitted> {
        if i64::try_from(v).is_err() {
            return Err(Error::IntegerTooLarge(v));
        }

        self.write_integer(v)
    }

    fn serialize_f32(self, _: f32) -> Result<Emitted> {
        Err(Error::UnsupportedType { ty: "f32" })
    }

    fn serialize_f64(self, _: f64) -> Result<Emitted> {
        Err(Error::UnsupportedType { ty: "f64" })
    }

    fn serialize_char(self, v: char) -> Result<Emitted> {
        ser::Serializer::serialize_str(self, v.encode_utf8(&mut [0; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<Emitted> {
        check_ascii(v)?;
        self.write_bytes(v.as_bytes())
    }

    // Raw byte buffers (`serde_bytes`) may hold anything.
    fn serialize_bytes(self, v: &[u8]) -> Result<Emitted> {
        self.write_bytes(v)
    }

    fn serialize_none(self) -> Result<Emitted> {
        Ok(Emitted::Nothing)
    }

    fn serialize_some<T>(self, value: &T) -> Result<Emitted>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Emitted> {
        Err(Error::UnsupportedType { ty: "()" })
    }

    // A record without members.
    fn serialize_unit_struct(self, _name: &'static str) -> Result<Emitted> {
        self.output.push(DICTIONARY);
        self.output.push(TERMINATOR);
        Ok(Emitted::Value)
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Emitted> {
        Err(Error::UnsupportedType { ty: name })
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Emitted>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<Emitted>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::UnsupportedType { ty: name })
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<ListEncoder<'a>> {
        self.output.push(LIST);
        Ok(ListEncoder { ser: self })
    }

    fn serialize_tuple(self, len: usize) -> Result<ListEncoder<'a>> {
        ser::Serializer::serialize_seq(self, Some(len))
    }

    // Tuple struct members are positional, so none of them has a key tag.
    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Impossible<Emitted, Error>> {
        Err(Error::MissingFieldTag { record: name })
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Impossible<Emitted, Error>> {
        Err(Error::UnsupportedType { ty: name })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<DictionaryEncoder<'a>> {
        Ok(DictionaryEncoder::new(self, None, len.unwrap_or(0)))
    }

    fn serialize_struct(self, name: &'static str, len: usize) -> Result<DictionaryEncoder<'a>> {
        Ok(DictionaryEncoder::new(self, Some(name), len))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Impossible<Emitted, Error>> {
        Err(Error::UnsupportedType { ty: name })
    }
}

pub(crate) struct ListEncoder<'a> {
    ser: &'a mut Serializer,
}

impl ListEncoder<'_> {
    fn element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        match value.serialize(&mut *self.ser)? {
            Emitted::Value => Ok(()),
            Emitted::Nothing => Err(Error::UnsupportedType { ty: "none" }),
        }
    }

    fn finish(self) -> Result<Emitted> {
        self.ser.output.push(TERMINATOR);
        Ok(Emitted::Value)
    }
}

impl ser::SerializeSeq for ListEncoder<'_> {
    type Ok = Emitted;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<Emitted> {
        self.finish()
    }
}

impl ser::SerializeTuple for ListEncoder<'_> {
    type Ok = Emitted;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<Emitted> {
        self.finish()
    }
}

/// Collects the entries of a record or map, then writes them sorted by key.
///
/// Nothing reaches the output before `end`, so a record that fails half way leaves no partial
/// dictionary behind.
pub(crate) struct DictionaryEncoder<'a> {
    ser: &'a mut Serializer,
    // `None` for maps.
    record: Option<&'static str>,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pending_key: Option<Vec<u8>>,
}

impl<'a> DictionaryEncoder<'a> {
    fn new(ser: &'a mut Serializer, record: Option<&'static str>, len: usize) -> Self {
        Self {
            ser,
            record,
            entries: Vec::with_capacity(len),
            pending_key: None,
        }
    }

    fn push<T>(&mut self, key: Vec<u8>, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        if let Some(value) = Serializer::encode(value)? {
            self.entries.push((key, value));
        }

        Ok(())
    }
}

// Map keys must encode as byte strings. Returns the raw key bytes without the length prefix.
fn encode_map_key<T>(key: &T) -> Result<Vec<u8>>
where
    T: ?Sized + Serialize,
{
    const UNSUPPORTED: Error = Error::UnsupportedType {
        ty: "non-string map key",
    };

    let mut encoded = Serializer::encode(key)?.ok_or(UNSUPPORTED)?;

    if !encoded.first().map_or(false, u8::is_ascii_digit) {
        return Err(UNSUPPORTED);
    }

    let separator = encoded
        .iter()
        .position(|byte| *byte == LENGTH_SEPARATOR)
        .ok_or(UNSUPPORTED)?;

    Ok(encoded.split_off(separator + 1))
}

impl ser::SerializeStruct for DictionaryEncoder<'_> {
    type Ok = Emitted;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        if key.is_empty() {
            return Err(Error::MissingFieldTag {
                record: self.record.unwrap_or_default(),
            });
        }

        check_ascii(key)?;
        self.push(key.as_bytes().to_vec(), value)
    }

    fn end(self) -> Result<Emitted> {
        ser::SerializeMap::end(self)
    }
}

impl ser::SerializeMap for DictionaryEncoder<'_> {
    type Ok = Emitted;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        self.pending_key = Some(encode_map_key(key)?);
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| Error::Message("map value serialized before its key".to_owned()))?;

        self.push(key, value)
    }

    fn end(mut self) -> Result<Emitted> {
        self.entries.sort_by(|(a, _), (b, _)| a.cmp(b));

        if let Some(pair) = self.entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(Error::DuplicateFieldTag {
                tag: String::from_utf8_lossy(&pair[0].0).into_owned(),
            });
        }

        let output = &mut self.ser.output;

        output.push(DICTIONARY);

        for (key, value) in &self.entries {
            write_byte_string(output, key);
            output.extend_from_slice(value);
        }

        output.push(TERMINATOR);

        Ok(Emitted::Value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Serialize)]
    struct Simple {
        #[serde(rename = "x")]
        x: i32,
        #[serde(rename = "yy")]
        y: i32,
        #[serde(rename = "zzz")]
        z: String,
    }

    #[derive(Serialize)]
    struct Empty;

    #[derive(Serialize)]
    struct Pair(i32, i32);

    // A record whose second member has an empty key tag.
    struct Untagged {
        a: i32,
        b: i32,
    }

    impl Serialize for Untagged {
        fn serialize<S: ser::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            use ser::SerializeStruct;

            let mut record = s.serialize_struct("Untagged", 2)?;
            record.serialize_field("a", &self.a)?;
            record.serialize_field("", &self.b)?;
            record.end()
        }
    }

    // Two members mapped to the same key.
    struct Clashing {
        a: i32,
        b: i32,
    }

    impl Serialize for Clashing {
        fn serialize<S: ser::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            use ser::SerializeStruct;

            let mut record = s.serialize_struct("Clashing", 2)?;
            record.serialize_field("a", &self.a)?;
            record.serialize_field("a", &self.b)?;
            record.end()
        }
    }

    #[derive(Serialize)]
    struct Optional {
        present: Option<u8>,
        absent: Option<u8>,
    }

    #[derive(Serialize)]
    struct Binary {
        #[serde(with = "serde_bytes")]
        hash: Vec<u8>,
    }

    #[derive(Serialize)]
    enum Color {
        Red,
    }

    fn encoded<T: ?Sized + Serialize>(value: &T) -> String {
        String::from_utf8(to_bytes(value).unwrap()).unwrap()
    }

    #[test]
    fn integers() {
        assert_eq!(encoded(&0), "i0e");
        assert_eq!(encoded(&651), "i651e");
        assert_eq!(encoded(&-601i64), "i-601e");
        assert_eq!(encoded(&i64::MIN), "i-9223372036854775808e");
        assert_eq!(encoded(&255u8), "i255e");
        assert_eq!(encoded(&(i64::MAX as u64)), "i9223372036854775807e");
        assert_eq!(to_bytes(&u64::MAX), Err(Error::IntegerTooLarge(u64::MAX)));
    }

    #[test]
    fn strings() {
        assert_eq!(encoded(""), "0:");
        assert_eq!(encoded("hello"), "5:hello");
        assert_eq!(encoded("Hello, world!"), "13:Hello, world!");
        assert_eq!(encoded(&'c'), "1:c");
        assert_eq!(
            to_bytes("§"),
            Err(Error::NonAsciiString("§".to_owned()))
        );
    }

    #[test]
    fn raw_bytes_are_not_restricted_to_ascii() {
        let value = Binary {
            hash: vec![0x00, 0xff, 0x80],
        };

        assert_eq!(to_bytes(&value).unwrap(), b"d4:hash3:\x00\xff\x80e");
    }

    #[test]
    fn sequences() {
        assert_eq!(encoded(&Vec::<i32>::new()), "le");
        assert_eq!(encoded(&[1, 2, 3]), "li1ei2ei3ee");
        assert_eq!(encoded(&vec!["abc", "de"]), "l3:abc2:dee");
        assert_eq!(encoded(&(1, "a")), "li1e1:ae");
        assert_eq!(encoded(&vec![vec![1], vec![]]), "lli1eelee");
    }

    #[test]
    fn records_are_sorted_by_tag() {
        let value = Simple {
            x: 651,
            y: 123,
            z: "hello".to_owned(),
        };

        assert_eq!(encoded(&value), "d1:xi651e2:yyi123e3:zzz5:helloe");
        assert_eq!(encoded(&Empty), "de");
        assert_eq!(encoded(&vec![Empty, Empty]), "ldedee");
    }

    #[test]
    fn missing_field_tag() {
        assert_eq!(
            to_bytes(&Pair(1, 2)),
            Err(Error::MissingFieldTag { record: "Pair" })
        );
        assert_eq!(
            to_bytes(&Untagged { a: 1, b: 2 }),
            Err(Error::MissingFieldTag { record: "Untagged" })
        );
        assert_eq!(
            to_bytes(&vec![Untagged { a: 1, b: 2 }]),
            Err(Error::MissingFieldTag { record: "Untagged" })
        );
    }

    #[test]
    fn duplicate_field_tag() {
        assert_eq!(
            to_bytes(&Clashing { a: 1, b: 2 }),
            Err(Error::DuplicateFieldTag {
                tag: "a".to_owned()
            })
        );
    }

    #[test]
    fn none_members_are_left_out() {
        let value = Optional {
            present: Some(1),
            absent: None,
        };

        assert_eq!(encoded(&value), "d7:presenti1ee");
        assert_eq!(
            to_bytes(&None::<u8>),
            Err(Error::UnsupportedType { ty: "none" })
        );
        assert_eq!(
            to_bytes(&vec![Some(1), None]),
            Err(Error::UnsupportedType { ty: "none" })
        );
    }

    #[test]
    fn maps() {
        let mut map = HashMap::new();
        map.insert("spam", vec!["a", "b"]);
        map.insert("cow", vec!["moo"]);

        assert_eq!(encoded(&map), "d3:cowl3:mooe4:spaml1:a1:bee");
        assert_eq!(encoded(&BTreeMap::<String, u8>::new()), "de");

        let mut numbers = BTreeMap::new();
        numbers.insert(1, 2);
        assert_eq!(
            to_bytes(&numbers),
            Err(Error::UnsupportedType {
                ty: "non-string map key"
            })
        );

        let mut non_ascii = BTreeMap::new();
        non_ascii.insert("é", 1);
        assert_eq!(
            to_bytes(&non_ascii),
            Err(Error::NonAsciiString("é".to_owned()))
        );
    }

    #[test]
    fn unsupported_types() {
        assert_eq!(to_bytes(&true), Err(Error::UnsupportedType { ty: "bool" }));
        assert_eq!(to_bytes(&1.5f64), Err(Error::UnsupportedType { ty: "f64" }));
        assert_eq!(to_bytes(&()), Err(Error::UnsupportedType { ty: "()" }));
        assert_eq!(
            to_bytes(&Color::Red),
            Err(Error::UnsupportedType { ty: "Color" })
        );
    }
}
