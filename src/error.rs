use crate::node::Kind;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no data to read at offset {offset}")]
    NoData { offset: usize },
    #[error(
        "expected start of integer, string, list, or dictionary at offset {offset}, found byte {byte:#04x}"
    )]
    UnexpectedByte { offset: usize, byte: u8 },
    #[error("expected integer at offset {offset}")]
    MalformedInteger { offset: usize },
    #[error("expected terminator for integer at offset {offset}")]
    MissingIntegerTerminator { offset: usize },
    #[error("expected colon between length and value for string at offset {offset}")]
    MalformedStringLength { offset: usize },
    #[error("string at offset {offset} has length {length}, yet there are not that many bytes left")]
    StringLengthOverrun { offset: usize, length: usize },
    #[error("expected terminator for list at offset {offset}")]
    UnterminatedList { offset: usize },
    #[error("expected terminator for dictionary at offset {offset}")]
    UnterminatedDictionary { offset: usize },
    #[error("dictionary key at offset {offset} is not a string")]
    DictionaryKeyNotString { offset: usize },
    #[error("duplicate dictionary key {key:?} at offset {offset}")]
    DuplicateKey { offset: usize, key: String },
    #[error("containers nested deeper than {limit} levels at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
    #[error("cannot unmarshal {found} at offset {offset} into {expected}")]
    TypeMismatch {
        offset: usize,
        found: Kind,
        expected: Shape,
    },
    #[error("integer {value} at offset {offset} does not fit in {target}")]
    IntegerOutOfRange {
        offset: usize,
        value: i64,
        target: &'static str,
    },
    #[error("unknown dictionary key {key:?} at offset {offset}")]
    UnknownKey { offset: usize, key: String },
    #[error("trailing data at offset {offset} cannot be parsed")]
    TrailingData { offset: usize },
    #[error("{message} at offset {offset}")]
    Invalid { offset: usize, message: String },

    #[error("found struct field with no key tag in `{record}`")]
    MissingFieldTag { record: &'static str },
    #[error("key tag {tag:?} is used by more than one member")]
    DuplicateFieldTag { tag: String },
    #[error("strings may not contain non-ascii characters: {0}")]
    NonAsciiString(String),
    #[error("integer {0} exceeds the signed 64-bit range")]
    IntegerTooLarge(u64),
    #[error("encountered unsupported type: {ty}")]
    UnsupportedType { ty: &'static str },

    #[error("{0}")]
    Message(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Byte offset into the input where a decode error was detected.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::NoData { offset }
            | Self::UnexpectedByte { offset, .. }
            | Self::MalformedInteger { offset }
            | Self::MissingIntegerTerminator { offset }
            | Self::MalformedStringLength { offset }
            | Self::StringLengthOverrun { offset, .. }
            | Self::UnterminatedList { offset }
            | Self::UnterminatedDictionary { offset }
            | Self::DictionaryKeyNotString { offset }
            | Self::DuplicateKey { offset, .. }
            | Self::NestingTooDeep { offset, .. }
            | Self::TypeMismatch { offset, .. }
            | Self::IntegerOutOfRange { offset, .. }
            | Self::UnknownKey { offset, .. }
            | Self::TrailingData { offset }
            | Self::Invalid { offset, .. } => Some(*offset),
            Self::MissingFieldTag { .. }
            | Self::DuplicateFieldTag { .. }
            | Self::NonAsciiString(_)
            | Self::IntegerTooLarge(_)
            | Self::UnsupportedType { .. }
            | Self::Message(_) => None,
        }
    }

    // Pins an unlocated serde error to the node it was raised for. Errors that already carry an
    // offset keep it, so the innermost location wins.
    pub(crate) fn at(self, offset: usize) -> Self {
        match self {
            Self::Message(message) => Self::Invalid { offset, message },
            other => other,
        }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Message(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::Message(msg.to_string())
    }
}

/// Host-side shape a decoder target asked for. Reported by [`Error::TypeMismatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Integer,
    String,
    Bytes,
    Sequence,
    Record(&'static str),
    Map,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::String => write!(f, "string"),
            Self::Bytes => write!(f, "byte string"),
            Self::Sequence => write!(f, "sequence"),
            Self::Record(name) => write!(f, "record `{}`", name),
            Self::Map => write!(f, "map"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    #[test]
    fn offset_is_reported_for_decode_errors_only() {
        assert_eq!(Error::TrailingData { offset: 7 }.offset(), Some(7));
        assert_eq!(Error::NonAsciiString("§".into()).offset(), None);
        assert_eq!(Error::custom("oops").offset(), None);
    }

    #[test]
    fn at_locates_only_unlocated_errors() {
        assert_eq!(
            Error::custom("missing field `x`").at(3),
            Error::Invalid {
                offset: 3,
                message: "missing field `x`".to_owned()
            }
        );
        assert_eq!(
            Error::UnterminatedList { offset: 9 }.at(3),
            Error::UnterminatedList { offset: 9 }
        );
    }

    #[test]
    fn messages() {
        assert_eq!(
            Error::StringLengthOverrun {
                offset: 0,
                length: 100
            }
            .to_string(),
            "string at offset 0 has length 100, yet there are not that many bytes left"
        );
        assert_eq!(
            Error::TypeMismatch {
                offset: 4,
                found: Kind::List,
                expected: Shape::Record("Info"),
            }
            .to_string(),
            "cannot unmarshal list at offset 4 into record `Info`"
        );
        assert_eq!(
            Error::NonAsciiString("§".into()).to_string(),
            "strings may not contain non-ascii characters: §"
        );
    }
}
