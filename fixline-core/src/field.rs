/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Field types and typed conversion for FIX protocol messages.
//!
//! Field values are stored untyped; typing happens at the edge:
//! - [`FieldTag`]: Type-safe wrapper for FIX field tag numbers
//! - [`FieldRef`]: Zero-copy reference to a field within a message buffer
//! - [`FieldConvert`]: Conversion between raw values and Rust types
//! - [`FixField`]: Descriptor implemented by generated field bindings
//! - [`FieldValue`]: Dictionary-typed view of a raw value

use crate::error::{DecodeError, FieldMapError};
use crate::types::{SeqNum, Timestamp};
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FIX field tag number.
///
/// Tags are positive integers that identify fields within a FIX message.
/// Standard tags are defined in the FIX specification (1-5000 range),
/// while user-defined tags use the 5001+ range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct FieldTag(u32);

impl FieldTag {
    /// Creates a new field tag.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32) -> Self {
        Self(tag)
    }

    /// Returns the raw tag number.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns true if this is a user-defined tag (5001+).
    #[inline]
    #[must_use]
    pub const fn is_user_defined(self) -> bool {
        self.0 > 5000
    }
}

impl From<u32> for FieldTag {
    fn from(tag: u32) -> Self {
        Self(tag)
    }
}

impl From<FieldTag> for u32 {
    fn from(tag: FieldTag) -> Self {
        tag.0
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-copy reference to a field within a FIX message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    /// The field tag number.
    pub tag: u32,
    /// Reference to the field value bytes (without delimiters).
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a new field reference.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Returns the value as a string slice.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if the value is not valid UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(DecodeError::from)
    }

    /// Converts the value into `T`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if conversion fails.
    pub fn get<T: FieldConvert>(&self) -> Result<T, DecodeError> {
        T::from_field(self.tag, self.value).map_err(DecodeError::from)
    }

    /// Returns the value as a u64.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a valid integer.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        self.get()
    }

    /// Returns the raw bytes of the value.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.value
    }
}

/// Conversion between a raw field value and a Rust type.
///
/// Implementations follow the FIX data type rules: integers are plain ASCII
/// decimal, booleans are `Y`/`N`, timestamps are UTCTimestamp.
pub trait FieldConvert: Sized {
    /// Parses the raw bytes of field `tag`.
    ///
    /// # Errors
    /// Returns `FieldMapError::InvalidValue` if the bytes are not a valid `Self`.
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError>;

    /// Renders the value as raw field bytes.
    fn to_field(&self) -> Bytes;
}

fn invalid(tag: u32, raw: &[u8], expected: &str) -> FieldMapError {
    FieldMapError::InvalidValue {
        tag,
        reason: format!("'{}' is not a valid {}", String::from_utf8_lossy(raw), expected),
    }
}

fn utf8(tag: u32, raw: &[u8]) -> Result<&str, FieldMapError> {
    std::str::from_utf8(raw).map_err(|_| invalid(tag, raw, "UTF-8 string"))
}

fn parse_ascii<T: FromStr>(tag: u32, raw: &[u8], expected: &str) -> Result<T, FieldMapError> {
    utf8(tag, raw)?
        .parse()
        .map_err(|_| invalid(tag, raw, expected))
}

impl FieldConvert for String {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        utf8(tag, raw).map(str::to_owned)
    }

    fn to_field(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl FieldConvert for Bytes {
    fn from_field(_tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        Ok(Bytes::copy_from_slice(raw))
    }

    fn to_field(&self) -> Bytes {
        self.clone()
    }
}

macro_rules! integer_convert {
    ($($ty:ty),*) => {
        $(
            impl FieldConvert for $ty {
                fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
                    // FIX integers never carry a leading '+'.
                    if raw.first() == Some(&b'+') {
                        return Err(invalid(tag, raw, "integer"));
                    }
                    parse_ascii(tag, raw, "integer")
                }

                fn to_field(&self) -> Bytes {
                    let mut buf = itoa::Buffer::new();
                    Bytes::copy_from_slice(buf.format(*self).as_bytes())
                }
            }
        )*
    };
}

integer_convert!(u32, u64, i64, usize);

impl FieldConvert for SeqNum {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        u64::from_field(tag, raw).map(SeqNum::new)
    }

    fn to_field(&self) -> Bytes {
        self.value().to_field()
    }
}

impl FieldConvert for bool {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        match raw {
            b"Y" => Ok(true),
            b"N" => Ok(false),
            _ => Err(invalid(tag, raw, "boolean (Y/N)")),
        }
    }

    fn to_field(&self) -> Bytes {
        Bytes::from_static(if *self { b"Y" } else { b"N" })
    }
}

impl FieldConvert for char {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        match raw {
            [b] if b.is_ascii() => Ok(*b as char),
            _ => Err(invalid(tag, raw, "single character")),
        }
    }

    fn to_field(&self) -> Bytes {
        let mut buf = [0u8; 4];
        Bytes::copy_from_slice(self.encode_utf8(&mut buf).as_bytes())
    }
}

impl FieldConvert for Decimal {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        parse_ascii(tag, raw, "decimal")
    }

    fn to_field(&self) -> Bytes {
        Bytes::from(self.normalize().to_string())
    }
}

impl FieldConvert for Timestamp {
    fn from_field(tag: u32, raw: &[u8]) -> Result<Self, FieldMapError> {
        Timestamp::parse_fix(utf8(tag, raw)?).ok_or_else(|| invalid(tag, raw, "UTCTimestamp"))
    }

    fn to_field(&self) -> Bytes {
        Bytes::copy_from_slice(self.format_millis().as_bytes())
    }
}

/// Descriptor for a single named field.
///
/// Generated bindings implement this on zero-sized marker types so that
/// `map.get::<ClOrdId>()` maps a human field name to its tag and type
/// without any per-message code.
pub trait FixField {
    /// The tag number for this field.
    const TAG: u32;

    /// The Rust type for this field's value.
    type Value: FieldConvert;
}

/// Dictionary-typed view of a raw field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// String value.
    String(String),
    /// Integer value.
    Int(i64),
    /// Unsigned integer value (lengths, counts, sequence numbers).
    UInt(u64),
    /// Decimal value (price, qty, amount, float).
    Decimal(Decimal),
    /// Boolean value (Y/N).
    Bool(bool),
    /// Single character value.
    Char(char),
    /// UTC timestamp.
    Timestamp(Timestamp),
    /// Raw bytes (for data fields).
    Data(Bytes),
}

impl FieldValue {
    /// Returns the value as a string, if it is a String variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as a u64, if it is a UInt variant.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Renders the value back to its wire form.
    #[must_use]
    pub fn to_field(&self) -> Bytes {
        match self {
            Self::String(s) => s.to_field(),
            Self::Int(v) => v.to_field(),
            Self::UInt(v) => v.to_field(),
            Self::Decimal(v) => v.to_field(),
            Self::Bool(v) => v.to_field(),
            Self::Char(v) => v.to_field(),
            Self::Timestamp(v) => v.to_field(),
            Self::Data(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
            other => write!(f, "{}", String::from_utf8_lossy(&other.to_field())),
        }
    }
}
