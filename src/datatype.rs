//! Storage type resolution.
//!
//! Every payload written or read by the marshallers is described by a [`StorageTypeTag`].
//! Language-level element types are mapped to tags through their [`ScalarKind`] with [`resolve_type`],
//! which is platform aware: [`isize`] and [`usize`] resolve to the tag of the fixed-width integer with the same byte width.

mod element;

pub use element::{Element, InvalidElementBytesError};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

/// The name returned by [`tag_name`] for a code that does not identify a [`StorageTypeTag`].
pub const UNKNOWN_TYPE_NAME: &str = "Unknown";

/// A storage type tag.
///
/// There is exactly one tag per supported scalar kind.
/// The numeric code of each tag is stable and is what node metadata persists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StorageTypeTag {
    /// `int8` Integer in `[-2^7, 2^7-1]`.
    Int8 = 0,
    /// `int16` Integer in `[-2^15, 2^15-1]`.
    Int16 = 1,
    /// `int32` Integer in `[-2^31, 2^31-1]`.
    Int32 = 2,
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    Int64 = 3,
    /// `uint8` Integer in `[0, 2^8-1]`.
    UInt8 = 4,
    /// `uint16` Integer in `[0, 2^16-1]`.
    UInt16 = 5,
    /// `uint32` Integer in `[0, 2^32-1]`.
    UInt32 = 6,
    /// `uint64` Integer in `[0, 2^64-1]`.
    UInt64 = 7,
    /// `float32` IEEE 754 single-precision floating point.
    Float32 = 8,
    /// `float64` IEEE 754 double-precision floating point.
    Float64 = 9,
    /// A fixed-width, null-terminated byte string.
    FixedString = 10,
    /// A variable-length UTF-8 string.
    VariableString = 11,
}

impl StorageTypeTag {
    /// Every storage type tag, in code order.
    pub const ALL: [Self; 12] = [
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
        Self::FixedString,
        Self::VariableString,
    ];

    /// Returns the name of the tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::FixedString => "fixed_string",
            Self::VariableString => "variable_string",
        }
    }

    /// Returns the tag with `name`, if there is one.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.name() == name)
    }

    /// Returns the numeric code of the tag.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns the tag with numeric `code`, if there is one.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Returns the [`TypeClass`] of the tag.
    #[must_use]
    pub const fn type_class(self) -> TypeClass {
        match self {
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::UInt64 => TypeClass::Integer,
            Self::Float32 | Self::Float64 => TypeClass::Float,
            Self::FixedString | Self::VariableString => TypeClass::String,
        }
    }

    /// Returns the size in bytes of one element of a numeric tag.
    ///
    /// Returns [`None`] for the string tags, whose size is not implied by the tag.
    #[must_use]
    pub const fn numeric_size(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::FixedString | Self::VariableString => None,
        }
    }
}

/// Returns the name of the tag with numeric `code`, or [`UNKNOWN_TYPE_NAME`] if no tag has that code.
#[must_use]
pub fn tag_name(code: u8) -> &'static str {
    StorageTypeTag::from_code(code).map_or(UNKNOWN_TYPE_NAME, StorageTypeTag::name)
}

/// A scalar kind descriptor.
///
/// This is the run-time description of an element type, see [`Element::KIND`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// A two's complement signed integer of the given width.
    SignedInteger {
        /// The width in bytes.
        width_bytes: usize,
    },
    /// An unsigned integer of the given width.
    UnsignedInteger {
        /// The width in bytes.
        width_bytes: usize,
    },
    /// An IEEE 754 floating point number of the given width.
    Float {
        /// The width in bytes.
        width_bytes: usize,
    },
    /// A boolean, stored as one byte.
    Bool,
    /// A fixed-width byte string.
    FixedString,
    /// A variable-length string.
    VariableString,
}

/// An unsupported scalar kind.
#[derive(Debug, Error)]
#[error("unsupported scalar kind {0:?}")]
pub struct UnsupportedTypeError(pub ScalarKind);

/// Resolve the [`StorageTypeTag`] of a scalar `kind`.
///
/// # Errors
/// Returns [`UnsupportedTypeError`] if no tag maps to `kind`, e.g. a 16 byte integer.
pub fn resolve_type(kind: ScalarKind) -> Result<StorageTypeTag, UnsupportedTypeError> {
    match kind {
        ScalarKind::SignedInteger { width_bytes: 1 } => Ok(StorageTypeTag::Int8),
        ScalarKind::SignedInteger { width_bytes: 2 } => Ok(StorageTypeTag::Int16),
        ScalarKind::SignedInteger { width_bytes: 4 } => Ok(StorageTypeTag::Int32),
        ScalarKind::SignedInteger { width_bytes: 8 } => Ok(StorageTypeTag::Int64),
        ScalarKind::UnsignedInteger { width_bytes: 1 } | ScalarKind::Bool => {
            Ok(StorageTypeTag::UInt8)
        }
        ScalarKind::UnsignedInteger { width_bytes: 2 } => Ok(StorageTypeTag::UInt16),
        ScalarKind::UnsignedInteger { width_bytes: 4 } => Ok(StorageTypeTag::UInt32),
        ScalarKind::UnsignedInteger { width_bytes: 8 } => Ok(StorageTypeTag::UInt64),
        ScalarKind::Float { width_bytes: 4 } => Ok(StorageTypeTag::Float32),
        ScalarKind::Float { width_bytes: 8 } => Ok(StorageTypeTag::Float64),
        ScalarKind::FixedString => Ok(StorageTypeTag::FixedString),
        ScalarKind::VariableString => Ok(StorageTypeTag::VariableString),
        ScalarKind::SignedInteger { .. }
        | ScalarKind::UnsignedInteger { .. }
        | ScalarKind::Float { .. } => Err(UnsupportedTypeError(kind)),
    }
}

/// The class of a storage type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum TypeClass {
    /// Signed and unsigned integers.
    #[display("INTEGER")]
    Integer,
    /// Floating point numbers.
    #[display("FLOAT")]
    Float,
    /// Fixed-width and variable-length strings.
    #[display("STRING")]
    String,
}

/// A full type description as held by a datatype handle.
///
/// A [`StorageTypeTag`] is sufficient for numeric types, fixed-width strings additionally carry their size in bytes (including the terminator).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum TypeDescriptor {
    /// A numeric type. The tag must not be a string tag.
    Numeric {
        /// The numeric storage type tag.
        tag: StorageTypeTag,
    },
    /// A fixed-width, null-terminated string of `size` bytes.
    FixedString {
        /// The size in bytes, including the null terminator.
        size: usize,
    },
    /// A variable-length string.
    VariableString,
}

impl TypeDescriptor {
    /// Create the descriptor of the numeric or variable-length type `tag`.
    ///
    /// Returns [`None`] for [`StorageTypeTag::FixedString`], which needs a size.
    #[must_use]
    pub const fn from_tag(tag: StorageTypeTag) -> Option<Self> {
        match tag {
            StorageTypeTag::FixedString => None,
            StorageTypeTag::VariableString => Some(Self::VariableString),
            tag => Some(Self::Numeric { tag }),
        }
    }

    /// Returns the storage type tag.
    #[must_use]
    pub const fn tag(&self) -> StorageTypeTag {
        match self {
            Self::Numeric { tag } => *tag,
            Self::FixedString { .. } => StorageTypeTag::FixedString,
            Self::VariableString => StorageTypeTag::VariableString,
        }
    }

    /// Returns the type class.
    #[must_use]
    pub const fn type_class(&self) -> TypeClass {
        self.tag().type_class()
    }

    /// Returns the size in bytes of one element, or [`None`] for a variable-length string.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            Self::Numeric { tag } => tag.numeric_size(),
            Self::FixedString { size } => Some(*size),
            Self::VariableString => None,
        }
    }

    /// Returns true for a variable-length type.
    #[must_use]
    pub const fn is_variable_length(&self) -> bool {
        matches!(self, Self::VariableString)
    }

    /// Returns true if the descriptor is well formed.
    ///
    /// Numeric descriptors must carry a numeric tag and fixed-width strings must be at least one byte.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        match self {
            Self::Numeric { tag } => tag.numeric_size().is_some(),
            Self::FixedString { size } => *size > 0,
            Self::VariableString => true,
        }
    }
}

impl std::fmt::Display for StorageTypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FixedString { size } => write!(f, "fixed_string({size})"),
            _ => write!(f, "{}", self.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tag_names_are_unique() {
        let names: HashSet<_> = StorageTypeTag::ALL.iter().map(|tag| tag.name()).collect();
        assert_eq!(names.len(), StorageTypeTag::ALL.len());
        assert!(!names.contains(UNKNOWN_TYPE_NAME));
        for tag in StorageTypeTag::ALL {
            assert_eq!(StorageTypeTag::from_name(tag.name()), Some(tag));
            assert_eq!(tag.to_string(), tag.name());
            assert_eq!(tag_name(tag.code()), tag.name());
        }
    }

    #[test]
    fn tag_display() {
        assert_eq!(StorageTypeTag::UInt64.to_string(), "uint64");
        assert_eq!(StorageTypeTag::VariableString.to_string(), "variable_string");
        assert_eq!(
            TypeDescriptor::Numeric {
                tag: StorageTypeTag::Float32
            }
            .to_string(),
            "float32"
        );
        assert_eq!(
            TypeDescriptor::FixedString { size: 4 }.to_string(),
            "fixed_string(4)"
        );
    }

    #[test]
    fn tag_name_unknown() {
        assert_eq!(tag_name(12), UNKNOWN_TYPE_NAME);
        assert_eq!(tag_name(u8::MAX), UNKNOWN_TYPE_NAME);
        assert_eq!(StorageTypeTag::from_name("int128"), None);
        assert_eq!(StorageTypeTag::from_name(UNKNOWN_TYPE_NAME), None);
    }

    #[test]
    fn resolve_widths() {
        assert_eq!(
            resolve_type(ScalarKind::SignedInteger { width_bytes: 2 }).unwrap(),
            StorageTypeTag::Int16
        );
        assert_eq!(
            resolve_type(ScalarKind::UnsignedInteger { width_bytes: 8 }).unwrap(),
            StorageTypeTag::UInt64
        );
        assert_eq!(
            resolve_type(ScalarKind::Bool).unwrap(),
            StorageTypeTag::UInt8
        );
        assert!(resolve_type(ScalarKind::SignedInteger { width_bytes: 16 }).is_err());
        assert!(resolve_type(ScalarKind::Float { width_bytes: 2 }).is_err());
        assert_eq!(
            resolve_type(ScalarKind::UnsignedInteger { width_bytes: 3 })
                .unwrap_err()
                .to_string(),
            "unsupported scalar kind UnsignedInteger { width_bytes: 3 }"
        );
    }

    #[test]
    fn type_descriptor() {
        let descriptor = TypeDescriptor::from_tag(StorageTypeTag::Float64).unwrap();
        assert_eq!(descriptor.size(), Some(8));
        assert_eq!(descriptor.type_class(), TypeClass::Float);
        assert!(TypeDescriptor::from_tag(StorageTypeTag::FixedString).is_none());
        assert!(TypeDescriptor::from_tag(StorageTypeTag::VariableString)
            .unwrap()
            .is_variable_length());

        let fixed = TypeDescriptor::FixedString { size: 6 };
        assert_eq!(fixed.tag(), StorageTypeTag::FixedString);
        assert_eq!(fixed.to_string(), "fixed_string(6)");
        assert!(!TypeDescriptor::FixedString { size: 0 }.is_valid());
        assert!(!TypeDescriptor::Numeric {
            tag: StorageTypeTag::VariableString
        }
        .is_valid());
    }

    #[test]
    fn type_descriptor_json() {
        let descriptor = TypeDescriptor::Numeric {
            tag: StorageTypeTag::Int32,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        assert_eq!(json, r#"{"class":"numeric","tag":2}"#);
        assert_eq!(
            serde_json::from_str::<TypeDescriptor>(r#"{"class":"fixed_string","size":4}"#).unwrap(),
            TypeDescriptor::FixedString { size: 4 }
        );
    }
}
