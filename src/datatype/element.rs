use std::borrow::Cow;

use thiserror::Error;

use super::{resolve_type, ScalarKind, TypeDescriptor, UnsupportedTypeError};

/// Bytes that cannot be decoded into elements of a given kind.
#[derive(Debug, Error)]
#[error("{len} bytes cannot be decoded as {kind:?} elements")]
pub struct InvalidElementBytesError {
    kind: ScalarKind,
    len: usize,
}

/// A trait representing a fixed-size dataset or attribute element type.
///
/// Elements are stored in native byte order.
pub trait Element: Copy + Send + Sync + 'static {
    /// The scalar kind of the element.
    const KIND: ScalarKind;

    /// Convert a slice of elements into bytes.
    fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]>;

    /// Convert bytes into elements.
    ///
    /// # Errors
    /// Returns [`InvalidElementBytesError`] if the length of `bytes` is not a multiple of the element size or the bytes are not valid for the element type.
    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, InvalidElementBytesError>;

    /// Returns the type descriptor of the element.
    ///
    /// # Errors
    /// Returns [`UnsupportedTypeError`] if the kind of the element has no storage type tag on this platform.
    fn type_descriptor() -> Result<TypeDescriptor, UnsupportedTypeError> {
        let tag = resolve_type(Self::KIND)?;
        TypeDescriptor::from_tag(tag).ok_or(UnsupportedTypeError(Self::KIND))
    }
}

macro_rules! impl_element_pod {
    ($type:ty, $kind:ident) => {
        impl Element for $type {
            const KIND: ScalarKind = ScalarKind::$kind {
                width_bytes: std::mem::size_of::<$type>(),
            };

            fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]> {
                Cow::Borrowed(bytemuck::cast_slice(elements))
            }

            fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, InvalidElementBytesError> {
                if bytes.len() % std::mem::size_of::<$type>() == 0 {
                    Ok(bytemuck::pod_collect_to_vec(bytes))
                } else {
                    Err(InvalidElementBytesError {
                        kind: Self::KIND,
                        len: bytes.len(),
                    })
                }
            }
        }
    };
}

impl_element_pod!(i8, SignedInteger);
impl_element_pod!(i16, SignedInteger);
impl_element_pod!(i32, SignedInteger);
impl_element_pod!(i64, SignedInteger);
impl_element_pod!(isize, SignedInteger);
impl_element_pod!(u8, UnsignedInteger);
impl_element_pod!(u16, UnsignedInteger);
impl_element_pod!(u32, UnsignedInteger);
impl_element_pod!(u64, UnsignedInteger);
impl_element_pod!(usize, UnsignedInteger);
impl_element_pod!(f32, Float);
impl_element_pod!(f64, Float);

impl Element for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn to_bytes(elements: &[Self]) -> Cow<'_, [u8]> {
        Cow::Owned(elements.iter().map(|&element| u8::from(element)).collect())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Vec<Self>, InvalidElementBytesError> {
        bytes
            .iter()
            .map(|&byte| match byte {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(InvalidElementBytesError {
                    kind: Self::KIND,
                    len: bytes.len(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::StorageTypeTag;

    #[test]
    fn native_width_resolution() {
        let isize_tag = resolve_type(isize::KIND).unwrap();
        let usize_tag = resolve_type(usize::KIND).unwrap();
        match std::mem::size_of::<isize>() {
            4 => {
                assert_eq!(isize_tag, resolve_type(i32::KIND).unwrap());
                assert_eq!(usize_tag, StorageTypeTag::UInt32);
            }
            8 => {
                assert_eq!(isize_tag, resolve_type(i64::KIND).unwrap());
                assert_eq!(usize_tag, StorageTypeTag::UInt64);
            }
            _ => {}
        }
        assert_eq!(
            resolve_type(std::ffi::c_int::KIND).unwrap(),
            resolve_type(i32::KIND).unwrap()
        );
    }

    #[test]
    fn element_tags() {
        assert_eq!(resolve_type(i8::KIND).unwrap(), StorageTypeTag::Int8);
        assert_eq!(resolve_type(u16::KIND).unwrap(), StorageTypeTag::UInt16);
        assert_eq!(resolve_type(f32::KIND).unwrap(), StorageTypeTag::Float32);
        assert_eq!(resolve_type(f64::KIND).unwrap(), StorageTypeTag::Float64);
        assert_eq!(resolve_type(bool::KIND).unwrap(), StorageTypeTag::UInt8);
        assert_eq!(
            i64::type_descriptor().unwrap(),
            TypeDescriptor::Numeric {
                tag: StorageTypeTag::Int64
            }
        );
    }

    #[test]
    fn element_bytes() {
        let elements = [1u16, 2, 3];
        let bytes = u16::to_bytes(&elements);
        assert_eq!(bytes.len(), 6);
        assert_eq!(u16::from_bytes(&bytes).unwrap(), elements);
        assert!(u16::from_bytes(&bytes[1..]).is_err());
    }

    #[test]
    fn element_bytes_bool() {
        let bytes = bool::to_bytes(&[true, false, true]);
        assert_eq!(bytes.as_ref(), &[1, 0, 1]);
        assert_eq!(bool::from_bytes(&bytes).unwrap(), vec![true, false, true]);
        assert!(bool::from_bytes(&[0, 2]).is_err());
    }
}
