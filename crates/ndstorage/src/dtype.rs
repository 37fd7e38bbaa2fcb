//! Element kinds and the native types that realize them.
//!
//! Every storage holds exactly one [`DType`]. The numeric ids are stable
//! and are written to disk by the `.cyst` codec, so they must never be
//! renumbered.

use std::fmt::{self, Debug, Display};

use num_complex::{Complex32, Complex64};

use crate::error::{Result, StorageError};
use crate::scalar::Scalar;

/// Recognized element kinds.
///
/// Id `0` is reserved for "no type" and is never a valid storage kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DType {
    ComplexDouble = 1,
    ComplexFloat = 2,
    Double = 3,
    Float = 4,
    Uint64 = 5,
    Int64 = 6,
    Uint32 = 7,
    Int32 = 8,
    Uint16 = 9,
    Int16 = 10,
    Bool = 11,
}

impl DType {
    /// Number of recognized element kinds.
    pub const COUNT: usize = 11;

    /// All recognized kinds in id order.
    pub const ALL: [DType; DType::COUNT] = [
        DType::ComplexDouble,
        DType::ComplexFloat,
        DType::Double,
        DType::Float,
        DType::Uint64,
        DType::Int64,
        DType::Uint32,
        DType::Int32,
        DType::Uint16,
        DType::Int16,
        DType::Bool,
    ];

    /// Look up a kind by its stable id. Returns `None` for unrecognized ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndstorage::DType;
    ///
    /// assert_eq!(DType::from_id(3), Some(DType::Double));
    /// assert_eq!(DType::from_id(0), None);
    /// assert_eq!(DType::from_id(12), None);
    /// ```
    pub fn from_id(id: u32) -> Option<DType> {
        match id {
            1..=11 => Some(DType::ALL[id as usize - 1]),
            _ => None,
        }
    }

    /// Stable numeric id.
    #[inline]
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            DType::ComplexDouble => 16,
            DType::ComplexFloat | DType::Double | DType::Uint64 | DType::Int64 => 8,
            DType::Float | DType::Uint32 | DType::Int32 => 4,
            DType::Uint16 | DType::Int16 => 2,
            DType::Bool => 1,
        }
    }

    /// Short lowercase name, e.g. `"complex128"`.
    pub fn name(self) -> &'static str {
        match self {
            DType::ComplexDouble => "complex128",
            DType::ComplexFloat => "complex64",
            DType::Double => "float64",
            DType::Float => "float32",
            DType::Uint64 => "uint64",
            DType::Int64 => "int64",
            DType::Uint32 => "uint32",
            DType::Int32 => "int32",
            DType::Uint16 => "uint16",
            DType::Int16 => "int16",
            DType::Bool => "bool",
        }
    }

    #[inline]
    pub fn is_complex(self) -> bool {
        matches!(self, DType::ComplexDouble | DType::ComplexFloat)
    }

    #[inline]
    pub fn is_float(self) -> bool {
        matches!(
            self,
            DType::ComplexDouble | DType::ComplexFloat | DType::Double | DType::Float
        )
    }

    /// Kind of the real/imaginary components of a complex kind.
    pub fn component_dtype(self) -> Option<DType> {
        match self {
            DType::ComplexDouble => Some(DType::Double),
            DType::ComplexFloat => Some(DType::Float),
            _ => None,
        }
    }

    /// Whether values of `self` may be converted to `to` by `astype`.
    ///
    /// Complex kinds never narrow implicitly to real kinds.
    pub fn can_cast_to(self, to: DType) -> bool {
        !self.is_complex() || to.is_complex()
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Native element type backing one [`DType`].
///
/// Sealed: the eleven implementations below are the complete set.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + Debug
    + Display
    + bytemuck::NoUninit
    + Send
    + Sync
    + 'static
    + sealed::Sealed
{
    /// The kind this type realizes.
    const DTYPE: DType;

    /// Wrap into a runtime-typed value.
    fn into_scalar(self) -> Scalar;

    /// Convert a value of any kind into this type.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnsupportedCast` for complex → non-complex.
    fn from_scalar(value: Scalar) -> Result<Self>;

    /// Decode native-endian bytes into `dst`. `src.len()` must equal
    /// `dst.len() * DTYPE.size_of()`.
    fn decode_bytes(dst: &mut [Self], src: &[u8]);

    /// View a slice of elements as raw bytes.
    #[inline]
    fn encode_bytes(src: &[Self]) -> &[u8] {
        bytemuck::cast_slice(src)
    }
}

fn narrowing(value: Scalar, to: DType) -> StorageError {
    StorageError::UnsupportedCast {
        from: value.dtype(),
        to,
    }
}

macro_rules! impl_real_element {
    ($($t:ty => $dtype:ident, $variant:ident;)*) => {$(
        impl sealed::Sealed for $t {}

        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn into_scalar(self) -> Scalar {
                Scalar::$variant(self)
            }

            fn from_scalar(value: Scalar) -> Result<Self> {
                Ok(match value {
                    Scalar::ComplexDouble(_) | Scalar::ComplexFloat(_) => {
                        return Err(narrowing(value, Self::DTYPE));
                    }
                    Scalar::Double(v) => v as $t,
                    Scalar::Float(v) => v as $t,
                    Scalar::Uint64(v) => v as $t,
                    Scalar::Int64(v) => v as $t,
                    Scalar::Uint32(v) => v as $t,
                    Scalar::Int32(v) => v as $t,
                    Scalar::Uint16(v) => v as $t,
                    Scalar::Int16(v) => v as $t,
                    Scalar::Bool(v) => u8::from(v) as $t,
                })
            }

            fn decode_bytes(dst: &mut [Self], src: &[u8]) {
                bytemuck::cast_slice_mut::<$t, u8>(dst).copy_from_slice(src);
            }
        }
    )*};
}

impl_real_element! {
    f64 => Double, Double;
    f32 => Float, Float;
    u64 => Uint64, Uint64;
    i64 => Int64, Int64;
    u32 => Uint32, Uint32;
    i32 => Int32, Int32;
    u16 => Uint16, Uint16;
    i16 => Int16, Int16;
}

macro_rules! impl_complex_element {
    ($($t:ty, $f:ty => $dtype:ident;)*) => {$(
        impl sealed::Sealed for $t {}

        impl Element for $t {
            const DTYPE: DType = DType::$dtype;

            #[inline]
            fn into_scalar(self) -> Scalar {
                Scalar::$dtype(self)
            }

            fn from_scalar(value: Scalar) -> Result<Self> {
                Ok(match value {
                    Scalar::ComplexDouble(v) => <$t>::new(v.re as $f, v.im as $f),
                    Scalar::ComplexFloat(v) => <$t>::new(v.re as $f, v.im as $f),
                    Scalar::Double(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Float(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Uint64(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Int64(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Uint32(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Int32(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Uint16(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Int16(v) => <$t>::new(v as $f, 0.0),
                    Scalar::Bool(v) => <$t>::new(u8::from(v) as $f, 0.0),
                })
            }

            fn decode_bytes(dst: &mut [Self], src: &[u8]) {
                bytemuck::cast_slice_mut::<$t, u8>(dst).copy_from_slice(src);
            }
        }
    )*};
}

impl_complex_element! {
    Complex64, f64 => ComplexDouble;
    Complex32, f32 => ComplexFloat;
}

impl sealed::Sealed for bool {}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn from_scalar(value: Scalar) -> Result<Self> {
        Ok(match value {
            Scalar::ComplexDouble(_) | Scalar::ComplexFloat(_) => {
                return Err(narrowing(value, DType::Bool));
            }
            Scalar::Double(v) => v != 0.0,
            Scalar::Float(v) => v != 0.0,
            Scalar::Uint64(v) => v != 0,
            Scalar::Int64(v) => v != 0,
            Scalar::Uint32(v) => v != 0,
            Scalar::Int32(v) => v != 0,
            Scalar::Uint16(v) => v != 0,
            Scalar::Int16(v) => v != 0,
            Scalar::Bool(v) => v,
        })
    }

    // Any nonzero byte is true; the in-memory representation stays 0/1.
    fn decode_bytes(dst: &mut [Self], src: &[u8]) {
        for (d, &b) in dst.iter_mut().zip(src) {
            *d = b != 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_roundtrip() {
        for dtype in DType::ALL {
            assert_eq!(DType::from_id(dtype.id()), Some(dtype));
        }
        assert_eq!(DType::from_id(0), None);
        assert_eq!(DType::from_id(DType::COUNT as u32 + 1), None);
    }

    #[test]
    fn test_size_of_matches_native() {
        assert_eq!(DType::ComplexDouble.size_of(), size_of::<Complex64>());
        assert_eq!(DType::ComplexFloat.size_of(), size_of::<Complex32>());
        assert_eq!(DType::Double.size_of(), size_of::<f64>());
        assert_eq!(DType::Float.size_of(), size_of::<f32>());
        assert_eq!(DType::Int16.size_of(), size_of::<i16>());
        assert_eq!(DType::Bool.size_of(), size_of::<bool>());
    }

    #[test]
    fn test_component_dtype() {
        assert_eq!(DType::ComplexDouble.component_dtype(), Some(DType::Double));
        assert_eq!(DType::ComplexFloat.component_dtype(), Some(DType::Float));
        assert_eq!(DType::Int32.component_dtype(), None);
    }

    #[test]
    fn test_can_cast_to() {
        assert!(DType::Double.can_cast_to(DType::ComplexFloat));
        assert!(DType::ComplexFloat.can_cast_to(DType::ComplexDouble));
        assert!(!DType::ComplexDouble.can_cast_to(DType::Double));
        assert!(!DType::ComplexFloat.can_cast_to(DType::Bool));
    }

    #[test]
    fn test_from_scalar_native_rules() {
        assert_eq!(i32::from_scalar(Scalar::Double(-2.7)).unwrap(), -2);
        assert_eq!(u16::from_scalar(Scalar::Int32(65537)).unwrap(), 1);
        assert_eq!(f32::from_scalar(Scalar::Bool(true)).unwrap(), 1.0);
        assert!(bool::from_scalar(Scalar::Int64(-5)).unwrap());
        assert!(!bool::from_scalar(Scalar::Double(0.0)).unwrap());
        assert_eq!(
            Complex32::from_scalar(Scalar::Int16(3)).unwrap(),
            Complex32::new(3.0, 0.0)
        );
    }

    #[test]
    fn test_from_scalar_rejects_complex_to_real() {
        let value = Scalar::ComplexDouble(Complex64::new(1.0, 1.0));
        assert!(matches!(
            f64::from_scalar(value),
            Err(StorageError::UnsupportedCast { .. })
        ));
        assert!(bool::from_scalar(value).is_err());
    }

    #[test]
    fn test_decode_bool_nonzero() {
        let mut dst = [false; 3];
        bool::decode_bytes(&mut dst, &[0, 7, 1]);
        assert_eq!(dst, [false, true, true]);
    }

    #[test]
    fn test_encode_decode_f64() {
        let src = [1.5f64, -2.0];
        let bytes = f64::encode_bytes(&src).to_vec();
        let mut dst = [0.0f64; 2];
        f64::decode_bytes(&mut dst, &bytes);
        assert_eq!(dst, src);
    }
}
