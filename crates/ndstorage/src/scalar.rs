//! Runtime-typed single values.
//!
//! [`Scalar`] is how values cross the type-erased storage boundary:
//! `fill`, `append`, `set_item` take one, `get_item` returns one.

use std::fmt;

use num_complex::{Complex32, Complex64};

use crate::dtype::{DType, Element};
use crate::error::Result;

/// A single value of any recognized element kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    ComplexDouble(Complex64),
    ComplexFloat(Complex32),
    Double(f64),
    Float(f32),
    Uint64(u64),
    Int64(i64),
    Uint32(u32),
    Int32(i32),
    Uint16(u16),
    Int16(i16),
    Bool(bool),
}

impl Scalar {
    /// Kind of the wrapped value.
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::ComplexDouble(_) => DType::ComplexDouble,
            Scalar::ComplexFloat(_) => DType::ComplexFloat,
            Scalar::Double(_) => DType::Double,
            Scalar::Float(_) => DType::Float,
            Scalar::Uint64(_) => DType::Uint64,
            Scalar::Int64(_) => DType::Int64,
            Scalar::Uint32(_) => DType::Uint32,
            Scalar::Int32(_) => DType::Int32,
            Scalar::Uint16(_) => DType::Uint16,
            Scalar::Int16(_) => DType::Int16,
            Scalar::Bool(_) => DType::Bool,
        }
    }

    /// Zero value of `dtype` (`false` for bool).
    pub fn zero(dtype: DType) -> Scalar {
        match dtype {
            DType::ComplexDouble => Scalar::ComplexDouble(Complex64::default()),
            DType::ComplexFloat => Scalar::ComplexFloat(Complex32::default()),
            DType::Double => Scalar::Double(0.0),
            DType::Float => Scalar::Float(0.0),
            DType::Uint64 => Scalar::Uint64(0),
            DType::Int64 => Scalar::Int64(0),
            DType::Uint32 => Scalar::Uint32(0),
            DType::Int32 => Scalar::Int32(0),
            DType::Uint16 => Scalar::Uint16(0),
            DType::Int16 => Scalar::Int16(0),
            DType::Bool => Scalar::Bool(false),
        }
    }

    #[inline]
    pub fn is_complex(&self) -> bool {
        self.dtype().is_complex()
    }

    /// Real part. Non-complex values are returned unchanged.
    pub fn real(self) -> Scalar {
        match self {
            Scalar::ComplexDouble(v) => Scalar::Double(v.re),
            Scalar::ComplexFloat(v) => Scalar::Float(v.re),
            other => other,
        }
    }

    /// Imaginary part. Non-complex values yield the zero of their own kind.
    pub fn imag(self) -> Scalar {
        match self {
            Scalar::ComplexDouble(v) => Scalar::Double(v.im),
            Scalar::ComplexFloat(v) => Scalar::Float(v.im),
            other => Scalar::zero(other.dtype()),
        }
    }

    /// Convert to a native element type following the storage cast rules.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndstorage::Scalar;
    ///
    /// assert_eq!(Scalar::Double(3.9).cast::<i32>().unwrap(), 3);
    /// assert!(Scalar::Int32(2).cast::<bool>().unwrap());
    /// ```
    #[inline]
    pub fn cast<T: Element>(self) -> Result<T> {
        T::from_scalar(self)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::ComplexDouble(v) => write!(f, "{v}"),
            Scalar::ComplexFloat(v) => write!(f, "{v}"),
            Scalar::Double(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Uint64(v) => write!(f, "{v}"),
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::Uint32(v) => write!(f, "{v}"),
            Scalar::Int32(v) => write!(f, "{v}"),
            Scalar::Uint16(v) => write!(f, "{v}"),
            Scalar::Int16(v) => write!(f, "{v}"),
            Scalar::Bool(v) => write!(f, "{v}"),
        }
    }
}

macro_rules! impl_from_native {
    ($($t:ty),*) => {$(
        impl From<$t> for Scalar {
            #[inline]
            fn from(value: $t) -> Self {
                value.into_scalar()
            }
        }
    )*};
}

impl_from_native!(Complex64, Complex32, f64, f32, u64, i64, u32, i32, u16, i16, bool);
