//! In-memory block of consecutive array rows.
use ndarray::{ArrayD, IxDyn};

use super::{DType, Element};
use crate::error::Error;

/// Owned, row-major rows of one array.
///
/// Axis 0 indexes rows. A batch read from a container always has the
/// trailing dimensions of the array it was read from.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    U8(ArrayD<u8>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Str(ArrayD<String>),
}

/// Run `$body` with `$a` bound to the inner array, whatever its element type.
macro_rules! with_array {
    ($batch:expr, $a:ident => $body:expr) => {
        match $batch {
            Batch::U8($a) => $body,
            Batch::I32($a) => $body,
            Batch::I64($a) => $body,
            Batch::F32($a) => $body,
            Batch::F64($a) => $body,
            Batch::Str($a) => $body,
        }
    };
}

impl Batch {
    /// Batch filled with the default value of `dtype` (zero or empty text).
    pub fn zeros(dtype: DType, shape: &[usize]) -> Batch {
        let shape = IxDyn(shape);
        match dtype {
            DType::U8 => Batch::U8(ArrayD::default(shape)),
            DType::I32 => Batch::I32(ArrayD::default(shape)),
            DType::I64 => Batch::I64(ArrayD::default(shape)),
            DType::F32 => Batch::F32(ArrayD::default(shape)),
            DType::F64 => Batch::F64(ArrayD::default(shape)),
            DType::Str => Batch::Str(ArrayD::default(shape)),
        }
    }

    /// Build a batch from a flat row-major buffer.
    pub fn from_vec<T: Element>(shape: &[usize], values: Vec<T>) -> Result<Batch, Error> {
        Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(shape), values)?))
    }

    pub fn dtype(&self) -> DType {
        match self {
            Batch::U8(_) => DType::U8,
            Batch::I32(_) => DType::I32,
            Batch::I64(_) => DType::I64,
            Batch::F32(_) => DType::F32,
            Batch::F64(_) => DType::F64,
            Batch::Str(_) => DType::Str,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of rows (extent of axis 0).
    pub fn rows(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Borrow the inner array if it holds `T`.
    pub fn array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::as_array(self)
    }

    /// Take the inner array, failing if the element type is not `T`.
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>, Error> {
        T::into_array(self).map_err(|other| Error::DTypeMismatch {
            expected: T::DTYPE,
            actual: other.dtype(),
        })
    }
}

impl<T: Element> From<ArrayD<T>> for Batch {
    fn from(array: ArrayD<T>) -> Batch {
        T::wrap(array)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayD;

    use super::*;

    #[test]
    fn zeros_shape_and_dtype() {
        let b = Batch::zeros(DType::F32, &[3, 2]);
        assert_eq!(b.dtype(), DType::F32);
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.rows(), 3);
        assert!(b.array::<f32>().unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn text_defaults_to_empty() {
        let b = Batch::zeros(DType::Str, &[2]);
        assert!(b.array::<String>().unwrap().iter().all(String::is_empty));
    }

    #[test]
    fn into_array_checks_dtype() {
        let b = Batch::from_vec(&[2], vec![1i64, 2]).unwrap();
        assert!(matches!(
            b.clone().into_array::<f64>(),
            Err(Error::DTypeMismatch {
                expected: DType::F64,
                actual: DType::I64
            })
        ));
        let a = b.into_array::<i64>().unwrap();
        assert_eq!(a.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn from_vec_rejects_bad_shape() {
        assert!(matches!(
            Batch::from_vec(&[3], vec![1u8, 2]),
            Err(Error::Shape(_))
        ));
    }

    #[test]
    fn from_ndarray() {
        let b: Batch = ArrayD::<i32>::zeros(IxDyn(&[0, 4])).into();
        assert!(b.is_empty());
        assert_eq!(b.shape(), &[0, 4]);
    }
}
