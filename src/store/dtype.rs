//! Element types of stored arrays.
use std::fmt;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use super::Batch;

/// Size of a text slot: `u64` heap offset followed by `u32` byte length.
pub const STR_SLOT_SIZE: usize = 12;

/// Element type of an array.
///
/// Numeric types are fixed-width and stored little-endian.
/// [DType::Str] is variable-length UTF-8 text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I32,
    I64,
    F32,
    F64,
    Str,
}

impl DType {
    /// Size in bytes of a single stored element.
    pub fn element_size(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
            DType::Str => STR_SLOT_SIZE,
        }
    }

    pub fn is_text(self) -> bool {
        self == DType::Str
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::Str => "str",
        };
        write!(f, "{}", name)
    }
}

/// Rust types that can live in a [Batch].
pub trait Element: Clone + Default + 'static {
    const DTYPE: DType;

    fn wrap(array: ArrayD<Self>) -> Batch;
    fn as_array(batch: &Batch) -> Option<&ArrayD<Self>>;
    fn into_array(batch: Batch) -> Result<ArrayD<Self>, Batch>;
}

/// Fixed-width elements with a little-endian byte codec.
pub trait FixedElement: Element + Copy {
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn wrap(array: ArrayD<Self>) -> Batch {
                Batch::$variant(array)
            }

            fn as_array(batch: &Batch) -> Option<&ArrayD<Self>> {
                match batch {
                    Batch::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn into_array(batch: Batch) -> Result<ArrayD<Self>, Batch> {
                match batch {
                    Batch::$variant(a) => Ok(a),
                    other => Err(other),
                }
            }
        }
    };
}

macro_rules! fixed_element {
    ($ty:ty, $variant:ident) => {
        element!($ty, $variant);

        impl FixedElement for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

fixed_element!(u8, U8);
fixed_element!(i32, I32);
fixed_element!(i64, I64);
fixed_element!(f32, F32);
fixed_element!(f64, F64);
element!(String, Str);
