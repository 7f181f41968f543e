//! Error enum
use std::fmt;
use std::ops::Range;

use crate::store::DType;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// Path does not follow `<container>.sets/<array>`.
    InvalidPath(String),
    /// Source container or array is absent.
    MissingInput(String),
    /// Cache entry or config could not be (de)serialized.
    Serialization(serde_json::Error),
    /// Container header or index is unreadable.
    Corrupt(String),
    /// Raised by a stage while mapping a batch.
    Transform(String),
    Network(reqwest::Error),
    Http {
        url: String,
        status: u16,
    },
    Url(url::ParseError),
    Shape(ndarray::ShapeError),
    RowCountMismatch {
        expected: usize,
        actual: usize,
    },
    DTypeMismatch {
        expected: DType,
        actual: DType,
    },
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    OutOfBounds {
        rows: Range<usize>,
        len: usize,
    },
    InvalidArgument(String),
    Custom(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::InvalidPath(p) => write!(f, "invalid array path: {}", p),
            Error::MissingInput(msg) => write!(f, "missing input: {}", msg),
            Error::Serialization(e) => write!(f, "serialization error: {}", e),
            Error::Corrupt(msg) => write!(f, "corrupt container: {}", msg),
            Error::Transform(msg) => write!(f, "transform failed: {}", msg),
            Error::Network(e) => write!(f, "network error: {}", e),
            Error::Http { url, status } => write!(f, "GET {} returned status {}", url, status),
            Error::Url(e) => write!(f, "invalid url: {}", e),
            Error::Shape(e) => write!(f, "shape error: {}", e),
            Error::RowCountMismatch { expected, actual } => write!(
                f,
                "transform returned {} rows for a batch of {} rows",
                actual, expected
            ),
            Error::DTypeMismatch { expected, actual } => {
                write!(f, "dtype mismatch: expected {}, got {}", expected, actual)
            }
            Error::ShapeMismatch { expected, actual } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, actual)
            }
            Error::OutOfBounds { rows, len } => write!(
                f,
                "rows {}..{} out of bounds for array of length {}",
                rows.start, rows.end, len
            ),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Network(e) => Some(e),
            Error::Url(e) => Some(e),
            Error::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serialization(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Error {
        Error::Network(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Error {
        Error::Url(e)
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Error {
        Error::Shape(e)
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Error {
        Error::Io(e.error)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
