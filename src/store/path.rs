//! Array addressing.
//!
//! An array is addressed by a single string, `<container>.sets/<array>`.
//! Everything up to and including the first `.sets` that is followed by a `/`
//! names the container file, the rest names the array inside it.
//!
//! Containers use their own file format, not HDF5, hence the `.sets` suffix:
//! paths written for HDF5 files (`data.hdf5/array`) are not accepted and must be renamed.
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Error;

/// Literal marking the end of the container part of an array path.
pub const CONTAINER_SUFFIX: &str = ".sets";

lazy_static! {
    static ref ARRAY_PATH: Regex = Regex::new(&format!(
        r"(?s)^(.+?{})/(.+)$",
        regex::escape(CONTAINER_SUFFIX)
    ))
    .expect("array path pattern is valid");
}

/// One named array inside one container file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    pub container: PathBuf,
    pub name: String,
}

impl ArrayRef {
    pub fn new(container: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

impl FromStr for ArrayRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        split(s)
    }
}

impl fmt::Display for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container.display(), self.name)
    }
}

/// Split an array path into its container and array name.
///
/// `/tmp/file.sets/arr` gives (`/tmp/file.sets`, `arr`).
pub fn split(path: &str) -> Result<ArrayRef, Error> {
    let captures = ARRAY_PATH
        .captures(path)
        .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
    Ok(ArrayRef::new(&captures[1], &captures[2]))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn split_absolute() {
        let r = split("/tmp/file.sets/arr").unwrap();
        assert_eq!(r.container, Path::new("/tmp/file.sets"));
        assert_eq!(r.name, "arr");
    }

    #[test]
    fn split_relative_and_nested_name() {
        let r = split("data/corpus.sets/train/words").unwrap();
        assert_eq!(r.container, Path::new("data/corpus.sets"));
        assert_eq!(r.name, "train/words");
    }

    #[test]
    fn first_suffix_wins() {
        let r = split("/a.sets/b.sets/c").unwrap();
        assert_eq!(r.container, Path::new("/a.sets"));
        assert_eq!(r.name, "b.sets/c");
    }

    #[test]
    fn missing_suffix() {
        assert!(matches!(
            split("/tmp/file/arr"),
            Err(Error::InvalidPath(p)) if p == "/tmp/file/arr"
        ));
    }

    #[test]
    fn hdf5_paths_are_rejected() {
        assert!(matches!(
            split("/tmp/file.hdf5/arr"),
            Err(Error::InvalidPath(_))
        ));
        assert!(split(&format!("/tmp/file{}/arr", CONTAINER_SUFFIX)).is_ok());
    }

    #[test]
    fn missing_name() {
        assert!(split("/tmp/file.sets/").is_err());
        assert!(split("/tmp/file.sets").is_err());
    }

    #[test]
    fn suffix_needs_a_stem() {
        assert!(split(".sets/arr").is_err());
    }

    #[test]
    fn display_roundtrip() {
        let r: ArrayRef = "/tmp/x.sets/y".parse().unwrap();
        assert_eq!(r.to_string(), "/tmp/x.sets/y");
    }
}
