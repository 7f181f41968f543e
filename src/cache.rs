/*! Disk cache

Memoizes computations on disk.

An entry is keyed by a stage tag, a basename and the serialized arguments of the call.
The key is hashed (sha256) and the value stored as JSON in `<root>/<stage>/<hash>`,
where `<stage>` is the lower-cased stage tag.
Entries are never invalidated: delete the file to force a recomputation.

Arguments are passed explicitly: only the values that make two calls differ belong there.
!*/
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder of a stage's entries, created if missing.
    pub fn directory(&self, stage: &str) -> Result<PathBuf, Error> {
        let dir = self.root.join(stage.to_lowercase());
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Hex digest identifying a `(stage, basename, args)` combination.
    ///
    /// `args` go through [serde_json::Value] first, whose maps are sorted,
    /// so hash maps with equal contents give equal keys.
    pub fn key<A>(stage: &str, basename: &str, args: &A) -> Result<String, Error>
    where
        A: Serialize + ?Sized,
    {
        let args = serde_json::to_value(args)?;
        let serialized = serde_json::to_vec(&(stage.to_lowercase(), basename, args))?;
        let mut hasher = Sha256::new();
        hasher.update(&serialized);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Return the stored result for these arguments, or compute and store it.
    ///
    /// `compute` is only invoked on a miss. Unreadable entries are an error,
    /// they are never silently recomputed.
    pub fn cached_call<A, R, F>(
        &self,
        stage: &str,
        basename: &str,
        args: &A,
        compute: F,
    ) -> Result<R, Error>
    where
        A: Serialize + ?Sized,
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<R, Error>,
    {
        let key = Self::key(stage, basename, args)?;
        let dir = self.directory(stage)?;
        let path = dir.join(&key);

        if path.is_file() {
            debug!("[{}] cache hit for {} ({})", stage, basename, key);
            let f = File::open(&path)?;
            let value = serde_json::from_reader(BufReader::new(f))?;
            return Ok(value);
        }

        info!("[{}] computing {} ({})", stage, basename, key);
        let value = compute()?;
        Self::store(&dir, &path, &value)?;
        Ok(value)
    }

    /// Write through a temporary file so that a failed write never leaves a partial entry.
    fn store<R: Serialize>(dir: &Path, path: &Path, value: &R) -> Result<(), Error> {
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, value)?;
            writer.flush()?;
        }
        tmp.persist(path)?;
        debug!("stored cache entry {:?}", path);
        Ok(())
    }

    /// Keys stored for a stage, sorted.
    pub fn entries(&self, stage: &str) -> Result<Vec<String>, Error> {
        let dir = self.root.join(stage.to_lowercase());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_file() && is_key(&name) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Cache files are named by a sha256 hex digest.
fn is_key(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn key_is_stable_and_hex() {
        let a = DiskCache::key("Glove", "embeddings-50", &(1, "a")).unwrap();
        let b = DiskCache::key("Glove", "embeddings-50", &(1, "a")).unwrap();
        assert_eq!(a, b);
        assert!(is_key(&a));
    }

    #[test]
    fn key_depends_on_everything() {
        let base = DiskCache::key("stage", "x", &[1]).unwrap();
        assert_ne!(base, DiskCache::key("other", "x", &[1]).unwrap());
        assert_ne!(base, DiskCache::key("stage", "y", &[1]).unwrap());
        assert_ne!(base, DiskCache::key("stage", "x", &[2]).unwrap());
    }

    #[test]
    fn stage_tag_is_case_insensitive() {
        assert_eq!(
            DiskCache::key("Tokenize", "x", &()).unwrap(),
            DiskCache::key("tokenize", "x", &()).unwrap()
        );
    }

    #[test]
    fn directory_is_lowercase_and_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        assert!(!dir.path().join("cache").exists());
        let d = cache.directory("IndexEncode").unwrap();
        assert_eq!(d, dir.path().join("cache/indexencode"));
        assert!(d.is_dir());
    }

    #[test]
    fn only_called_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let called = Cell::new(0);
        let pipeline = || -> Result<String, Error> {
            called.set(called.get() + 1);
            Ok("Foo".to_string())
        };

        assert_eq!(called.get(), 0);
        let v: String = cache.cached_call("step", "foo", &(), pipeline).unwrap();
        assert_eq!(v, "Foo");
        assert_eq!(called.get(), 1);
        let v: String = cache.cached_call("step", "foo", &(), pipeline).unwrap();
        assert_eq!(v, "Foo");
        assert_eq!(called.get(), 1);
    }

    #[test]
    fn compute_error_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let r: Result<u32, Error> = cache.cached_call("step", "foo", &(), || {
            Err(Error::Transform("boom".to_string()))
        });
        assert!(matches!(r, Err(Error::Transform(_))));
        assert!(cache.entries("step").unwrap().is_empty());
    }
}
