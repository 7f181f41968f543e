//! Step trait.
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::DiskCache;
use crate::config::Config;
use crate::download::Downloader;
use crate::error::Error;

/// Behavior shared by every pipeline stage.
///
/// Each stage gets its own folder, `<config root>/<lower-cased name>`,
/// holding its cache entries and downloaded resources.
pub trait Step {
    /// Stage tag. Used for logging and to name the stage folder.
    fn name(&self) -> &'static str;

    /// Stage folder, created if missing.
    fn directory(&self, config: &Config) -> Result<PathBuf, Error> {
        self.disk_cache(config).directory(self.name())
    }

    fn disk_cache(&self, config: &Config) -> DiskCache {
        DiskCache::new(config.root())
    }

    /// Memoize `compute` in the stage folder.
    ///
    /// `args` are the values the result depends on; the stage itself is never part of the key.
    fn cached<A, R, F>(&self, config: &Config, basename: &str, args: &A, compute: F) -> Result<R, Error>
    where
        Self: Sized,
        A: Serialize + ?Sized,
        R: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<R, Error>,
    {
        self.disk_cache(config)
            .cached_call(self.name(), basename, args, compute)
    }

    /// Download `url` into the stage folder, unless it is already there.
    fn download(&self, config: &Config, url: &str) -> Result<PathBuf, Error> {
        let dir = self.directory(config)?;
        Downloader::new().fetch(url, &dir)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Dummy;
    impl Step for Dummy {
        fn name(&self) -> &'static str {
            "DummyStep"
        }
    }

    #[test]
    fn directory_per_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let d = Dummy.directory(&config).unwrap();
        assert_eq!(d, dir.path().join("dummystep"));
        assert!(d.is_dir());
    }

    #[test]
    fn cached_in_stage_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let calls = Cell::new(0);
        for _ in 0..2 {
            let v: Vec<u32> = Dummy
                .cached(&config, "numbers", &3, || {
                    calls.set(calls.get() + 1);
                    Ok(vec![1, 2, 3])
                })
                .unwrap();
            assert_eq!(v, vec![1, 2, 3]);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(
            Dummy.disk_cache(&config).entries("DummyStep").unwrap().len(),
            1
        );
    }

    #[test]
    fn download_uses_stage_folder() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let stage_dir = Dummy.directory(&config).unwrap();
        std::fs::write(stage_dir.join("words.txt"), "a b").unwrap();

        let path = Dummy
            .download(&config, "http://127.0.0.1:9/words.txt")
            .unwrap();
        assert_eq!(path, stage_dir.join("words.txt"));
    }

    #[test]
    fn failed_download_leaves_stage_folder_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let mut server = mockito::Server::new();
        let _unavailable = server
            .mock("GET", "/words.txt")
            .with_status(503)
            .create();

        let res = Dummy.download(&config, &format!("{}/words.txt", server.url()));
        assert!(matches!(res, Err(Error::Http { status: 503, .. })));
        let stage_dir = Dummy.directory(&config).unwrap();
        assert_eq!(std::fs::read_dir(stage_dir).unwrap().count(), 0);
    }
}
