//! Blocking download of remote resources into a local folder.
//!
//! Downloads are idempotent: a resource whose file is already present is not fetched again.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;
use url::Url;

use crate::error::Error;

/// Holds the http client that will make the requests.
pub struct Downloader {
    client: reqwest::blocking::Client,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Name of the local file for `url`: the last segment of its path.
    pub fn filename(url: &Url) -> Result<String, Error> {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidArgument(format!("no file name in url {}", url)))
    }

    /// Download `url` into `dir`, unless a file with the same name is already there.
    pub fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf, Error> {
        let url = Url::parse(url)?;
        let dst = dir.join(Self::filename(&url)?);
        self.fetch_to(&url, &dst)
    }

    /// Download `url` to `dst`, unless `dst` already exists.
    ///
    /// The body is written to a temporary file next to `dst` and renamed once complete.
    pub fn fetch_to(&self, url: &Url, dst: &Path) -> Result<PathBuf, Error> {
        if dst.is_file() {
            debug!("{:?} already present, skipping download", dst);
            return Ok(dst.to_path_buf());
        }

        info!("downloading {} to {:?}", url, dst);
        let response = self.client.get(url.clone()).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let dir = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file());
            let mut body = BufReader::new(response);
            std::io::copy(&mut body, &mut out)?;
            out.flush()?;
        }
        tmp.persist(dst)?;
        debug!("downloaded {:?}", dst);

        Ok(dst.to_path_buf())
    }
}

/// Open a possibly gzipped file (by `.gz` extension) for reading.
pub fn open_maybe_gz(path: &Path) -> Result<Box<dyn std::io::BufRead>, Error> {
    let f = File::open(path)?;
    if path.extension().map_or(false, |ext| ext == "gz") {
        let gz = flate2::read::MultiGzDecoder::new(BufReader::new(f));
        Ok(Box::new(BufReader::new(gz)))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::{write::GzEncoder, Compression};

    use super::*;

    #[test]
    fn filename_from_url() {
        let url = Url::parse("http://nlp.stanford.edu/data/glove.6B.zip").unwrap();
        assert_eq!(Downloader::filename(&url).unwrap(), "glove.6B.zip");

        let url = Url::parse("http://example.com/").unwrap();
        assert!(Downloader::filename(&url).is_err());
    }

    #[test]
    fn present_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("glove.txt");
        std::fs::write(&existing, "cached").unwrap();

        // nothing listens there: any network access would fail
        let path = Downloader::new()
            .fetch("http://127.0.0.1:9/data/glove.txt", dir.path())
            .unwrap();
        assert_eq!(path, existing);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "cached");
    }

    #[test]
    fn downloads_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/data/glove.txt")
            .with_status(200)
            .with_body("the 1 2\n")
            .create();
        let dir = tempfile::tempdir().unwrap();

        let url = format!("{}/data/glove.txt", server.url());
        let path = Downloader::new().fetch(&url, dir.path()).unwrap();
        mock.assert();
        assert_eq!(path, dir.path().join("glove.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "the 1 2\n");
    }

    #[test]
    fn error_status_leaves_no_file() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/data/missing.txt")
            .with_status(404)
            .create();
        let dir = tempfile::tempdir().unwrap();

        let url = format!("{}/data/missing.txt", server.url());
        let res = Downloader::new().fetch(&url, dir.path());
        mock.assert();
        assert!(matches!(res, Err(Error::Http { status: 404, .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Downloader::new().fetch("not a url", dir.path()),
            Err(Error::Url(_))
        ));
    }

    #[test]
    fn reads_gzip_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.txt");
        std::fs::write(&plain, "hello").unwrap();

        let gz = dir.path().join("a.txt.gz");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(b"hello").unwrap();
        enc.finish().unwrap();

        for path in [plain, gz] {
            let mut s = String::new();
            open_maybe_gz(&path).unwrap().read_to_string(&mut s).unwrap();
            assert_eq!(s, "hello");
        }
    }
}
