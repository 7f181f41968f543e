//! Configuration.
//!
//! The only setting is the root folder of stage directories (cache entries and downloads).
//! A [Config] is built once (from a file and/or the command line) and passed explicitly
//! to whatever needs it.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default root folder, relative to the user's home.
pub const DEFAULT_DIRECTORY: &str = "~/.dataset";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DIRECTORY)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: default_directory(),
        }
    }
}

impl Config {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Load a JSON configuration file.
    ///
    /// Missing keys take their default value.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        debug!("reading config from {:?}", path);
        let f = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(f))?;
        Ok(config)
    }

    /// Root folder with a leading `~` expanded.
    pub fn root(&self) -> PathBuf {
        expand_home(&self.directory)
    }
}

/// Replace a leading `~` by the value of `HOME`.
///
/// Paths without a leading `~`, or when `HOME` is unset, are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
