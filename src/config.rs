use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{ConfigError, StoreError},
    persistence::JsonFileStore,
};

pub const DEFAULT_DATA_DIR: &str = "library.state";
pub const DEFAULT_SNAPSHOT_FILE: &str = "library.json";

/// Where the library keeps its state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Directory holding the snapshot
    pub data_dir: PathBuf,
    /// File name of the snapshot inside `data_dir`
    pub snapshot_file: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_DATA_DIR))
    }
}

impl LibraryConfig {
    /// Configuration rooted at `data_dir` with the default snapshot file name
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
        }
    }

    /// Read a TOML configuration file. Missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` if the file cannot be read and
    /// `ConfigError::Parse` if it is not valid configuration.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    /// Create the data directory if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir)
                .map_err(|e| StoreError::io(&self.data_dir, e))?;
        }
        Ok(())
    }

    /// JSON store backed by this configuration's snapshot path
    #[must_use]
    pub fn file_store(&self) -> JsonFileStore {
        JsonFileStore::new(self.snapshot_path())
    }
}
