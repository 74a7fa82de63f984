//! The per-cache validity record.
//!
//! Stored as `info` (JSON) in the cache directory. It names the library the
//! cache belongs to and, when content fingerprinting is enabled, the
//! library's fingerprint at build time. The record is always written after
//! the IC data, so its presence means the directory is complete.

use std::path::{Path, PathBuf};

use pir_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::IcError;

/// Name of the validity record within a cache directory.
pub const INFO_FILE: &str = "info";

/// Validity record of one cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// The cache directory. Refreshed from the actual location on load.
    pub cache_dir: PathBuf,
    /// Absolute path of the library the cache was built for.
    pub library: PathBuf,
    /// Library fingerprint at build time, in content mode.
    #[serde(default)]
    pub fingerprint: Option<ContentHash>,
    /// Whether `ic.bin` was written alongside this record.
    #[serde(default)]
    pub has_ic_data: bool,
}

impl CacheInfo {
    /// Creates a record for `library` cached in `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>, library: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            library: library.into(),
            fingerprint: None,
            has_ic_data: false,
        }
    }

    /// Path of the record file for `cache_dir`.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(INFO_FILE)
    }

    /// Loads the record of `cache_dir`.
    ///
    /// A missing record and an unparsable one are distinct errors; neither
    /// is treated as an empty cache.
    pub fn load(cache_dir: &Path) -> Result<Self, IcError> {
        let path = Self::path(cache_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IcError::MissingCacheInfo {
                    cache_dir: cache_dir.to_path_buf(),
                })
            }
            Err(e) => return Err(IcError::io(path, e)),
        };
        let mut info: CacheInfo =
            serde_json::from_str(&content).map_err(|e| IcError::CorruptCacheInfo {
                cache_dir: cache_dir.to_path_buf(),
                reason: e.to_string(),
            })?;
        info.cache_dir = cache_dir.to_path_buf();
        Ok(info)
    }

    /// Saves the record into its cache directory, creating it if needed.
    pub fn save(&self) -> Result<(), IcError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| IcError::io(&self.cache_dir, e))?;
        let path = Self::path(&self.cache_dir);
        let content = serde_json::to_string_pretty(self).map_err(IcError::serialization)?;
        std::fs::write(&path, content).map_err(|e| IcError::io(path, e))
    }
}
