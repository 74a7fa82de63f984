//! Library fingerprinting.
//!
//! A cache can be validated by library path alone or, in content mode, by
//! an XXH3-128 fingerprint of the library's bytes. A library is either a
//! single file or a directory, in which case every file below it is hashed
//! together with its relative path, in sorted order.

use std::path::{Path, PathBuf};

use pir_common::{ContentHash, ContentHasher};
use serde::Deserialize;

use crate::error::IcError;

/// How cache validity is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    /// A cache is valid for a library if it records the library's path.
    #[default]
    Path,
    /// The recorded path must match and the library content must be unchanged.
    Content,
}

/// Utility for fingerprinting libraries.
pub struct LibraryHasher;

impl LibraryHasher {
    /// Computes the fingerprint of a library file or directory.
    pub fn fingerprint(library: &Path) -> Result<ContentHash, IcError> {
        let meta = std::fs::metadata(library).map_err(|e| IcError::io(library, e))?;
        if meta.is_file() {
            let content = std::fs::read(library).map_err(|e| IcError::io(library, e))?;
            return Ok(ContentHash::from_bytes(&content));
        }

        let mut files = Vec::new();
        collect_files(library, &mut files)?;
        files.sort();

        let mut hasher = ContentHasher::new();
        for file in &files {
            let relative = file.strip_prefix(library).unwrap_or(file);
            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update(&[0]);
            let content = std::fs::read(file).map_err(|e| IcError::io(file, e))?;
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
        Ok(hasher.finish())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), IcError> {
    let entries = std::fs::read_dir(dir).map_err(|e| IcError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| IcError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| IcError::io(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.klib");
        std::fs::write(&lib, b"version one").unwrap();
        let first = LibraryHasher::fingerprint(&lib).unwrap();
        assert_eq!(first, LibraryHasher::fingerprint(&lib).unwrap());

        std::fs::write(&lib, b"version two").unwrap();
        assert_ne!(first, LibraryHasher::fingerprint(&lib).unwrap());
    }

    #[test]
    fn directory_fingerprint_covers_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(lib.join("ir")).unwrap();
        std::fs::write(lib.join("manifest"), b"m").unwrap();
        std::fs::write(lib.join("ir").join("files.bin"), b"a").unwrap();
        let first = LibraryHasher::fingerprint(&lib).unwrap();

        std::fs::write(lib.join("ir").join("files.bin"), b"b").unwrap();
        assert_ne!(first, LibraryHasher::fingerprint(&lib).unwrap());
    }

    #[test]
    fn renaming_a_file_changes_the_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("a"), b"same").unwrap();
        let first = LibraryHasher::fingerprint(&lib).unwrap();

        std::fs::rename(lib.join("a"), lib.join("b")).unwrap();
        assert_ne!(first, LibraryHasher::fingerprint(&lib).unwrap());
    }

    #[test]
    fn missing_library_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibraryHasher::fingerprint(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, IcError::Io { .. }));
    }
}
