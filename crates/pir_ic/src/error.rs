//! Error types for IC cache operations.

use pir_tree::{CarrierError, DeclKind, Signature, SignatureError};
use std::path::PathBuf;

/// Errors that can occur while writing, validating or loading IC caches.
///
/// Every variant is fatal at its detection point: a build that hits one must
/// abort rather than continue against an inconsistent cache set.
#[derive(Debug, thiserror::Error)]
pub enum IcError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// The IC data file has an invalid or missing header.
    #[error("invalid IC data header in {path}: {reason}")]
    InvalidHeader {
        /// The data file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The data file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The IC data format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The data file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The actual format version found in the file.
        actual: u32,
    },

    /// A cache directory belongs to a library that is not a dependency.
    #[error("stale cache {cache_dir}: library {library} is not a dependency of this build")]
    StaleCache {
        /// The orphaned cache directory.
        cache_dir: PathBuf,
        /// The library it was built for.
        library: PathBuf,
    },

    /// A dependency has no cache directory.
    #[error("missing cache for library {library}")]
    MissingCache {
        /// The uncovered library.
        library: PathBuf,
    },

    /// A cache directory has no validity record.
    #[error("cache directory {cache_dir} has no info record")]
    MissingCacheInfo {
        /// The cache directory.
        cache_dir: PathBuf,
    },

    /// A cache directory's validity record cannot be parsed.
    #[error("corrupt info record in {cache_dir}: {reason}")]
    CorruptCacheInfo {
        /// The cache directory.
        cache_dir: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A library's content no longer matches the fingerprint its cache was built from.
    #[error("cache {cache_dir} is outdated: library {library} changed since it was built")]
    OutdatedCache {
        /// The cache directory.
        cache_dir: PathBuf,
        /// The library it was built for.
        library: PathBuf,
    },

    /// The deserializer needs a declaration the IC data cannot provide.
    #[error("unresolved signature {signature}: cache does not match the sources being compiled")]
    UnresolvedSignature {
        /// The missing declaration.
        signature: Signature,
    },

    /// A carrier was written with a kind tag this build does not know.
    #[error("unknown carrier kind tag {tag} for {signature}")]
    UnknownCarrierKind {
        /// The declaration the carrier belongs to.
        signature: Signature,
        /// The unrecognized tag.
        tag: u8,
    },

    /// A carrier's kind disagrees with its tag or its declaration's kind.
    #[error("{signature} is a {expected} but carries {actual} data")]
    CarrierKindMismatch {
        /// The declaration.
        signature: Signature,
        /// The kind the declaration has.
        expected: DeclKind,
        /// The kind of the carrier payload.
        actual: DeclKind,
    },

    /// A cached carrier history is not in strictly increasing stage order.
    #[error("carrier history of {signature} is not ordered by stage")]
    UnorderedHistory {
        /// The declaration.
        signature: Signature,
    },

    /// A declaration's parent lives in a different file than the declaration.
    #[error("{signature} is in {file} but its parent is in {parent_file}")]
    MovedAcrossFiles {
        /// The declaration.
        signature: Signature,
        /// Its owning file.
        file: String,
        /// The parent's owning file.
        parent_file: String,
    },

    /// The library dependency graph has a cycle.
    #[error("dependency cycle through library {library}")]
    DependencyCycle {
        /// A library on the cycle.
        library: PathBuf,
    },

    /// A signature could not be computed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// A carrier could not be read or written.
    #[error(transparent)]
    Carrier(#[from] CarrierError),
}

impl IcError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IcError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(reason: impl ToString) -> Self {
        IcError::Serialization {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = IcError::io(
            "/tmp/cache/info",
            std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("info"));
    }

    #[test]
    fn stale_cache_names_library() {
        let err = IcError::StaleCache {
            cache_dir: PathBuf::from("/cache/C"),
            library: PathBuf::from("/libs/C"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/cache/C"));
        assert!(msg.contains("/libs/C"));
    }

    #[test]
    fn missing_cache_names_library() {
        let err = IcError::MissingCache {
            library: PathBuf::from("/libs/B"),
        };
        assert_eq!(err.to_string(), "missing cache for library /libs/B");
    }

    #[test]
    fn unresolved_signature_names_signature() {
        let err = IcError::UnresolvedSignature {
            signature: Signature::top_level("lib", "f"),
        };
        assert!(err.to_string().contains("lib/f"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = IcError::VersionMismatch {
            path: PathBuf::from("ic.bin"),
            expected: 2,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 1"));
    }

    #[test]
    fn carrier_error_converts() {
        let err: IcError = CarrierError::NotBound {
            decl: pir_tree::DeclId::from_raw(1),
        }
        .into();
        assert!(matches!(err, IcError::Carrier(_)));
    }
}
