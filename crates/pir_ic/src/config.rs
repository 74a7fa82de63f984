//! IC configuration loaded from `pir-ic.toml`.
//!
//! Every section and field is optional; an empty file yields the defaults.
//!
//! ```toml
//! [cache]
//! root = "build/ic"
//! fingerprint = "content"
//!
//! [serialize]
//! skip_expects = true
//! skip_non_exported = false
//!
//! [deserialize]
//! queue_order = "fifo"
//! ```

use std::path::{Path, PathBuf};

use pir_common::stable_hash64;
use serde::Deserialize;

use crate::codec::CodecOptions;
use crate::deserializer::QueueOrder;
use crate::hasher::FingerprintMode;

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "pir-ic.toml";

/// Errors that can occur when loading or validating `pir-ic.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

/// The whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IcConfig {
    /// Cache location and validity.
    pub cache: CacheSection,
    /// Serializer settings.
    pub serialize: SerializeSection,
    /// Deserializer settings.
    pub deserialize: DeserializeSection,
}

/// `[cache]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Directory under which per-library cache directories are placed.
    pub root: Option<PathBuf>,
    /// How cache validity is decided.
    pub fingerprint: FingerprintMode,
}

/// `[serialize]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SerializeSection {
    /// Drop skeletons of `expect` declarations.
    pub skip_expects: bool,
    /// Drop skeletons of declarations that are not exported.
    pub skip_non_exported: bool,
}

impl Default for SerializeSection {
    fn default() -> Self {
        let options = CodecOptions::incremental();
        Self {
            skip_expects: options.skip_expects,
            skip_non_exported: options.skip_non_exported,
        }
    }
}

/// `[deserialize]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeserializeSection {
    /// Order in which pending symbols are resolved.
    pub queue_order: QueueOrder,
}

impl IcConfig {
    /// Codec options for incremental cache writes.
    pub fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            skip_expects: self.serialize.skip_expects,
            skip_non_exported: self.serialize.skip_non_exported,
            ic_sourced: true,
        }
    }

    /// The cache directory for `library` under the configured root.
    ///
    /// The directory name combines the library's file name with a hash of
    /// its full path, so equally named libraries do not collide.
    pub fn cache_dir_for(&self, library: &Path) -> Option<PathBuf> {
        let root = self.cache.root.as_ref()?;
        let name = library
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lib".to_string());
        let hash = stable_hash64(library.to_string_lossy().as_bytes());
        Some(root.join(format!("{name}-{hash:016x}")))
    }
}

/// Loads and validates `pir-ic.toml` from `dir`.
pub fn load_config(dir: &Path) -> Result<IcConfig, ConfigError> {
    let content = std::fs::read_to_string(dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Loads `pir-ic.toml` from `dir`, or the defaults if there is none.
pub fn load_config_or_default(dir: &Path) -> Result<IcConfig, ConfigError> {
    if dir.join(CONFIG_FILE).exists() {
        load_config(dir)
    } else {
        Ok(IcConfig::default())
    }
}

/// Parses and validates a configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<IcConfig, ConfigError> {
    let config: IcConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &IcConfig) -> Result<(), ConfigError> {
    if let Some(root) = &config.cache.root {
        if root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.root must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, IcConfig::default());
        assert_eq!(config.cache.fingerprint, FingerprintMode::Path);
        assert!(config.serialize.skip_expects);
        assert!(!config.serialize.skip_non_exported);
        assert_eq!(config.deserialize.queue_order, QueueOrder::Fifo);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[cache]
root = "build/ic"
fingerprint = "content"

[serialize]
skip_expects = false
skip_non_exported = true

[deserialize]
queue_order = "lifo"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.cache.root, Some(PathBuf::from("build/ic")));
        assert_eq!(config.cache.fingerprint, FingerprintMode::Content);
        assert!(!config.serialize.skip_expects);
        assert!(config.serialize.skip_non_exported);
        assert_eq!(config.deserialize.queue_order, QueueOrder::Lifo);

        let options = config.codec_options();
        assert!(options.skip_non_exported);
        assert!(options.ic_sourced);
    }

    #[test]
    fn config_drives_pipeline_components() {
        use crate::codec::BincodeCodec;
        use crate::deserializer::IcDeserializer;
        use crate::serializer::IcSerializer;
        use crate::validity::CacheBuilder;

        let config = load_config_from_str(
            "[cache]\nfingerprint = \"content\"\n\n[serialize]\nskip_non_exported = true\n\n[deserialize]\nqueue_order = \"lifo\"\n",
        )
        .unwrap();
        let serializer = IcSerializer::from_config(&BincodeCodec, &config);
        assert!(serializer.options().skip_non_exported);
        assert!(serializer.options().skip_expects);
        assert_eq!(IcDeserializer::from_config(&BincodeCodec, &config).order(), QueueOrder::Lifo);
        assert_eq!(CacheBuilder::from_config(&config).mode(), FingerprintMode::Content);

        let defaults = IcConfig::default();
        assert_eq!(CacheBuilder::from_config(&defaults).mode(), FingerprintMode::Path);
        assert_eq!(
            IcDeserializer::from_config(&BincodeCodec, &defaults).order(),
            QueueOrder::Fifo
        );
    }

    #[test]
    fn unknown_fingerprint_mode_is_parse_error() {
        let err = load_config_from_str("[cache]\nfingerprint = \"mtime\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn empty_root_is_rejected() {
        let err = load_config_from_str("[cache]\nroot = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn cache_dir_for_distinguishes_paths() {
        let config = load_config_from_str("[cache]\nroot = \"/ic\"\n").unwrap();
        let a = config.cache_dir_for(Path::new("/one/core.klib")).unwrap();
        let b = config.cache_dir_for(Path::new("/two/core.klib")).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("/ic"));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("core.klib-"));
        assert!(IcConfig::default().cache_dir_for(Path::new("/one/core.klib")).is_none());
    }

    #[test]
    fn load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(ConfigError::IoError(_))));
        assert_eq!(load_config_or_default(dir.path()).unwrap(), IcConfig::default());

        std::fs::write(dir.path().join(CONFIG_FILE), "[deserialize]\nqueue_order = \"lifo\"\n")
            .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.deserialize.queue_order, QueueOrder::Lifo);
    }
}
