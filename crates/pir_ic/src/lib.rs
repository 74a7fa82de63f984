//! Incremental compilation cache for persistent IR.
//!
//! This crate turns the declarations of a [`pir_tree::Session`] into
//! per-library IC data, stores it next to a validity record, and later
//! materializes exactly the cached declarations a new session reaches.
//!
//! - [`serializer`] and [`deserializer`] convert between sessions and
//!   [`SerializedIcData`], through an [`IrCodec`].
//! - [`validity`] binds cache directories to libraries and checks that a
//!   build's caches match its dependencies.
//! - [`store`] and [`order`] build each library's IC data once per process,
//!   in dependency order.

#![warn(missing_docs)]

pub mod cache_info;
pub mod codec;
pub mod config;
pub mod deserializer;
pub mod error;
pub mod hasher;
pub mod layout;
pub mod order;
pub mod serializer;
pub mod store;
pub mod validity;
pub mod wire;

pub use cache_info::CacheInfo;
pub use codec::{BincodeCodec, CodecOptions, DecodedSkeleton, IrCodec};
pub use config::{load_config, load_config_from_str, ConfigError, IcConfig};
pub use deserializer::{
    IcDeserializer, InjectReport, Linker, NoOriginals, OriginalDeclaration, QueueOrder,
};
pub use error::IcError;
pub use hasher::{FingerprintMode, LibraryHasher};
pub use layout::{read_ic_data, write_ic_data};
pub use order::{prepare_ic_caches, LibraryGraph};
pub use serializer::IcSerializer;
pub use store::IcCacheStore;
pub use validity::{
    absolute_library_path, build_cache, check_caches, check_caches_with, load_caches,
    BuildOutcome, CacheBuilder,
};
pub use wire::{
    SerializedIcData, SerializedIcDataForFile, SerializedMapping, Skeleton, WireCarrier,
    WireHistory,
};
