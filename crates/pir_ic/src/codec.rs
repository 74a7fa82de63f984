//! Encoding of skeletons and carriers.
//!
//! The serializer and deserializer never touch bytes directly. They hand
//! skeletons and carriers to an [`IrCodec`], which owns the wire encoding and
//! applies the declaration filters in [`CodecOptions`].

use pir_tree::{Carrier, Signature};
use serde::{Deserialize, Serialize};

use crate::error::IcError;
use crate::wire::Skeleton;

/// Filters and markers applied while encoding skeletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecOptions {
    /// Drop skeletons of `expect` declarations.
    pub skip_expects: bool,
    /// Drop skeletons of declarations that are not exported.
    pub skip_non_exported: bool,
    /// Mark encoded skeletons as coming from an IC build.
    pub ic_sourced: bool,
}

impl CodecOptions {
    /// The options used for incremental cache writes.
    pub fn incremental() -> Self {
        Self {
            skip_expects: true,
            skip_non_exported: false,
            ic_sourced: true,
        }
    }

    /// Whether a skeleton passes the filters.
    pub fn keeps(&self, skeleton: &Skeleton) -> bool {
        !(self.skip_expects && skeleton.flags.expect)
            && !(self.skip_non_exported && !skeleton.flags.exported)
    }
}

/// A skeleton read back from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSkeleton {
    /// The skeleton.
    pub skeleton: Skeleton,
    /// Whether it was written by an IC build.
    pub ic_sourced: bool,
}

/// Encodes and decodes the opaque parts of IC data.
pub trait IrCodec: Send + Sync {
    /// Encodes a skeleton, or returns `None` when `options` filter it out.
    fn encode_skeleton(
        &self,
        skeleton: &Skeleton,
        options: &CodecOptions,
    ) -> Result<Option<Vec<u8>>, IcError>;

    /// Decodes a skeleton written by [`IrCodec::encode_skeleton`].
    fn decode_skeleton(&self, bytes: &[u8]) -> Result<DecodedSkeleton, IcError>;

    /// Encodes one carrier.
    fn encode_carrier(&self, carrier: &Carrier<Signature>) -> Result<Vec<u8>, IcError>;

    /// Decodes a carrier written by [`IrCodec::encode_carrier`].
    fn decode_carrier(&self, bytes: &[u8]) -> Result<Carrier<Signature>, IcError>;
}

#[derive(Serialize)]
struct SkeletonOut<'a> {
    ic_sourced: bool,
    skeleton: &'a Skeleton,
}

#[derive(Deserialize)]
struct SkeletonIn {
    ic_sourced: bool,
    skeleton: Skeleton,
}

/// The default codec: bincode with the standard configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, IcError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(IcError::serialization)
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, IcError> {
        let (value, _): (T, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(IcError::serialization)?;
        Ok(value)
    }
}

impl IrCodec for BincodeCodec {
    fn encode_skeleton(
        &self,
        skeleton: &Skeleton,
        options: &CodecOptions,
    ) -> Result<Option<Vec<u8>>, IcError> {
        if !options.keeps(skeleton) {
            return Ok(None);
        }
        Self::encode(&SkeletonOut {
            ic_sourced: options.ic_sourced,
            skeleton,
        })
        .map(Some)
    }

    fn decode_skeleton(&self, bytes: &[u8]) -> Result<DecodedSkeleton, IcError> {
        let SkeletonIn {
            ic_sourced,
            skeleton,
        } = Self::decode(bytes)?;
        Ok(DecodedSkeleton {
            skeleton,
            ic_sourced,
        })
    }

    fn encode_carrier(&self, carrier: &Carrier<Signature>) -> Result<Vec<u8>, IcError> {
        Self::encode(carrier)
    }

    fn decode_carrier(&self, bytes: &[u8]) -> Result<Carrier<Signature>, IcError> {
        Self::decode(bytes)
    }
}
