//! On-disk layout of a cache directory.
//!
//! ```text
//! <cache_dir>/
//!   ic.bin   IC data: 4-byte LE header length, bincode header, bincode payload
//!   info     validity record (JSON), written last
//! ```
//!
//! Unlike a build artifact cache, a damaged IC data file is not a cache miss:
//! the validity record already vouched for it, so every header problem is
//! reported as an error.

use std::path::{Path, PathBuf};

use pir_common::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IcError;
use crate::wire::SerializedIcData;

/// Name of the IC data file within a cache directory.
pub const IC_DATA_FILE: &str = "ic.bin";

/// Magic bytes identifying an IC data file.
const IC_MAGIC: [u8; 4] = *b"PIRC";

/// Current IC data format version. Increment on breaking changes to the
/// header, the wire structs or the carrier model.
pub const IC_FORMAT_VERSION: u32 = 1;

/// Header prepended to the IC data payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcDataHeader {
    /// Magic bytes: must be `b"PIRC"`.
    pub magic: [u8; 4],
    /// IC data format version.
    pub format_version: u32,
    /// Whether the payload was written by an IC build.
    pub ic_sourced: bool,
    /// Content hash of the payload.
    pub checksum: ContentHash,
}

/// Path of the IC data file for `cache_dir`.
pub fn ic_data_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(IC_DATA_FILE)
}

/// Writes `data` to `<cache_dir>/ic.bin`, creating the directory if needed.
pub fn write_ic_data(
    cache_dir: &Path,
    data: &SerializedIcData,
    ic_sourced: bool,
) -> Result<PathBuf, IcError> {
    std::fs::create_dir_all(cache_dir).map_err(|e| IcError::io(cache_dir, e))?;
    let path = ic_data_path(cache_dir);

    let payload = bincode::serde::encode_to_vec(data, bincode::config::standard())
        .map_err(IcError::serialization)?;
    let header = IcDataHeader {
        magic: IC_MAGIC,
        format_version: IC_FORMAT_VERSION,
        ic_sourced,
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(IcError::serialization)?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);

    std::fs::write(&path, &output).map_err(|e| IcError::io(&path, e))?;
    debug!(path = %path.display(), bytes = output.len(), files = data.files.len(), "wrote IC data");
    Ok(path)
}

/// Reads and validates `<cache_dir>/ic.bin`.
pub fn read_ic_data(cache_dir: &Path) -> Result<(IcDataHeader, SerializedIcData), IcError> {
    let path = ic_data_path(cache_dir);
    let raw = std::fs::read(&path).map_err(|e| IcError::io(&path, e))?;
    let invalid = |reason: &str| IcError::InvalidHeader {
        path: path.clone(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("file too short for header length"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw
        .get(4..4 + header_len)
        .ok_or_else(|| invalid("file too short for header"))?;

    let (header, _): (IcDataHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?;

    if header.magic != IC_MAGIC {
        return Err(invalid("bad magic bytes"));
    }
    if header.format_version != IC_FORMAT_VERSION {
        return Err(IcError::VersionMismatch {
            path,
            expected: IC_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(IcError::ChecksumMismatch {
            path,
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    let (data, _): (SerializedIcData, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(IcError::serialization)?;
    debug!(path = %path.display(), files = data.files.len(), "read IC data");
    Ok((header, data))
}
