//! The serialized shape of IC data.
//!
//! One [`SerializedIcData`] is produced per library per build. It holds one
//! [`SerializedIcDataForFile`] per source file, ordered by path, and within a
//! file every entry is addressed by declaration [`Signature`]. Skeletons and
//! carriers are opaque bytes produced by the [`IrCodec`](crate::codec::IrCodec).

use pir_tree::{Carrier, DeclFlags, DeclKind, MappingKey, Signature, Stage};
use serde::{Deserialize, Serialize};

/// Everything needed to recreate a declaration created after the cache
/// baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    /// The declaration kind.
    pub kind: DeclKind,
    /// Simple name.
    pub name: String,
    /// Creation stage in the producing session.
    pub created_on: Stage,
    /// Serializer filter flags.
    pub flags: DeclFlags,
    /// Whether carrier history is kept for this declaration.
    pub persistent: bool,
    /// The newest carrier at serialization time. Used as the whole history
    /// when no history was serialized.
    pub state: Carrier<Signature>,
}

/// A codec-encoded carrier together with its kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCarrier {
    /// [`DeclKind::tag`] of the carrier.
    pub tag: u8,
    /// Codec-encoded [`Carrier<Signature>`].
    pub bytes: Vec<u8>,
}

/// The full carrier history of one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHistory {
    /// The declaration.
    pub signature: Signature,
    /// Stage at which it was removed, if any.
    pub removed_on: Option<Stage>,
    /// Carriers, oldest first.
    pub carriers: Vec<WireCarrier>,
}

/// All entries of one mapping key recorded in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMapping {
    /// The mapping key.
    pub key: MappingKey,
    /// `(declaration, value)` pairs.
    pub entries: Vec<(Signature, Signature)>,
}

/// The IC data of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIcDataForFile {
    /// Module-relative file path.
    pub path: String,
    /// Package of the file.
    pub package: String,
    /// Codec-encoded skeletons of new declarations.
    pub skeletons: Vec<(Signature, Vec<u8>)>,
    /// Carrier histories of persistent declarations.
    pub histories: Vec<WireHistory>,
    /// Mapping entries, one group per key.
    pub mappings: Vec<SerializedMapping>,
    /// Top-level declarations of the file in file order.
    pub order: Vec<Signature>,
}

impl SerializedIcDataForFile {
    /// Creates an empty file record.
    pub fn new(path: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: package.into(),
            skeletons: Vec::new(),
            histories: Vec::new(),
            mappings: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Whether the file carries nothing.
    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty()
            && self.histories.is_empty()
            && self.mappings.is_empty()
            && self.order.is_empty()
    }
}

/// The IC data of one library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedIcData {
    /// Per-file data, ordered by path.
    pub files: Vec<SerializedIcDataForFile>,
}

impl SerializedIcData {
    /// Finds the data of a file by path.
    pub fn file(&self, path: &str) -> Option<&SerializedIcDataForFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Number of declarations with a skeleton.
    pub fn skeleton_count(&self) -> usize {
        self.files.iter().map(|f| f.skeletons.len()).sum()
    }

    /// Number of declarations with a carrier history.
    pub fn history_count(&self) -> usize {
        self.files.iter().map(|f| f.histories.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_is_empty() {
        let f = SerializedIcDataForFile::new("a.kt", "app");
        assert!(f.is_empty());
    }

    #[test]
    fn counts_sum_over_files() {
        let mut a = SerializedIcDataForFile::new("a.kt", "app");
        a.skeletons.push((Signature::top_level("app", "f"), vec![1]));
        let mut b = SerializedIcDataForFile::new("b.kt", "app");
        b.skeletons.push((Signature::top_level("app", "g"), vec![2]));
        b.histories.push(WireHistory {
            signature: Signature::top_level("app", "g"),
            removed_on: None,
            carriers: Vec::new(),
        });
        let data = SerializedIcData { files: vec![a, b] };
        assert_eq!(data.skeleton_count(), 2);
        assert_eq!(data.history_count(), 1);
        assert!(data.file("b.kt").is_some());
        assert!(data.file("c.kt").is_none());
    }

    #[test]
    fn serde_json_roundtrip() {
        let mut f = SerializedIcDataForFile::new("a.kt", "app");
        f.mappings.push(SerializedMapping {
            key: MappingKey::ObjectToInstanceField,
            entries: vec![(
                Signature::top_level("app", "O"),
                Signature::top_level("app", "O_instance").with_disambiguator(7),
            )],
        });
        f.order.push(Signature::top_level("app", "O"));
        let data = SerializedIcData { files: vec![f] };
        let json = serde_json::to_string(&data).unwrap();
        let back: SerializedIcData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
