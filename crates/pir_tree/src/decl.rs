//! Declarations, their structural (immutable) fields, and source files.
//!
//! A declaration's mutable state lives in its carriers (see
//! [`carrier`](crate::carrier)); what is stored here never changes after
//! creation, except for `removed_on`.

use crate::ids::{DeclId, FileId};
use crate::signature::Signature;
use crate::stage::Stage;
use pir_common::Ident;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of declaration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeclKind {
    /// A function or property accessor.
    Function,
    /// A property.
    Property,
    /// A class, interface or object.
    Class,
    /// A backing or synthetic field.
    Field,
    /// A constructor.
    Constructor,
    /// A type parameter.
    TypeParameter,
    /// A value parameter.
    ValueParameter,
    /// A type alias.
    TypeAlias,
    /// An enum entry.
    EnumEntry,
    /// An anonymous initializer block of a class.
    AnonymousInitializer,
    /// A delegated local variable.
    LocalDelegatedProperty,
    /// Placeholder for a declaration that failed to resolve.
    Error,
}

impl DeclKind {
    /// Every kind, in tag order.
    pub const ALL: [DeclKind; 12] = [
        DeclKind::Function,
        DeclKind::Property,
        DeclKind::Class,
        DeclKind::Field,
        DeclKind::Constructor,
        DeclKind::TypeParameter,
        DeclKind::ValueParameter,
        DeclKind::TypeAlias,
        DeclKind::EnumEntry,
        DeclKind::AnonymousInitializer,
        DeclKind::LocalDelegatedProperty,
        DeclKind::Error,
    ];

    /// The stable one-byte tag written to cache payloads.
    pub fn tag(self) -> u8 {
        match self {
            DeclKind::Function => 0,
            DeclKind::Property => 1,
            DeclKind::Class => 2,
            DeclKind::Field => 3,
            DeclKind::Constructor => 4,
            DeclKind::TypeParameter => 5,
            DeclKind::ValueParameter => 6,
            DeclKind::TypeAlias => 7,
            DeclKind::EnumEntry => 8,
            DeclKind::AnonymousInitializer => 9,
            DeclKind::LocalDelegatedProperty => 10,
            DeclKind::Error => 11,
        }
    }

    /// Inverse of [`tag`](Self::tag). Returns `None` for tags written by an
    /// incompatible producer.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Short keyword used when mangling disambiguators.
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Function => "fun",
            DeclKind::Property => "val",
            DeclKind::Class => "class",
            DeclKind::Field => "field",
            DeclKind::Constructor => "init",
            DeclKind::TypeParameter => "tparam",
            DeclKind::ValueParameter => "param",
            DeclKind::TypeAlias => "typealias",
            DeclKind::EnumEntry => "entry",
            DeclKind::AnonymousInitializer => "anon-init",
            DeclKind::LocalDelegatedProperty => "local-delegate",
            DeclKind::Error => "error",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Where a declaration came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Written in source.
    Defined,
    /// An inherited member materialized in a subclass.
    FakeOverride,
    /// Produced by the named lowering.
    Synthetic(String),
}

/// Declared visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    /// Visible everywhere.
    Public,
    /// Visible in subclasses.
    Protected,
    /// Visible in the same module.
    Internal,
    /// Visible in the containing declaration or file.
    Private,
    /// Visible in the containing body only.
    Local,
}

/// Declared modality of a class or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    /// Cannot be overridden or subclassed.
    Final,
    /// Can be overridden or subclassed.
    Open,
    /// Must be overridden or subclassed.
    Abstract,
    /// Subclasses are known and closed.
    Sealed,
}

/// Flags the serializer consults to filter skeletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeclFlags {
    /// Exported to the target platform.
    pub exported: bool,
    /// An `expect` declaration awaiting its `actual`.
    pub expect: bool,
}

/// A bound declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// The kind. Its carriers always carry data of the same kind.
    pub kind: DeclKind,
    /// Simple name; empty for anonymous declarations.
    pub name: Ident,
    /// The file that owns this declaration.
    pub file: FileId,
    /// Stage at which the declaration was created.
    pub created_on: Stage,
    /// Stage at which the declaration was removed, if any.
    pub removed_on: Option<Stage>,
    /// Identity assigned by the producer, used instead of mangling.
    pub signature: Option<Signature>,
    /// Serializer filter flags.
    pub flags: DeclFlags,
    /// Whether every carrier change is kept as a separate snapshot. When
    /// false, carriers are mutated in place and only one snapshot exists.
    pub persistent: bool,
}

impl Declaration {
    /// Creates a persistent declaration with default flags.
    pub fn new(kind: DeclKind, name: Ident, file: FileId, created_on: Stage) -> Self {
        Self {
            kind,
            name,
            file,
            created_on,
            removed_on: None,
            signature: None,
            flags: DeclFlags::default(),
            persistent: true,
        }
    }

    /// Whether the declaration exists at `stage`: created at or before it and
    /// not removed at or before it.
    pub fn is_alive_at(&self, stage: Stage) -> bool {
        self.created_on <= stage && self.removed_on.map_or(true, |r| stage < r)
    }

    /// Whether the declaration was created after the cache baseline and so
    /// needs a skeleton in the IC data.
    pub fn is_new(&self, baseline: Stage) -> bool {
        self.created_on > baseline
    }
}

/// A slot of the declaration arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclSlot {
    /// A symbol referenced by signature whose declaration has not been
    /// materialized in this session.
    Unbound(Signature),
    /// A materialized declaration.
    Bound(Declaration),
}

impl DeclSlot {
    /// Returns the declaration if bound.
    pub fn as_bound(&self) -> Option<&Declaration> {
        match self {
            DeclSlot::Bound(d) => Some(d),
            DeclSlot::Unbound(_) => None,
        }
    }

    /// Returns the declaration mutably if bound.
    pub fn as_bound_mut(&mut self) -> Option<&mut Declaration> {
        match self {
            DeclSlot::Bound(d) => Some(d),
            DeclSlot::Unbound(_) => None,
        }
    }

    /// Whether the slot holds a declaration.
    pub fn is_bound(&self) -> bool {
        matches!(self, DeclSlot::Bound(_))
    }
}

/// A source file of the module being compiled or loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrFile {
    /// Module-relative path; unique within a library.
    pub path: String,
    /// Package of the file's top-level declarations.
    pub package: String,
    /// Top-level declarations in file order.
    pub declarations: Vec<DeclId>,
}

impl IrFile {
    /// Creates an empty file.
    pub fn new(path: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            package: package.into(),
            declarations: Vec::new(),
        }
    }
}
