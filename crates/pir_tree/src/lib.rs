//! The persistent IR declaration graph.
//!
//! Declarations are addressed by dense [`DeclId`]s within a [`Session`] and by
//! [`Signature`]s across sessions. Their mutable state is kept as a history
//! of [`Carrier`] snapshots, one per stage at which a lowering touched it, so
//! that any earlier state of the IR can still be read and persisted.

#![warn(missing_docs)]

pub mod arena;
pub mod body;
pub mod carrier;
pub mod const_value;
pub mod decl;
pub mod error;
pub mod expr;
pub mod graph;
pub mod ids;
pub mod mapping;
pub mod session;
pub mod signature;
pub mod stage;
pub mod stmt;
pub mod store;
pub mod types;

pub use body::{Body, LocalId};
pub use carrier::{
    AnonymousInitializerData, Annotation, Carrier, CarrierData, CarrierHeader, ClassData,
    ClassKind, ConstructorData, EnumEntryData, FieldData, FunctionData,
    LocalDelegatedPropertyData, PropertyData, TypeAliasData, TypeParameterData,
    ValueParameterData,
};
pub use const_value::ConstValue;
pub use decl::{DeclFlags, DeclKind, DeclSlot, Declaration, IrFile, Modality, Origin, Visibility};
pub use error::{CarrierError, SignatureError};
pub use expr::{Expr, TypeOperator};
pub use ids::{DeclId, FileId, SnapshotId};
pub use mapping::{MappingKey, MappingStore};
pub use session::Session;
pub use signature::{DefaultMangler, MangleRequest, Mangler, Signature, SignatureTable};
pub use stage::{LoweringHook, Stage, StageController};
pub use stmt::Stmt;
pub use types::{BuiltinType, IrType};
