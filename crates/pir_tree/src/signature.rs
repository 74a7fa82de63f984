//! Cross-session declaration identity.
//!
//! A [`Signature`] names a declaration independently of the session that
//! allocated its [`DeclId`]. The [`SignatureTable`] is the session's
//! bidirectional map between the two and doubles as its symbol table: a
//! signature that is in the table but not bound to a declaration is an
//! unresolved symbol the deserializer may satisfy.

use crate::decl::DeclKind;
use crate::error::SignatureError;
use crate::ids::DeclId;
use pir_common::stable_hash64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable, session-independent identity of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    /// Package of the top-level ancestor.
    pub package: String,
    /// Dot-separated names from the top-level ancestor down to the declaration.
    pub path: String,
    /// Distinguishes overloads and members of overloads.
    pub disambiguator: Option<u64>,
}

impl Signature {
    /// Signature of a top-level declaration without a disambiguator.
    pub fn top_level(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            path: name.into(),
            disambiguator: None,
        }
    }

    /// Returns the same signature with a disambiguator.
    pub fn with_disambiguator(mut self, disambiguator: u64) -> Self {
        self.disambiguator = Some(disambiguator);
        self
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.path)?;
        if let Some(d) = self.disambiguator {
            write!(f, "#{d:016x}")?;
        }
        Ok(())
    }
}

/// Everything a [`Mangler`] may look at.
#[derive(Debug, Clone, Copy)]
pub struct MangleRequest<'a> {
    /// The declaration being named.
    pub decl: DeclId,
    /// Its kind.
    pub kind: DeclKind,
    /// Its simple name; empty for anonymous declarations.
    pub name: &'a str,
    /// Package of its file.
    pub package: &'a str,
    /// Signature of its parent as of its creation stage, `None` at top level.
    pub parent: Option<&'a Signature>,
    /// Type keys of its value parameters, for functions and constructors.
    pub parameter_keys: &'a [String],
    /// Type key of its extension receiver, for extension functions and
    /// properties.
    pub receiver_key: Option<&'a str>,
}

/// Computes signatures for declarations that were not given one.
pub trait Mangler: Send + Sync {
    /// Computes the signature described by `request`.
    fn mangle(&self, request: &MangleRequest<'_>) -> Result<Signature, SignatureError>;
}

/// Default naming scheme: `parent.path + "." + name`, with a hashed
/// disambiguator for callables and for everything nested in a disambiguated
/// parent. Classes and type aliases share a namespace and need none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMangler;

impl Mangler for DefaultMangler {
    fn mangle(&self, request: &MangleRequest<'_>) -> Result<Signature, SignatureError> {
        if request.name.is_empty() {
            return Err(SignatureError::NotAddressable {
                decl: request.decl,
                reason: format!("anonymous {}", request.kind),
            });
        }
        let (package, path, parent_dis) = match request.parent {
            Some(parent) => (
                parent.package.clone(),
                format!("{}.{}", parent.path, request.name),
                parent.disambiguator,
            ),
            None => (request.package.to_string(), request.name.to_string(), None),
        };

        let type_namespace = matches!(request.kind, DeclKind::Class | DeclKind::TypeAlias);
        let disambiguator = if type_namespace && parent_dis.is_none() {
            None
        } else {
            let mut key = String::from(request.kind.keyword());
            key.push('|');
            if let Some(d) = parent_dis {
                key.push_str(&format!("{d:016x}"));
            }
            key.push('|');
            if let Some(receiver) = request.receiver_key {
                key.push('^');
                key.push_str(receiver);
            }
            key.push('|');
            key.push_str(&request.parameter_keys.join(","));
            Some(stable_hash64(key.as_bytes()))
        };

        Ok(Signature {
            package,
            path,
            disambiguator,
        })
    }
}

/// Bidirectional `DeclId ↔ Signature` map of one session.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    by_decl: HashMap<DeclId, Signature>,
    by_signature: HashMap<Signature, DeclId>,
}

impl SignatureTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `decl` is named `signature`. Re-inserting the same pair is
    /// a no-op; giving a signature to a second declaration is a conflict.
    pub fn insert(&mut self, decl: DeclId, signature: Signature) -> Result<(), SignatureError> {
        if let Some(&existing) = self.by_signature.get(&signature) {
            if existing == decl {
                return Ok(());
            }
            return Err(SignatureError::Conflict {
                signature,
                existing,
                incoming: decl,
            });
        }
        self.by_decl.insert(decl, signature.clone());
        self.by_signature.insert(signature, decl);
        Ok(())
    }

    /// Returns the signature recorded for `decl`.
    pub fn signature(&self, decl: DeclId) -> Option<&Signature> {
        self.by_decl.get(&decl)
    }

    /// Returns the declaration slot named `signature`.
    pub fn decl(&self, signature: &Signature) -> Option<DeclId> {
        self.by_signature.get(signature).copied()
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.by_decl.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_decl.is_empty()
    }

    /// Iterates over all recorded pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &Signature)> + '_ {
        self.by_decl.iter().map(|(d, s)| (*d, s))
    }
}
