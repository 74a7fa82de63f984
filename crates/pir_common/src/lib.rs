//! Shared foundational types for the persistent IR toolchain.
//!
//! This crate provides interned identifiers and the content hashing used for
//! cache fingerprints, artifact checksums and signature disambiguators.

#![warn(missing_docs)]

pub mod hash;
pub mod ident;

pub use hash::{stable_hash64, ContentHash, ContentHasher};
pub use ident::{Ident, Interner};
