//! Per-declaration auxiliary relations recorded by lowerings.
//!
//! A lowering that creates a helper declaration for an existing one (a static
//! copy of a private member, the factory of a secondary constructor, the
//! instance field of an object) records the pair under a [`MappingKey`] so
//! that later lowerings, and later sessions loading the cache, can find it.

use crate::ids::DeclId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The closed set of relations a lowering may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MappingKey {
    /// Inner class → field holding the outer instance.
    OuterThisField,
    /// Inner class constructor → lowered constructor taking the outer instance.
    InnerClassConstructors,
    /// Secondary constructor → function delegating to the primary one.
    SecondaryConstructorToDelegate,
    /// Secondary constructor → factory function.
    SecondaryConstructorToFactory,
    /// Object class → function returning its instance.
    ObjectToGetInstanceFunction,
    /// Object class → field holding its instance.
    ObjectToInstanceField,
    /// Class → synthesized primary constructor.
    ClassToSyntheticPrimaryConstructor,
    /// Private member → static function with the receiver as a parameter.
    PrivateMemberToCorrespondingStatic,
    /// Constructor → its initialization function.
    ConstructorToInitFunction,
    /// Enum entry → function returning its instance.
    EnumEntryToGetInstanceFunction,
    /// Enum entry → field holding its instance.
    EnumEntryToInstanceField,
    /// Enum constructor → constructor taking name and ordinal.
    EnumConstructorToNewConstructor,
    /// Enum class → its first entry, for enum-class-level lowerings.
    EnumClassToCorrespondingEnumEntry,
    /// Enum entry → field of the enum class for that entry.
    EnumEntryToCorrespondingField,
    /// Enum class → function initializing all entry instances.
    EnumClassToInitEntryInstancesFunction,
    /// Function with default arguments → dispatch function filling them in.
    DefaultArgumentsDispatchFunction,
    /// Dispatch function → original function with default arguments.
    DefaultArgumentsOriginalFunction,
    /// Inline class member → static replacement.
    InlineClassMemberToStatic,
}

impl MappingKey {
    /// Every key, in serialization order.
    pub const ALL: [MappingKey; 18] = [
        MappingKey::OuterThisField,
        MappingKey::InnerClassConstructors,
        MappingKey::SecondaryConstructorToDelegate,
        MappingKey::SecondaryConstructorToFactory,
        MappingKey::ObjectToGetInstanceFunction,
        MappingKey::ObjectToInstanceField,
        MappingKey::ClassToSyntheticPrimaryConstructor,
        MappingKey::PrivateMemberToCorrespondingStatic,
        MappingKey::ConstructorToInitFunction,
        MappingKey::EnumEntryToGetInstanceFunction,
        MappingKey::EnumEntryToInstanceField,
        MappingKey::EnumConstructorToNewConstructor,
        MappingKey::EnumClassToCorrespondingEnumEntry,
        MappingKey::EnumEntryToCorrespondingField,
        MappingKey::EnumClassToInitEntryInstancesFunction,
        MappingKey::DefaultArgumentsDispatchFunction,
        MappingKey::DefaultArgumentsOriginalFunction,
        MappingKey::InlineClassMemberToStatic,
    ];
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// All mapping entries of a session.
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    maps: BTreeMap<MappingKey, HashMap<DeclId, DeclId>>,
}

impl MappingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the value recorded for `decl` under `key`.
    pub fn get(&self, key: MappingKey, decl: DeclId) -> Option<DeclId> {
        self.maps.get(&key)?.get(&decl).copied()
    }

    /// Records `value` for `decl` under `key`, returning the previous value.
    pub fn set(&mut self, key: MappingKey, decl: DeclId, value: DeclId) -> Option<DeclId> {
        self.maps.entry(key).or_default().insert(decl, value)
    }

    /// Removes the entry for `decl` under `key`.
    pub fn remove(&mut self, key: MappingKey, decl: DeclId) -> Option<DeclId> {
        self.maps.get_mut(&key)?.remove(&decl)
    }

    /// Returns the value for `decl` under `key`, computing and recording it
    /// with `make` when absent.
    pub fn get_or_insert_with(
        &mut self,
        key: MappingKey,
        decl: DeclId,
        make: impl FnOnce() -> DeclId,
    ) -> DeclId {
        *self.maps.entry(key).or_default().entry(decl).or_insert_with(make)
    }

    /// Every `(key, value)` pair recorded for `decl`, ordered by key.
    pub fn entries_for(&self, decl: DeclId) -> Vec<(MappingKey, DeclId)> {
        self.maps
            .iter()
            .filter_map(|(k, m)| m.get(&decl).map(|v| (*k, *v)))
            .collect()
    }

    /// Total number of entries across all keys.
    pub fn len(&self) -> usize {
        self.maps.values().map(HashMap::len).sum()
    }

    /// Whether no entry has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(n: u32) -> DeclId {
        DeclId::from_raw(n)
    }

    #[test]
    fn set_get_remove() {
        let mut store = MappingStore::new();
        assert_eq!(store.set(MappingKey::ObjectToInstanceField, d(1), d(2)), None);
        assert_eq!(store.get(MappingKey::ObjectToInstanceField, d(1)), Some(d(2)));
        assert_eq!(store.get(MappingKey::ObjectToGetInstanceFunction, d(1)), None);
        assert_eq!(store.remove(MappingKey::ObjectToInstanceField, d(1)), Some(d(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn get_or_insert_with_computes_once() {
        let mut store = MappingStore::new();
        let mut calls = 0;
        let a = store.get_or_insert_with(MappingKey::ConstructorToInitFunction, d(1), || {
            calls += 1;
            d(9)
        });
        let b = store.get_or_insert_with(MappingKey::ConstructorToInitFunction, d(1), || {
            calls += 1;
            d(10)
        });
        assert_eq!((a, b, calls), (d(9), d(9), 1));
    }

    #[test]
    fn entries_for_is_ordered_by_key() {
        let mut store = MappingStore::new();
        store.set(MappingKey::InlineClassMemberToStatic, d(1), d(3));
        store.set(MappingKey::OuterThisField, d(1), d(2));
        store.set(MappingKey::OuterThisField, d(5), d(6));
        assert_eq!(
            store.entries_for(d(1)),
            vec![
                (MappingKey::OuterThisField, d(2)),
                (MappingKey::InlineClassMemberToStatic, d(3)),
            ]
        );
        assert_eq!(store.len(), 3);
    }
}
