//! Append-only storage of carrier snapshots.
//!
//! Snapshots live in one [`Arena`]; each declaration has a [`DeclHistory`]
//! listing its snapshots in strictly increasing stage order. Reading at a
//! stage is a binary search over that list.

use crate::arena::Arena;
use crate::carrier::Carrier;
use crate::error::CarrierError;
use crate::ids::{DeclId, SnapshotId};
use crate::stage::Stage;
use std::collections::HashMap;

/// The snapshot index of one declaration.
#[derive(Debug, Clone, Default)]
pub struct DeclHistory {
    entries: Vec<(Stage, SnapshotId)>,
    lowered_up_to: Stage,
}

impl DeclHistory {
    /// The stage the declaration has been lowered up to.
    pub fn lowered_up_to(&self) -> Stage {
        self.lowered_up_to
    }

    /// Stages at which snapshots were taken, oldest first.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    /// Number of snapshots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the declaration has no snapshot yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn at(&self, stage: Stage) -> Option<SnapshotId> {
        let idx = self.entries.partition_point(|(s, _)| *s <= stage);
        idx.checked_sub(1).map(|i| self.entries[i].1)
    }

    fn latest(&self) -> Option<(Stage, SnapshotId)> {
        self.entries.last().copied()
    }
}

/// All carrier snapshots of a session.
#[derive(Debug, Clone, Default)]
pub struct CarrierStore {
    snapshots: Arena<SnapshotId, Carrier>,
    histories: HashMap<DeclId, DeclHistory>,
}

impl CarrierStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first snapshot of a declaration, replacing any history it
    /// had. The declaration counts as lowered up to the carrier's stage.
    pub fn insert_initial(&mut self, decl: DeclId, carrier: Carrier) {
        let stage = carrier.last_modified();
        let id = self.snapshots.alloc(carrier);
        self.histories.insert(
            decl,
            DeclHistory {
                entries: vec![(stage, id)],
                lowered_up_to: stage,
            },
        );
    }

    /// Returns the snapshot in effect at `stage`: the one with the greatest
    /// `last_modified` not after `stage`.
    pub fn current(&self, decl: DeclId, stage: Stage) -> Option<&Carrier> {
        let id = self.histories.get(&decl)?.at(stage)?;
        Some(self.snapshots.get(id))
    }

    /// Returns the newest snapshot.
    pub fn latest(&self, decl: DeclId) -> Option<&Carrier> {
        let (_, id) = self.histories.get(&decl)?.latest()?;
        Some(self.snapshots.get(id))
    }

    /// Returns a mutable snapshot taken at `stage`.
    ///
    /// If the newest snapshot is older than `stage`, it is cloned and the
    /// clone is appended; bodies are shared with the previous snapshot. If
    /// `persistent` is false the only snapshot is updated in place and keeps
    /// its stage, so it stays readable from the creation stage on.
    pub fn push(
        &mut self,
        decl: DeclId,
        stage: Stage,
        persistent: bool,
    ) -> Result<&mut Carrier, CarrierError> {
        let history = self
            .histories
            .get_mut(&decl)
            .ok_or(CarrierError::NoCarrierAt { decl, stage })?;
        let (latest, id) = history
            .latest()
            .ok_or(CarrierError::NoCarrierAt { decl, stage })?;
        if stage < latest {
            return Err(CarrierError::StageRegression {
                decl,
                stage,
                latest,
            });
        }

        let id = if stage == latest || !persistent {
            id
        } else {
            let mut next = self.snapshots.get(id).clone();
            next.header.last_modified = stage;
            let next_id = self.snapshots.alloc(next);
            history.entries.push((stage, next_id));
            next_id
        };
        if history.lowered_up_to < stage {
            history.lowered_up_to = stage;
        }
        Ok(self.snapshots.get_mut(id))
    }

    /// Returns every snapshot of `decl`, oldest first.
    pub fn history(&self, decl: DeclId) -> Vec<&Carrier> {
        self.histories
            .get(&decl)
            .map(|h| h.entries.iter().map(|(_, id)| self.snapshots.get(*id)).collect())
            .unwrap_or_default()
    }

    /// Returns the snapshot index of `decl`.
    pub fn decl_history(&self, decl: DeclId) -> Option<&DeclHistory> {
        self.histories.get(&decl)
    }

    /// Replaces the history of `decl` with `carriers`, which must be in
    /// strictly increasing stage order.
    pub fn inject_history(&mut self, decl: DeclId, carriers: Vec<Carrier>) -> Result<(), CarrierError> {
        if carriers
            .windows(2)
            .any(|w| w[0].last_modified() >= w[1].last_modified())
        {
            return Err(CarrierError::UnorderedHistory { decl });
        }
        let mut entries = Vec::with_capacity(carriers.len());
        for carrier in carriers {
            let stage = carrier.last_modified();
            entries.push((stage, self.snapshots.alloc(carrier)));
        }
        let lowered_up_to = entries.last().map(|(s, _)| *s).unwrap_or_default();
        self.histories.insert(
            decl,
            DeclHistory {
                entries,
                lowered_up_to,
            },
        );
        Ok(())
    }

    /// Records that `decl` has been lowered up to `stage`.
    pub fn set_lowered_up_to(&mut self, decl: DeclId, stage: Stage) {
        if let Some(h) = self.histories.get_mut(&decl) {
            h.lowered_up_to = h.lowered_up_to.max(stage);
        }
    }

    /// Total number of snapshots ever allocated.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierData;
    use crate::decl::DeclKind;

    fn field(stage: u32) -> Carrier {
        Carrier::new(Stage::new(stage), CarrierData::empty(DeclKind::Field))
    }

    fn is_static(c: &Carrier) -> bool {
        match &c.data {
            CarrierData::Field(f) => f.is_static,
            _ => unreachable!(),
        }
    }

    fn set_static(c: &mut Carrier) {
        if let CarrierData::Field(f) = &mut c.data {
            f.is_static = true;
        }
    }

    #[test]
    fn lookup_picks_greatest_stage_not_after() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store
            .inject_history(d, vec![field(0), field(2), field(5)])
            .unwrap();

        let at = |s| store.current(d, Stage::new(s)).map(|c| c.last_modified().get());
        assert_eq!(at(0), Some(0));
        assert_eq!(at(1), Some(0));
        assert_eq!(at(2), Some(2));
        assert_eq!(at(4), Some(2));
        assert_eq!(at(9), Some(5));
    }

    #[test]
    fn lookup_before_first_snapshot_is_none() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store.insert_initial(d, field(3));
        assert!(store.current(d, Stage::new(2)).is_none());
        assert!(store.current(DeclId::from_raw(1), Stage::new(3)).is_none());
    }

    #[test]
    fn push_clones_on_write_and_preserves_old_snapshot() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store.insert_initial(d, field(0));

        set_static(store.push(d, Stage::new(1), true).unwrap());

        assert!(!is_static(store.current(d, Stage::new(0)).unwrap()));
        assert!(is_static(store.current(d, Stage::new(1)).unwrap()));
        assert_eq!(store.history(d).len(), 2);
        assert_eq!(store.decl_history(d).unwrap().lowered_up_to(), Stage::new(1));
    }

    #[test]
    fn push_at_same_stage_reuses_snapshot() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store.insert_initial(d, field(0));
        store.push(d, Stage::new(1), true).unwrap();
        store.push(d, Stage::new(1), true).unwrap();
        assert_eq!(store.history(d).len(), 2);
    }

    #[test]
    fn push_non_persistent_mutates_in_place() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store.insert_initial(d, field(0));
        set_static(store.push(d, Stage::new(4), false).unwrap());
        assert_eq!(store.history(d).len(), 1);
        assert_eq!(store.snapshot_count(), 1);
        assert!(is_static(store.latest(d).unwrap()));
        assert_eq!(store.latest(d).unwrap().last_modified(), Stage::new(0));
        assert!(is_static(store.current(d, Stage::new(0)).unwrap()));
        assert_eq!(store.decl_history(d).unwrap().lowered_up_to(), Stage::new(4));

        set_static(store.push(d, Stage::new(6), false).unwrap());
        assert_eq!(store.history(d).len(), 1);
    }

    #[test]
    fn push_at_older_stage_is_rejected() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        store.insert_initial(d, field(3));
        let err = store.push(d, Stage::new(2), true).unwrap_err();
        assert_eq!(
            err,
            CarrierError::StageRegression {
                decl: d,
                stage: Stage::new(2),
                latest: Stage::new(3),
            }
        );
    }

    #[test]
    fn inject_rejects_unordered_history() {
        let d = DeclId::from_raw(0);
        let mut store = CarrierStore::new();
        let err = store.inject_history(d, vec![field(2), field(2)]).unwrap_err();
        assert_eq!(err, CarrierError::UnorderedHistory { decl: d });
    }
}
