//! The declaration graph of one session: declaration slots, files and the
//! carrier store.

use crate::arena::Arena;
use crate::carrier::Carrier;
use crate::decl::{DeclSlot, Declaration, IrFile};
use crate::error::CarrierError;
use crate::ids::{DeclId, FileId};
use crate::signature::Signature;
use crate::store::CarrierStore;

/// Declarations, files and carriers of one session.
#[derive(Debug, Clone, Default)]
pub struct DeclGraph {
    slots: Arena<DeclId, DeclSlot>,
    files: Arena<FileId, IrFile>,
    carriers: CarrierStore,
}

impl DeclGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns its ID.
    pub fn add_file(&mut self, file: IrFile) -> FileId {
        self.files.alloc(file)
    }

    /// Returns a file.
    pub fn file(&self, id: FileId) -> &IrFile {
        self.files.get(id)
    }

    /// Returns a file mutably.
    pub fn file_mut(&mut self, id: FileId) -> &mut IrFile {
        self.files.get_mut(id)
    }

    /// Finds a file by its module-relative path.
    pub fn find_file(&self, path: &str) -> Option<FileId> {
        self.files
            .iter()
            .find(|(_, f)| f.path == path)
            .map(|(id, _)| id)
    }

    /// Iterates over all files.
    pub fn files(&self) -> impl Iterator<Item = (FileId, &IrFile)> {
        self.files.iter()
    }

    /// Allocates a bound declaration with its first carrier.
    pub fn alloc_decl(&mut self, decl: Declaration, initial: Carrier) -> DeclId {
        let id = self.slots.alloc(DeclSlot::Bound(decl));
        self.carriers.insert_initial(id, initial);
        id
    }

    /// Allocates an unbound slot for a symbol known only by signature.
    pub fn alloc_unbound(&mut self, signature: Signature) -> DeclId {
        self.slots.alloc(DeclSlot::Unbound(signature))
    }

    /// Binds a previously unbound slot to a declaration.
    pub fn bind(&mut self, id: DeclId, decl: Declaration) {
        *self.slots.get_mut(id) = DeclSlot::Bound(decl);
    }

    /// Returns a slot, or `None` for an ID from another session.
    pub fn slot(&self, id: DeclId) -> Option<&DeclSlot> {
        self.slots.try_get(id)
    }

    /// Returns a bound declaration.
    pub fn declaration(&self, id: DeclId) -> Result<&Declaration, CarrierError> {
        self.slot(id)
            .and_then(DeclSlot::as_bound)
            .ok_or(CarrierError::NotBound { decl: id })
    }

    /// Returns a bound declaration mutably.
    pub fn declaration_mut(&mut self, id: DeclId) -> Result<&mut Declaration, CarrierError> {
        if self.slots.try_get(id).is_none() {
            return Err(CarrierError::NotBound { decl: id });
        }
        self.slots
            .get_mut(id)
            .as_bound_mut()
            .ok_or(CarrierError::NotBound { decl: id })
    }

    /// Whether `id` is a bound declaration.
    pub fn is_bound(&self, id: DeclId) -> bool {
        self.slot(id).is_some_and(DeclSlot::is_bound)
    }

    /// Iterates over all slots.
    pub fn slots(&self) -> impl Iterator<Item = (DeclId, &DeclSlot)> {
        self.slots.iter()
    }

    /// Number of slots, bound or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// The carrier store.
    pub fn carriers(&self) -> &CarrierStore {
        &self.carriers
    }

    /// The carrier store, mutably.
    pub fn carriers_mut(&mut self) -> &mut CarrierStore {
        &mut self.carriers
    }
}
