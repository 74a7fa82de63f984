//! A compilation session: the declaration graph together with the state every
//! carrier operation needs.
//!
//! All reads and writes of carriers go through [`Session`] so that the
//! current stage, lowering hooks and the signature table are consulted
//! consistently. Sessions are independent; nothing here is global.

use crate::body::Body;
use crate::carrier::{Carrier, CarrierData};
use crate::decl::{DeclKind, DeclSlot, Declaration, IrFile};
use crate::error::{CarrierError, SignatureError};
use crate::graph::DeclGraph;
use crate::ids::{DeclId, FileId};
use crate::mapping::MappingStore;
use crate::signature::{DefaultMangler, MangleRequest, Mangler, Signature, SignatureTable};
use crate::stage::{Stage, StageController};
use crate::types::IrType;
use pir_common::{Ident, Interner};
use std::sync::Arc;
use tracing::trace;

/// One compilation session.
pub struct Session {
    stages: StageController,
    graph: DeclGraph,
    signatures: SignatureTable,
    mappings: MappingStore,
    interner: Interner,
    mangler: Box<dyn Mangler>,
}

impl Session {
    /// Creates an empty session at [`Stage::INITIAL`] using the
    /// [`DefaultMangler`].
    pub fn new() -> Self {
        Self::with_mangler(Box::new(DefaultMangler))
    }

    /// Creates an empty session with a custom naming scheme.
    pub fn with_mangler(mangler: Box<dyn Mangler>) -> Self {
        Self {
            stages: StageController::new(),
            graph: DeclGraph::new(),
            signatures: SignatureTable::new(),
            mappings: MappingStore::new(),
            interner: Interner::new(),
            mangler,
        }
    }

    /// The stage controller.
    pub fn stages(&self) -> &StageController {
        &self.stages
    }

    /// The stage controller, mutably.
    pub fn stages_mut(&mut self) -> &mut StageController {
        &mut self.stages
    }

    /// The current stage.
    pub fn current_stage(&self) -> Stage {
        self.stages.current()
    }

    /// The declaration graph.
    pub fn graph(&self) -> &DeclGraph {
        &self.graph
    }

    /// The signature table.
    pub fn signatures(&self) -> &SignatureTable {
        &self.signatures
    }

    /// Mapping entries.
    pub fn mappings(&self) -> &MappingStore {
        &self.mappings
    }

    /// Mapping entries, mutably.
    pub fn mappings_mut(&mut self) -> &mut MappingStore {
        &mut self.mappings
    }

    /// Interns a name.
    pub fn intern(&self, name: &str) -> Ident {
        self.interner.get_or_intern(name)
    }

    /// Resolves an interned name.
    pub fn resolve(&self, name: Ident) -> &str {
        self.interner.resolve(name)
    }

    /// Adds an empty file.
    pub fn add_file(&mut self, path: impl Into<String>, package: impl Into<String>) -> FileId {
        self.graph.add_file(IrFile::new(path, package))
    }

    /// Returns the file at `path`, adding it if absent.
    pub fn file_or_insert(&mut self, path: &str, package: &str) -> FileId {
        match self.graph.find_file(path) {
            Some(id) => id,
            None => self.add_file(path, package),
        }
    }

    /// Top-level declarations of `file`, in file order.
    pub fn top_level(&self, file: FileId) -> &[DeclId] {
        &self.graph.file(file).declarations
    }

    /// Appends a top-level declaration to its file.
    pub fn append_top_level(&mut self, file: FileId, decl: DeclId) {
        let decls = &mut self.graph.file_mut(file).declarations;
        if !decls.contains(&decl) {
            decls.push(decl);
        }
    }

    /// Creates a declaration at the current stage with `data` as its initial
    /// state. Without a `parent` it is appended to the file's top-level list.
    pub fn declare(
        &mut self,
        file: FileId,
        parent: Option<DeclId>,
        kind: DeclKind,
        name: &str,
        data: CarrierData<DeclId>,
    ) -> DeclId {
        let stage = self.stages.current();
        let decl = Declaration::new(kind, self.intern(name), file, stage);
        let mut carrier = Carrier::new(stage, data);
        carrier.header.parent = parent;
        let id = self.graph.alloc_decl(decl, carrier);
        if parent.is_none() {
            self.append_top_level(file, id);
        }
        trace!(decl = %id, %kind, name, %stage, "declared");
        id
    }

    /// Returns a bound declaration.
    pub fn declaration(&self, decl: DeclId) -> Result<&Declaration, CarrierError> {
        self.graph.declaration(decl)
    }

    /// Returns a bound declaration mutably, for setting structural fields
    /// such as flags or a precomputed signature.
    pub fn declaration_mut(&mut self, decl: DeclId) -> Result<&mut Declaration, CarrierError> {
        self.graph.declaration_mut(decl)
    }

    /// The simple name of a bound declaration.
    pub fn name_of(&self, decl: DeclId) -> Result<&str, CarrierError> {
        Ok(self.resolve(self.declaration(decl)?.name))
    }

    /// Marks a declaration as removed at the current stage.
    pub fn remove(&mut self, decl: DeclId) -> Result<(), CarrierError> {
        let stage = self.stages.current();
        self.graph.declaration_mut(decl)?.removed_on = Some(stage);
        Ok(())
    }

    /// Returns the declaration slot named `signature`, allocating an unbound
    /// slot if the symbol is not known yet.
    pub fn reference_symbol(&mut self, signature: &Signature) -> DeclId {
        if let Some(id) = self.signatures.decl(signature) {
            return id;
        }
        let id = self.graph.alloc_unbound(signature.clone());
        // Fresh slot, cannot conflict.
        let _ = self.signatures.insert(id, signature.clone());
        id
    }

    /// Unbound symbols in allocation order.
    pub fn unbound_symbols(&self) -> Vec<(DeclId, Signature)> {
        self.graph
            .slots()
            .filter_map(|(id, slot)| match slot {
                DeclSlot::Unbound(sig) => Some((id, sig.clone())),
                DeclSlot::Bound(_) => None,
            })
            .collect()
    }

    /// Binds an unbound slot to `decl` and installs its carrier history. The
    /// history is checked first; on error the slot stays unbound.
    pub fn materialize(
        &mut self,
        id: DeclId,
        decl: Declaration,
        history: Vec<Carrier>,
    ) -> Result<(), CarrierError> {
        if let Some(actual) = history.iter().map(Carrier::kind).find(|k| *k != decl.kind) {
            return Err(CarrierError::KindMismatch {
                decl: id,
                expected: decl.kind,
                actual,
            });
        }
        self.graph.carriers_mut().inject_history(id, history)?;
        self.graph.bind(id, decl);
        Ok(())
    }

    /// Replaces the carrier history of a bound declaration.
    pub fn replace_history(&mut self, id: DeclId, history: Vec<Carrier>) -> Result<(), CarrierError> {
        let kind = self.declaration(id)?.kind;
        if let Some(actual) = history.iter().map(Carrier::kind).find(|k| *k != kind) {
            return Err(CarrierError::KindMismatch {
                decl: id,
                expected: kind,
                actual,
            });
        }
        self.graph.carriers_mut().inject_history(id, history)
    }

    /// The carrier in effect at the current stage.
    pub fn current_carrier(&self, decl: DeclId) -> Result<&Carrier, CarrierError> {
        self.carrier_at(decl, self.stages.current())
    }

    /// The carrier in effect at `stage`.
    pub fn carrier_at(&self, decl: DeclId, stage: Stage) -> Result<&Carrier, CarrierError> {
        self.declaration(decl)?;
        self.graph
            .carriers()
            .current(decl, stage)
            .ok_or(CarrierError::NoCarrierAt { decl, stage })
    }

    /// Every carrier of `decl`, oldest first.
    pub fn history(&self, decl: DeclId) -> Vec<&Carrier> {
        self.graph.carriers().history(decl)
    }

    /// Lets lowering hooks bring `decl` up to the stage before the current
    /// one, then records that it is lowered that far.
    pub fn ensure_lowered(&mut self, decl: DeclId) -> Result<(), CarrierError> {
        self.declaration(decl)?;
        let lowered_up_to = self
            .graph
            .carriers()
            .decl_history(decl)
            .map(|h| h.lowered_up_to())
            .unwrap_or_default();
        if let Some(target) = self.stages.require_lowered(decl, lowered_up_to) {
            self.graph.carriers_mut().set_lowered_up_to(decl, target);
        }
        Ok(())
    }

    /// Returns a carrier of `decl` that may be modified at the current stage.
    pub fn push_carrier(&mut self, decl: DeclId) -> Result<&mut Carrier, CarrierError> {
        self.ensure_lowered(decl)?;
        let persistent = self.declaration(decl)?.persistent;
        let stage = self.stages.current();
        self.graph.carriers_mut().push(decl, stage, persistent)
    }

    /// The body of `decl` at the current stage.
    pub fn body(&self, decl: DeclId) -> Result<Option<Arc<Body<DeclId>>>, CarrierError> {
        self.check_bodies(decl)?;
        Ok(self.current_carrier(decl)?.data.body().cloned())
    }

    /// Replaces the body of a function, constructor or anonymous initializer
    /// at the current stage. Other kinds are left untouched.
    pub fn replace_body(&mut self, decl: DeclId, body: Body<DeclId>) -> Result<(), CarrierError> {
        self.check_bodies(decl)?;
        let carrier = self.push_carrier(decl)?;
        let body = Some(Arc::new(body));
        match &mut carrier.data {
            CarrierData::Function(d) => d.body = body,
            CarrierData::Constructor(d) => d.body = body,
            CarrierData::AnonymousInitializer(d) => d.body = body,
            _ => {}
        }
        Ok(())
    }

    fn check_bodies(&self, decl: DeclId) -> Result<(), CarrierError> {
        if self.stages.bodies_enabled() {
            Ok(())
        } else {
            Err(CarrierError::BodiesDisabled {
                decl,
                stage: self.stages.current(),
            })
        }
    }

    /// Runs `f` with the current stage temporarily set to `stage`.
    pub fn with_stage<T>(&mut self, stage: Stage, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.stages.current();
        self.stages.set_current(stage);
        let result = f(self);
        self.stages.set_current(saved);
        result
    }

    /// Runs `f` at the stage `decl` was created on.
    pub fn with_initial_state_of<T>(
        &mut self,
        decl: DeclId,
        f: impl FnOnce(&mut Self) -> T,
    ) -> Result<T, CarrierError> {
        let stage = self.declaration(decl)?.created_on;
        Ok(self.with_stage(stage, f))
    }

    /// Returns the signature of `decl`, computing and memoizing it on first
    /// use. Precomputed signatures win over mangling; the parent and
    /// parameter types are taken as of the declaration's creation stage.
    pub fn signature_for(&mut self, decl: DeclId) -> Result<Signature, SignatureError> {
        if let Some(sig) = self.signatures.signature(decl) {
            return Ok(sig.clone());
        }
        let declaration = self.graph.declaration(decl)?.clone();
        let signature = match declaration.signature {
            Some(sig) => sig,
            None => self.mangle(decl, &declaration)?,
        };
        self.signatures.insert(decl, signature.clone())?;
        trace!(%decl, %signature, "assigned signature");
        Ok(signature)
    }

    fn mangle(&mut self, decl: DeclId, declaration: &Declaration) -> Result<Signature, SignatureError> {
        let initial = self.carrier_at(decl, declaration.created_on)?.clone();
        let parent = match initial.header.parent {
            Some(parent) => Some(self.signature_for(parent)?),
            None => None,
        };

        let mut parameter_keys = Vec::new();
        for &param in initial.data.value_parameters() {
            parameter_keys.push(self.parameter_key(param, declaration.created_on)?);
        }
        let receiver_key = match self.extension_receiver(&initial.data)? {
            Some(receiver) => Some(self.parameter_key(receiver, declaration.created_on)?),
            None => None,
        };

        let name = self.resolve(declaration.name).to_string();
        let package = self.graph.file(declaration.file).package.clone();
        self.mangler.mangle(&MangleRequest {
            decl,
            kind: declaration.kind,
            name: &name,
            package: &package,
            parent: parent.as_ref(),
            parameter_keys: &parameter_keys,
            receiver_key: receiver_key.as_deref(),
        })
    }

    fn parameter_key(&mut self, param: DeclId, stage: Stage) -> Result<String, SignatureError> {
        let ty = match &self.carrier_at(param, stage)?.data {
            CarrierData::ValueParameter(p) => p.ty.clone(),
            _ => IrType::Error,
        };
        self.type_key(&ty)
    }

    /// The extension receiver of a function, or of a property's first
    /// accessor that has one, as of the accessor's creation.
    fn extension_receiver(&self, data: &CarrierData<DeclId>) -> Result<Option<DeclId>, SignatureError> {
        match data {
            CarrierData::Function(f) => Ok(f.extension_receiver),
            CarrierData::Property(p) => {
                for &accessor in p.getter.iter().chain(&p.setter) {
                    let created_on = self.declaration(accessor)?.created_on;
                    if let CarrierData::Function(f) = &self.carrier_at(accessor, created_on)?.data {
                        if f.extension_receiver.is_some() {
                            return Ok(f.extension_receiver);
                        }
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn type_key(&mut self, ty: &IrType<DeclId>) -> Result<String, SignatureError> {
        let (mut key, nullable) = match ty {
            IrType::Builtin { ty, nullable } => (ty.to_string(), *nullable),
            IrType::Class {
                class,
                arguments,
                nullable,
            } => {
                let mut key = self.signature_for(*class)?.to_string();
                if !arguments.is_empty() {
                    let args = arguments
                        .iter()
                        .map(|a| self.type_key(a))
                        .collect::<Result<Vec<_>, _>>()?;
                    key.push('<');
                    key.push_str(&args.join(","));
                    key.push('>');
                }
                (key, *nullable)
            }
            IrType::Parameter { parameter, nullable } => {
                let key = match self.graph.declaration(*parameter) {
                    Ok(d) => self.resolve(d.name).to_string(),
                    Err(_) => self.signature_for(*parameter)?.path,
                };
                (key, *nullable)
            }
            IrType::Error => ("<error>".to_string(), false),
        };
        if nullable {
            key.push('?');
        }
        Ok(key)
    }

    /// The full carrier history of `decl`, with every reference replaced by
    /// its signature.
    pub fn export_history(&mut self, decl: DeclId) -> Result<Vec<Carrier<Signature>>, SignatureError> {
        let history: Vec<Carrier> = self.history(decl).into_iter().cloned().collect();
        history
            .iter()
            .map(|c| c.try_map_refs(&mut |r: &DeclId| self.signature_for(*r)))
            .collect()
    }

    /// Translates a carrier read from a cache into this session, allocating
    /// unbound slots for symbols not seen before.
    pub fn import_carrier(&mut self, carrier: &Carrier<Signature>) -> Carrier {
        let imported: Result<Carrier, std::convert::Infallible> =
            carrier.try_map_refs(&mut |sig: &Signature| Ok(self.reference_symbol(sig)));
        match imported {
            Ok(c) => c,
            Err(never) => match never {},
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
