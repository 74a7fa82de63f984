//! Lazy reconstruction of cached declarations.
//!
//! [`IcDeserializer::inject_ic_data`] materializes only what the target
//! session can reach: it starts from the session's unbound symbols and
//! follows references out of every carrier and mapping it installs, until
//! nothing new is referenced. Declarations nobody reaches stay on disk.

use std::collections::{HashMap, HashSet, VecDeque};

use pir_tree::{Carrier, DeclId, DeclKind, Declaration, MappingKey, Session, Signature, Stage};
use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::codec::IrCodec;
use crate::config::IcConfig;
use crate::error::IcError;
use crate::wire::{SerializedIcData, Skeleton, WireHistory};

/// Order in which pending symbols are taken from the work queue.
///
/// The materialized set is the same either way; only the order of
/// materialization (and so of allocated slots) differs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Breadth-first.
    #[default]
    Fifo,
    /// Depth-first.
    Lifo,
}

/// A declaration the IC data has carriers for but no skeleton, supplied by
/// the library the declaration was originally loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginalDeclaration {
    /// Path of the owning file.
    pub file: String,
    /// Package of the owning file.
    pub package: String,
    /// The declaration as stored in its library.
    pub skeleton: Skeleton,
}

/// The symbol table the deserializer cooperates with.
pub trait Linker {
    /// Loads a declaration that predates the cache baseline.
    fn load_original(&mut self, signature: &Signature) -> Option<OriginalDeclaration>;

    /// Whether `signature` belongs to another library and should stay
    /// unbound here.
    fn is_external(&self, _signature: &Signature) -> bool {
        false
    }

    /// Called after each declaration is bound.
    fn on_materialized(&mut self, _decl: DeclId, _signature: &Signature) {}
}

/// A linker with no original declarations and no external symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOriginals;

impl Linker for NoOriginals {
    fn load_original(&mut self, _signature: &Signature) -> Option<OriginalDeclaration> {
        None
    }
}

/// What one [`IcDeserializer::inject_ic_data`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectReport {
    /// Materialized signatures, in materialization order.
    pub materialized: Vec<Signature>,
    /// How many of them came from the linker.
    pub from_linker: usize,
    /// Mapping entries installed.
    pub mappings: usize,
    /// Symbols left unbound because they belong to another library.
    pub external: Vec<Signature>,
}

#[derive(Default)]
struct IndexEntry<'d> {
    file: usize,
    skeleton: Option<&'d [u8]>,
    history: Option<&'d WireHistory>,
    mappings: Vec<(MappingKey, &'d Signature)>,
}

fn index(data: &SerializedIcData) -> HashMap<&Signature, IndexEntry<'_>> {
    fn slot<'m, 'd>(
        index: &'m mut HashMap<&'d Signature, IndexEntry<'d>>,
        signature: &'d Signature,
        file: usize,
    ) -> &'m mut IndexEntry<'d> {
        let entry = index.entry(signature).or_default();
        entry.file = file;
        entry
    }

    let mut index = HashMap::new();
    for (i, file) in data.files.iter().enumerate() {
        for (sig, bytes) in &file.skeletons {
            slot(&mut index, sig, i).skeleton = Some(bytes.as_slice());
        }
        for history in &file.histories {
            slot(&mut index, &history.signature, i).history = Some(history);
        }
        for mapping in &file.mappings {
            for (decl, value) in &mapping.entries {
                slot(&mut index, decl, i).mappings.push((mapping.key, value));
            }
        }
    }
    index
}

/// A declaration of the closure, decoded and ready to bind.
struct Pending {
    signature: Signature,
    skeleton: Skeleton,
    file: String,
    package: String,
    carriers: Vec<Carrier<Signature>>,
    removed_on: Option<Stage>,
    mappings: Vec<(MappingKey, Signature)>,
}

/// Reads [`SerializedIcData`] into a [`Session`].
pub struct IcDeserializer<'c> {
    codec: &'c dyn IrCodec,
    order: QueueOrder,
}

impl<'c> IcDeserializer<'c> {
    /// Creates a deserializer that decodes through `codec`.
    pub fn new(codec: &'c dyn IrCodec, order: QueueOrder) -> Self {
        Self { codec, order }
    }

    /// Creates a deserializer with the `[deserialize]` settings of `config`.
    pub fn from_config(codec: &'c dyn IrCodec, config: &IcConfig) -> Self {
        Self::new(codec, config.deserialize.queue_order)
    }

    /// The order pending symbols are resolved in.
    pub fn order(&self) -> QueueOrder {
        self.order
    }

    /// Materializes every declaration reachable from `session`'s unbound
    /// symbols.
    ///
    /// The whole closure is resolved and decoded before the session is
    /// touched, so on error the session is left as it was. A reachable
    /// signature that is neither in `data` nor provided or claimed as
    /// external by `linker` fails with [`IcError::UnresolvedSignature`].
    pub fn inject_ic_data(
        &self,
        session: &mut Session,
        data: &SerializedIcData,
        linker: &mut dyn Linker,
    ) -> Result<InjectReport, IcError> {
        let mut report = InjectReport::default();
        let pending = self.resolve(session, data, linker, &mut report)?;

        let mut materialized = HashSet::new();
        for decl in pending {
            let id = session.reference_symbol(&decl.signature);
            let imported: Vec<Carrier> =
                decl.carriers.iter().map(|c| session.import_carrier(c)).collect();
            let file = session.file_or_insert(&decl.file, &decl.package);
            let skeleton = decl.skeleton;
            let mut declaration =
                Declaration::new(skeleton.kind, session.intern(&skeleton.name), file, skeleton.created_on);
            declaration.removed_on = decl.removed_on;
            declaration.signature = Some(decl.signature.clone());
            declaration.flags = skeleton.flags;
            declaration.persistent = skeleton.persistent;
            session.materialize(id, declaration, imported)?;

            for (key, value) in &decl.mappings {
                let value_id = session.reference_symbol(value);
                session.mappings_mut().set(*key, id, value_id);
                report.mappings += 1;
            }

            trace!(signature = %decl.signature, decl = %id, kind = %skeleton.kind, "materialized");
            linker.on_materialized(id, &decl.signature);
            materialized.insert(id);
            report.materialized.push(decl.signature);
        }

        for file in &data.files {
            for sig in &file.order {
                let Some(id) = session.signatures().decl(sig) else {
                    continue;
                };
                if materialized.contains(&id) {
                    let owner = session.declaration(id)?.file;
                    session.append_top_level(owner, id);
                }
            }
        }

        info!(
            materialized = report.materialized.len(),
            from_linker = report.from_linker,
            mappings = report.mappings,
            external = report.external.len(),
            "injected IC data"
        );
        Ok(report)
    }

    /// Walks the closure of `session`'s unbound symbols through `data` and
    /// decodes every declaration in it, without modifying `session`.
    fn resolve(
        &self,
        session: &Session,
        data: &SerializedIcData,
        linker: &mut dyn Linker,
        report: &mut InjectReport,
    ) -> Result<Vec<Pending>, IcError> {
        let index = index(data);
        let mut queue: VecDeque<Signature> =
            session.unbound_symbols().into_iter().map(|(_, sig)| sig).collect();
        let mut visited = HashSet::new();
        let mut pending = Vec::new();
        debug!(roots = queue.len(), indexed = index.len(), order = ?self.order, "injecting IC data");

        while let Some(signature) = self.pop(&mut queue) {
            if !visited.insert(signature.clone()) {
                continue;
            }
            let bound = session
                .signatures()
                .decl(&signature)
                .is_some_and(|id| session.graph().is_bound(id));
            if bound {
                continue;
            }
            let entry = index.get(&signature);

            let (skeleton, file, package) = match entry.and_then(|e| e.skeleton.map(|s| (e, s))) {
                Some((entry, bytes)) => {
                    let file = &data.files[entry.file];
                    let decoded = self.codec.decode_skeleton(bytes)?;
                    (decoded.skeleton, file.path.clone(), file.package.clone())
                }
                None if linker.is_external(&signature) => {
                    trace!(%signature, "left external");
                    report.external.push(signature);
                    continue;
                }
                None => match linker.load_original(&signature) {
                    Some(original) => {
                        report.from_linker += 1;
                        (original.skeleton, original.file, original.package)
                    }
                    None => return Err(IcError::UnresolvedSignature { signature }),
                },
            };

            let history = entry.and_then(|e| e.history);
            let carriers = match history {
                Some(history) => self.decode_history(history)?,
                None => vec![skeleton.state.clone()],
            };
            if let Some(actual) = carriers.iter().map(Carrier::kind).find(|k| *k != skeleton.kind) {
                return Err(IcError::CarrierKindMismatch {
                    signature,
                    expected: skeleton.kind,
                    actual,
                });
            }
            if carriers
                .windows(2)
                .any(|w| w[0].last_modified() >= w[1].last_modified())
            {
                return Err(IcError::UnorderedHistory { signature });
            }

            let mappings: Vec<(MappingKey, Signature)> = entry
                .map(|e| e.mappings.iter().map(|&(key, value)| (key, value.clone())).collect())
                .unwrap_or_default();

            let mut referenced = Vec::new();
            for carrier in &carriers {
                carrier.for_each_ref(&mut |r: &Signature| referenced.push(r.clone()));
            }
            referenced.extend(mappings.iter().map(|(_, value)| value.clone()));
            for sig in referenced {
                if !visited.contains(&sig) {
                    queue.push_back(sig);
                }
            }

            pending.push(Pending {
                signature,
                skeleton,
                file,
                package,
                carriers,
                removed_on: history.and_then(|h| h.removed_on),
                mappings,
            });
        }
        Ok(pending)
    }

    fn pop(&self, queue: &mut VecDeque<Signature>) -> Option<Signature> {
        match self.order {
            QueueOrder::Fifo => queue.pop_front(),
            QueueOrder::Lifo => queue.pop_back(),
        }
    }

    fn decode_history(&self, history: &WireHistory) -> Result<Vec<Carrier<Signature>>, IcError> {
        history
            .carriers
            .iter()
            .map(|wire| {
                let tagged =
                    DeclKind::from_tag(wire.tag).ok_or_else(|| IcError::UnknownCarrierKind {
                        signature: history.signature.clone(),
                        tag: wire.tag,
                    })?;
                let carrier = self.codec.decode_carrier(&wire.bytes)?;
                if carrier.kind() != tagged {
                    return Err(IcError::CarrierKindMismatch {
                        signature: history.signature.clone(),
                        expected: tagged,
                        actual: carrier.kind(),
                    });
                }
                Ok(carrier)
            })
            .collect()
    }
}
