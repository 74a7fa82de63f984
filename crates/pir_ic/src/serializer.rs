//! Serialization of a session's declarations into IC data.

use std::collections::{BTreeMap, HashSet};

use pir_tree::{CarrierError, DeclId, Declaration, FileId, MappingKey, Session, Signature};
use tracing::{debug, info, trace};

use crate::codec::{CodecOptions, IrCodec};
use crate::config::IcConfig;
use crate::error::IcError;
use crate::wire::{
    SerializedIcData, SerializedIcDataForFile, SerializedMapping, Skeleton, WireCarrier,
    WireHistory,
};

/// Writes declarations of a [`Session`] as [`SerializedIcData`].
pub struct IcSerializer<'c> {
    codec: &'c dyn IrCodec,
    options: CodecOptions,
}

struct FileBuilder {
    file: FileId,
    data: SerializedIcDataForFile,
    mappings: BTreeMap<MappingKey, Vec<(Signature, Signature)>>,
}

impl<'c> IcSerializer<'c> {
    /// Creates a serializer that encodes through `codec`.
    pub fn new(codec: &'c dyn IrCodec, options: CodecOptions) -> Self {
        Self { codec, options }
    }

    /// Creates a serializer with the `[serialize]` settings of `config`.
    pub fn from_config(codec: &'c dyn IrCodec, config: &IcConfig) -> Self {
        Self::new(codec, config.codec_options())
    }

    /// The codec options skeletons are encoded with.
    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Serializes `decls`, grouped by owning file.
    ///
    /// Per file this records skeletons of declarations created after the
    /// session baseline, the full carrier history of every persistent
    /// declaration, every mapping entry keyed by one of `decls`, and the
    /// file's top-level order restricted to `decls`.
    pub fn serialize_declarations(
        &self,
        session: &mut Session,
        decls: &[DeclId],
    ) -> Result<SerializedIcData, IcError> {
        let baseline = session.stages().baseline();
        let mut seen = HashSet::new();
        let mut files: BTreeMap<String, FileBuilder> = BTreeMap::new();

        for &id in decls {
            if !seen.insert(id) {
                continue;
            }
            let declaration = session.declaration(id)?.clone();
            let signature = session.signature_for(id)?;
            check_parent_file(session, id, &declaration, &signature)?;

            let file = session.graph().file(declaration.file);
            let builder = files
                .entry(file.path.clone())
                .or_insert_with(|| FileBuilder {
                    file: declaration.file,
                    data: SerializedIcDataForFile::new(file.path.clone(), file.package.clone()),
                    mappings: BTreeMap::new(),
                });

            let is_new = declaration.is_new(baseline);
            let history = if is_new || declaration.persistent {
                session.export_history(id)?
            } else {
                Vec::new()
            };

            if is_new {
                let state = history.last().cloned().ok_or(CarrierError::NoCarrierAt {
                    decl: id,
                    stage: session.current_stage(),
                })?;
                let skeleton = Skeleton {
                    kind: declaration.kind,
                    name: session.resolve(declaration.name).to_string(),
                    created_on: declaration.created_on,
                    flags: declaration.flags,
                    persistent: declaration.persistent,
                    state,
                };
                match self.codec.encode_skeleton(&skeleton, &self.options)? {
                    Some(bytes) => builder.data.skeletons.push((signature.clone(), bytes)),
                    None => trace!(%signature, "skeleton filtered out"),
                }
            }

            if declaration.persistent {
                let carriers = history
                    .iter()
                    .map(|carrier| {
                        Ok(WireCarrier {
                            tag: carrier.kind().tag(),
                            bytes: self.codec.encode_carrier(carrier)?,
                        })
                    })
                    .collect::<Result<Vec<_>, IcError>>()?;
                builder.data.histories.push(WireHistory {
                    signature: signature.clone(),
                    removed_on: declaration.removed_on,
                    carriers,
                });
            }

            for (key, value) in session.mappings().entries_for(id) {
                let value = session.signature_for(value)?;
                builder
                    .mappings
                    .entry(key)
                    .or_default()
                    .push((signature.clone(), value));
            }
        }

        let mut out = SerializedIcData::default();
        for (_, mut builder) in files {
            let top_level = session.top_level(builder.file).to_vec();
            for top in top_level.into_iter().filter(|d| seen.contains(d)) {
                builder.data.order.push(session.signature_for(top)?);
            }

            builder.data.skeletons.sort_by(|a, b| a.0.cmp(&b.0));
            builder.data.histories.sort_by(|a, b| a.signature.cmp(&b.signature));
            builder.data.mappings = builder
                .mappings
                .into_iter()
                .map(|(key, mut entries)| {
                    entries.sort();
                    SerializedMapping { key, entries }
                })
                .collect();

            debug!(
                file = %builder.data.path,
                skeletons = builder.data.skeletons.len(),
                histories = builder.data.histories.len(),
                mappings = builder.data.mappings.len(),
                "serialized file"
            );
            out.files.push(builder.data);
        }

        info!(
            declarations = seen.len(),
            files = out.files.len(),
            skeletons = out.skeleton_count(),
            "serialized IC data"
        );
        Ok(out)
    }
}

/// Fails if `id` was created under a parent owned by another file.
fn check_parent_file(
    session: &Session,
    id: DeclId,
    declaration: &Declaration,
    signature: &Signature,
) -> Result<(), IcError> {
    let Some(parent) = session.carrier_at(id, declaration.created_on)?.header.parent else {
        return Ok(());
    };
    // External parents live in another library and never move.
    let Ok(parent_decl) = session.declaration(parent) else {
        return Ok(());
    };
    if parent_decl.file == declaration.file {
        return Ok(());
    }
    Err(IcError::MovedAcrossFiles {
        signature: signature.clone(),
        file: session.graph().file(declaration.file).path.clone(),
        parent_file: session.graph().file(parent_decl.file).path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BincodeCodec, DecodedSkeleton};
    use pir_tree::{BuiltinType, CarrierData, DeclKind, FunctionData, IrType, Stage};

    fn function(ret: BuiltinType) -> CarrierData<DeclId> {
        match CarrierData::empty(DeclKind::Function) {
            CarrierData::Function(mut f) => {
                f.return_type = IrType::builtin(ret);
                CarrierData::Function(f)
            }
            other => other,
        }
    }

    /// A session one stage past its baseline, so every declaration is new.
    fn session() -> (Session, FileId) {
        let mut s = Session::new();
        let file = s.add_file("a.kt", "app");
        s.stages_mut().advance();
        (s, file)
    }

    fn serialize(session: &mut Session, decls: &[DeclId]) -> SerializedIcData {
        IcSerializer::new(&BincodeCodec, CodecOptions::incremental())
            .serialize_declarations(session, decls)
            .unwrap()
    }

    #[test]
    fn groups_by_file_in_path_order() {
        let (mut s, a) = session();
        let b = s.add_file("b.kt", "app");
        let g = s.declare(b, None, DeclKind::Function, "g", function(BuiltinType::Unit));
        let f = s.declare(a, None, DeclKind::Function, "f", function(BuiltinType::Int));

        let data = serialize(&mut s, &[g, f]);
        let paths: Vec<_> = data.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["a.kt", "b.kt"]);
        assert_eq!(data.files[0].order, vec![s.signature_for(f).unwrap()]);
    }

    #[test]
    fn only_new_declarations_get_skeletons() {
        let mut s = Session::new();
        let file = s.add_file("a.kt", "app");
        let old = s.declare(file, None, DeclKind::Function, "old", function(BuiltinType::Unit));
        s.stages_mut().advance();
        let new = s.declare(file, None, DeclKind::Function, "new", function(BuiltinType::Unit));

        let data = serialize(&mut s, &[old, new]);
        let file = &data.files[0];
        assert_eq!(file.skeletons.len(), 1);
        assert_eq!(file.skeletons[0].0, s.signature_for(new).unwrap());
        // Both are persistent, so both histories are kept.
        assert_eq!(file.histories.len(), 2);

        let DecodedSkeleton { skeleton, ic_sourced } =
            BincodeCodec.decode_skeleton(&file.skeletons[0].1).unwrap();
        assert!(ic_sourced);
        assert_eq!(skeleton.name, "new");
        assert_eq!(skeleton.kind, DeclKind::Function);
        assert_eq!(skeleton.created_on, Stage::new(1));
    }

    #[test]
    fn non_persistent_declarations_have_no_history() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Unit));
        s.declaration_mut(f).unwrap().persistent = false;

        let data = serialize(&mut s, &[f]);
        assert!(data.files[0].histories.is_empty());
        assert_eq!(data.files[0].skeletons.len(), 1);
    }

    #[test]
    fn non_persistent_declaration_edited_later_still_serializes() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Unit));
        s.declaration_mut(f).unwrap().persistent = false;
        s.stages_mut().advance();
        if let CarrierData::Function(d) = &mut s.push_carrier(f).unwrap().data {
            d.is_inline = true;
        }

        let data = serialize(&mut s, &[f]);
        assert!(data.files[0].histories.is_empty());
        let skeleton = BincodeCodec
            .decode_skeleton(&data.files[0].skeletons[0].1)
            .unwrap()
            .skeleton;
        assert_eq!(skeleton.state.last_modified(), Stage::new(1));
        assert!(matches!(
            skeleton.state.data,
            CarrierData::Function(FunctionData { is_inline: true, .. })
        ));
    }

    #[test]
    fn newness_is_relative_to_a_later_baseline() {
        let mut s = Session::new();
        let file = s.add_file("a.kt", "app");
        s.stages_mut().set_current(Stage::new(2));
        let loaded = s.declare(file, None, DeclKind::Function, "loaded", function(BuiltinType::Unit));
        s.stages_mut().set_current(Stage::new(3));
        let lowered = s.declare(file, None, DeclKind::Function, "lowered", function(BuiltinType::Unit));
        s.stages_mut().set_baseline(Stage::new(2));

        let data = serialize(&mut s, &[loaded, lowered]);
        let file = &data.files[0];
        let skeletons: Vec<_> = file.skeletons.iter().map(|(sig, _)| sig.path.as_str()).collect();
        assert_eq!(skeletons, ["lowered"]);
        assert_eq!(file.histories.len(), 2);
    }

    #[test]
    fn history_carries_every_stage_and_removal() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Unit));
        s.stages_mut().advance();
        s.push_carrier(f).unwrap();
        s.stages_mut().advance();
        s.remove(f).unwrap();

        let data = serialize(&mut s, &[f]);
        let history = &data.files[0].histories[0];
        assert_eq!(history.carriers.len(), 2);
        assert_eq!(history.removed_on, Some(Stage::new(3)));
        assert!(history
            .carriers
            .iter()
            .all(|c| c.tag == DeclKind::Function.tag()));
        let last = BincodeCodec.decode_carrier(&history.carriers[1].bytes).unwrap();
        assert_eq!(last.last_modified(), Stage::new(2));
    }

    #[test]
    fn mappings_are_keyed_by_signature() {
        let (mut s, file) = session();
        let object = s.declare(file, None, DeclKind::Class, "O", CarrierData::empty(DeclKind::Class));
        let instance = s.declare(
            file,
            Some(object),
            DeclKind::Field,
            "INSTANCE",
            CarrierData::empty(DeclKind::Field),
        );
        s.mappings_mut()
            .set(MappingKey::ObjectToInstanceField, object, instance);

        let data = serialize(&mut s, &[object, instance]);
        let mappings = &data.files[0].mappings;
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].key, MappingKey::ObjectToInstanceField);
        assert_eq!(
            mappings[0].entries,
            vec![(s.signature_for(object).unwrap(), s.signature_for(instance).unwrap())]
        );
        // Members are not part of the file's top-level order.
        assert_eq!(data.files[0].order, vec![s.signature_for(object).unwrap()]);
    }

    #[test]
    fn parent_in_other_file_is_rejected() {
        let (mut s, a) = session();
        let b = s.add_file("b.kt", "app");
        let class = s.declare(a, None, DeclKind::Class, "A", CarrierData::empty(DeclKind::Class));
        let member = s.declare(b, Some(class), DeclKind::Function, "m", function(BuiltinType::Unit));

        let err = IcSerializer::new(&BincodeCodec, CodecOptions::incremental())
            .serialize_declarations(&mut s, &[member])
            .unwrap_err();
        match err {
            IcError::MovedAcrossFiles { file, parent_file, .. } => {
                assert_eq!(file, "b.kt");
                assert_eq!(parent_file, "a.kt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_inputs_are_serialized_once() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Unit));
        let data = serialize(&mut s, &[f, f]);
        assert_eq!(data.files[0].skeletons.len(), 1);
        assert_eq!(data.files[0].histories.len(), 1);
        assert_eq!(data.files[0].order.len(), 1);
    }

    #[test]
    fn expect_declarations_lose_their_skeleton() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Unit));
        s.declaration_mut(f).unwrap().flags.expect = true;
        let data = serialize(&mut s, &[f]);
        assert!(data.files[0].skeletons.is_empty());
        assert_eq!(data.files[0].histories.len(), 1);
    }

    #[test]
    fn function_data_survives_in_history() {
        let (mut s, file) = session();
        let f = s.declare(file, None, DeclKind::Function, "f", function(BuiltinType::Long));
        let data = serialize(&mut s, &[f]);
        let carrier = BincodeCodec
            .decode_carrier(&data.files[0].histories[0].carriers[0].bytes)
            .unwrap();
        match carrier.data {
            CarrierData::Function(FunctionData { return_type, .. }) => {
                assert_eq!(return_type, IrType::builtin(BuiltinType::Long));
            }
            other => panic!("unexpected carrier: {other:?}"),
        }
    }
}
