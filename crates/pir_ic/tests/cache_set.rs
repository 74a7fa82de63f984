//! Tests for the cache set of a multi-library build: validity checking,
//! cache writes and once-per-process preparation in dependency order.

use std::path::{Path, PathBuf};

use pir_ic::{
    build_cache, check_caches, load_caches, prepare_ic_caches, BincodeCodec, CacheInfo,
    CodecOptions, IcCacheStore, IcError, IcSerializer, LibraryGraph, SerializedIcData,
};
use pir_tree::{CarrierData, DeclKind, Session};

fn lib(name: &str) -> PathBuf {
    PathBuf::from("/libs").join(name)
}

fn cache(root: &Path, name: &str) -> PathBuf {
    let dir = root.join("cache").join(name);
    build_cache(&dir, &lib(name), None).unwrap();
    dir
}

/// IC data of a library with one new top-level class named after it.
fn compile(library: &Path) -> SerializedIcData {
    let name = library.file_name().unwrap().to_string_lossy().into_owned();
    let mut s = Session::new();
    let file = s.add_file(format!("{name}.kt"), name.as_str());
    s.stages_mut().advance();
    let class = s.declare(file, None, DeclKind::Class, &name, CarrierData::empty(DeclKind::Class));
    IcSerializer::new(&BincodeCodec, CodecOptions::incremental())
        .serialize_declarations(&mut s, &[class])
        .unwrap()
}

#[test]
fn missing_cache_for_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = [cache(dir.path(), "A")];
    let err = check_caches(&[lib("A"), lib("B")], &dirs).unwrap_err();
    assert!(matches!(err, IcError::MissingCache { library } if library == lib("B")));
}

#[test]
fn stale_cache_for_removed_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = [cache(dir.path(), "A"), cache(dir.path(), "C")];
    let err = check_caches(&[lib("A")], &dirs).unwrap_err();
    assert!(matches!(err, IcError::StaleCache { library, .. } if library == lib("C")));
}

#[test]
fn exact_cover_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = [cache(dir.path(), "A"), cache(dir.path(), "B")];
    let infos = check_caches(&[lib("A"), lib("B")], &dirs).unwrap();
    assert_eq!(infos.keys().cloned().collect::<Vec<_>>(), [lib("A"), lib("B")]);
}

#[test]
fn build_cache_binds_directory_to_library() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache").join("L");
    build_cache(&cache_dir, &lib("L"), None).unwrap();
    assert_eq!(CacheInfo::load(&cache_dir).unwrap().library, lib("L"));
}

#[test]
fn interrupted_write_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = cache(dir.path(), "A");
    // Truncated record, as left by a crash mid-write.
    std::fs::write(CacheInfo::path(&cache_dir), "{\"cache_dir\": \"/cac").unwrap();
    let err = check_caches(&[lib("A")], &[cache_dir]).unwrap_err();
    assert!(matches!(err, IcError::CorruptCacheInfo { .. }));
}

#[test]
fn prepared_caches_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut graph = LibraryGraph::new();
    graph.add_dependency(lib("app"), lib("core"));

    let store = IcCacheStore::new();
    let mut built = Vec::new();
    let prepared = prepare_ic_caches(&graph, &store, |library| {
        built.push(library.to_path_buf());
        Ok(compile(library))
    })
    .unwrap();
    assert_eq!(built, [lib("core"), lib("app")]);

    let mut dirs = Vec::new();
    for (library, data) in &prepared {
        let name = library.file_name().unwrap();
        let cache_dir = dir.path().join("cache").join(name);
        build_cache(&cache_dir, library, Some(data.as_ref())).unwrap();
        dirs.push(cache_dir);
    }

    let loaded = load_caches(&[lib("app"), lib("core")], &dirs).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[&lib("core")], *store.get(&lib("core")).unwrap());
    assert_eq!(loaded[&lib("app")].files[0].path, "app.kt");
}
