//! Cache validity checking and cache writes.
//!
//! The set of cache directories handed to a build must map one-to-one onto
//! the build's dependency libraries. [`check_caches`] enforces that before
//! anything is deserialized; [`build_cache`] and [`CacheBuilder`] produce
//! directories that satisfy it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cache_info::CacheInfo;
use crate::config::IcConfig;
use crate::error::IcError;
use crate::hasher::{FingerprintMode, LibraryHasher};
use crate::layout::{read_ic_data, write_ic_data};
use crate::wire::SerializedIcData;

/// Makes a library path absolute against the current directory.
///
/// Paths are not canonicalized: a library is identified by the path it was
/// given, not by where symlinks lead.
pub fn absolute_library_path(path: &Path) -> Result<PathBuf, IcError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| IcError::io(path, e))?;
    Ok(cwd.join(path))
}

/// Checks that `cache_dirs` covers exactly `dependencies`, by library path.
///
/// Returns the loaded records keyed by absolute library path.
pub fn check_caches(
    dependencies: &[PathBuf],
    cache_dirs: &[PathBuf],
) -> Result<BTreeMap<PathBuf, CacheInfo>, IcError> {
    check_caches_with(dependencies, cache_dirs, FingerprintMode::Path)
}

/// Like [`check_caches`], additionally comparing library fingerprints in
/// [`FingerprintMode::Content`].
pub fn check_caches_with(
    dependencies: &[PathBuf],
    cache_dirs: &[PathBuf],
    mode: FingerprintMode,
) -> Result<BTreeMap<PathBuf, CacheInfo>, IcError> {
    let wanted = dependencies
        .iter()
        .map(|d| absolute_library_path(d))
        .collect::<Result<BTreeSet<_>, _>>()?;

    let mut found: BTreeMap<PathBuf, CacheInfo> = BTreeMap::new();
    for dir in cache_dirs {
        let info = CacheInfo::load(dir)?;
        if !wanted.contains(&info.library) {
            warn!(cache_dir = %dir.display(), library = %info.library.display(), "stale cache");
            return Err(IcError::StaleCache {
                cache_dir: dir.clone(),
                library: info.library,
            });
        }
        if let Some(previous) = found.get(&info.library) {
            warn!(
                library = %info.library.display(),
                kept = %previous.cache_dir.display(),
                ignored = %dir.display(),
                "library has more than one cache"
            );
            continue;
        }
        found.insert(info.library.clone(), info);
    }

    if let Some(library) = wanted.iter().find(|lib| !found.contains_key(*lib)) {
        warn!(library = %library.display(), "missing cache");
        return Err(IcError::MissingCache {
            library: library.clone(),
        });
    }

    if mode == FingerprintMode::Content {
        for info in found.values() {
            let current = LibraryHasher::fingerprint(&info.library)?;
            if info.fingerprint != Some(current) {
                return Err(IcError::OutdatedCache {
                    cache_dir: info.cache_dir.clone(),
                    library: info.library.clone(),
                });
            }
        }
    }

    info!(caches = found.len(), ?mode, "cache set is valid");
    Ok(found)
}

/// Validates the cache set, then reads the IC data of every cache that has
/// some. Keyed by absolute library path.
pub fn load_caches(
    dependencies: &[PathBuf],
    cache_dirs: &[PathBuf],
) -> Result<BTreeMap<PathBuf, SerializedIcData>, IcError> {
    let infos = check_caches(dependencies, cache_dirs)?;
    let mut loaded = BTreeMap::new();
    for (library, info) in infos {
        if !info.has_ic_data {
            continue;
        }
        let (_, data) = read_ic_data(&info.cache_dir)?;
        debug!(library = %library.display(), files = data.files.len(), "loaded IC data");
        loaded.insert(library, data);
    }
    Ok(loaded)
}

/// Writes a cache directory for `library`: the IC data (if any) first, the
/// validity record last.
pub fn build_cache(
    cache_dir: &Path,
    library: &Path,
    data: Option<&SerializedIcData>,
) -> Result<CacheInfo, IcError> {
    CacheBuilder::default().write(cache_dir, library, data, None)
}

/// Outcome of [`CacheBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The existing cache matched the library and was kept.
    UpToDate(CacheInfo),
    /// The cache was (re)written.
    Fresh(CacheInfo),
}

impl BuildOutcome {
    /// The record of the resulting cache.
    pub fn info(&self) -> &CacheInfo {
        match self {
            BuildOutcome::UpToDate(info) | BuildOutcome::Fresh(info) => info,
        }
    }
}

/// Writes cache directories, optionally skipping libraries whose content
/// has not changed.
#[derive(Debug, Clone, Copy)]
pub struct CacheBuilder {
    mode: FingerprintMode,
    ic_sourced: bool,
}

impl Default for CacheBuilder {
    fn default() -> Self {
        Self {
            mode: FingerprintMode::Path,
            ic_sourced: true,
        }
    }
}

impl CacheBuilder {
    /// Creates a builder in `mode`.
    pub fn new(mode: FingerprintMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Creates a builder in the `[cache]` fingerprint mode of `config`.
    pub fn from_config(config: &IcConfig) -> Self {
        Self::new(config.cache.fingerprint)
    }

    /// Sets whether written IC data is marked as IC-sourced.
    pub fn ic_sourced(mut self, ic_sourced: bool) -> Self {
        self.ic_sourced = ic_sourced;
        self
    }

    /// The fingerprint mode.
    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Builds the cache of `library` in `cache_dir`.
    ///
    /// In content mode an existing cache whose fingerprint matches is kept
    /// and `produce` is not called. Otherwise `produce` supplies the IC data
    /// and the directory is rewritten.
    pub fn build<F>(&self, cache_dir: &Path, library: &Path, produce: F) -> Result<BuildOutcome, IcError>
    where
        F: FnOnce() -> Result<Option<SerializedIcData>, IcError>,
    {
        let library = absolute_library_path(library)?;
        let fingerprint = match self.mode {
            FingerprintMode::Path => None,
            FingerprintMode::Content => Some(LibraryHasher::fingerprint(&library)?),
        };

        if fingerprint.is_some() {
            if let Ok(existing) = CacheInfo::load(cache_dir) {
                if existing.library == library && existing.fingerprint == fingerprint {
                    debug!(library = %library.display(), "cache is up to date");
                    return Ok(BuildOutcome::UpToDate(existing));
                }
            }
        }

        let data = produce()?;
        let info = self.write(cache_dir, &library, data.as_ref(), fingerprint)?;
        Ok(BuildOutcome::Fresh(info))
    }

    fn write(
        &self,
        cache_dir: &Path,
        library: &Path,
        data: Option<&SerializedIcData>,
        fingerprint: Option<pir_common::ContentHash>,
    ) -> Result<CacheInfo, IcError> {
        let library = absolute_library_path(library)?;
        let mut info = CacheInfo::new(cache_dir, library);
        info.fingerprint = fingerprint;

        let stale_data = crate::layout::ic_data_path(cache_dir);
        match data {
            Some(data) => {
                write_ic_data(cache_dir, data, self.ic_sourced)?;
                info.has_ic_data = true;
            }
            None if stale_data.exists() => {
                std::fs::remove_file(&stale_data).map_err(|e| IcError::io(&stale_data, e))?;
            }
            None => {}
        }

        info.save()?;
        info!(
            cache_dir = %cache_dir.display(),
            library = %info.library.display(),
            has_ic_data = info.has_ic_data,
            "built cache"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SerializedIcDataForFile;

    fn cache_for(root: &Path, name: &str) -> PathBuf {
        let dir = root.join("cache").join(name);
        build_cache(&dir, &PathBuf::from("/libs").join(name), None).unwrap();
        dir
    }

    fn libs(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/libs").join(n)).collect()
    }

    #[test]
    fn matching_set_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![cache_for(dir.path(), "A"), cache_for(dir.path(), "B")];
        let infos = check_caches(&libs(&["A", "B"]), &dirs).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[&PathBuf::from("/libs/A")].cache_dir, dirs[0]);
    }

    #[test]
    fn uncovered_dependency_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![cache_for(dir.path(), "A")];
        let err = check_caches(&libs(&["A", "B"]), &dirs).unwrap_err();
        match err {
            IcError::MissingCache { library } => assert_eq!(library, PathBuf::from("/libs/B")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn orphan_cache_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![cache_for(dir.path(), "A"), cache_for(dir.path(), "C")];
        let err = check_caches(&libs(&["A"]), &dirs).unwrap_err();
        match err {
            IcError::StaleCache { cache_dir, library } => {
                assert_eq!(cache_dir, dirs[1]);
                assert_eq!(library, PathBuf::from("/libs/C"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn directory_without_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let err = check_caches(&libs(&["A"]), &[empty]).unwrap_err();
        assert!(matches!(err, IcError::MissingCacheInfo { .. }));
    }

    #[test]
    fn relative_library_paths_are_made_absolute() {
        let path = absolute_library_path(Path::new("libs/L")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("libs/L"));
    }

    #[test]
    fn load_caches_reads_only_caches_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let with_data = dir.path().join("cache").join("A");
        let data = SerializedIcData {
            files: vec![SerializedIcDataForFile::new("a.kt", "a")],
        };
        build_cache(&with_data, Path::new("/libs/A"), Some(&data)).unwrap();
        let without = cache_for(dir.path(), "B");

        let loaded = load_caches(&libs(&["A", "B"]), &[with_data, without]).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&PathBuf::from("/libs/A")], data);
    }

    #[test]
    fn rebuilding_without_data_removes_old_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        build_cache(&cache, Path::new("/libs/A"), Some(&SerializedIcData::default())).unwrap();
        let info = build_cache(&cache, Path::new("/libs/A"), None).unwrap();
        assert!(!info.has_ic_data);
        assert!(!crate::layout::ic_data_path(&cache).exists());
    }

    #[test]
    fn content_mode_skips_unchanged_library() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.klib");
        std::fs::write(&lib, b"one").unwrap();
        let cache = dir.path().join("cache");
        let builder = CacheBuilder::new(FingerprintMode::Content);

        let first = builder.build(&cache, &lib, || Ok(None)).unwrap();
        assert!(matches!(first, BuildOutcome::Fresh(_)));

        let second = builder
            .build(&cache, &lib, || panic!("unchanged library must not be rebuilt"))
            .unwrap();
        assert!(matches!(second, BuildOutcome::UpToDate(_)));

        std::fs::write(&lib, b"two").unwrap();
        let third = builder.build(&cache, &lib, || Ok(None)).unwrap();
        assert!(matches!(third, BuildOutcome::Fresh(_)));
    }

    #[test]
    fn content_check_reports_outdated_cache() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib.klib");
        std::fs::write(&lib, b"one").unwrap();
        let cache = dir.path().join("cache");
        CacheBuilder::new(FingerprintMode::Content)
            .build(&cache, &lib, || Ok(None))
            .unwrap();

        let deps = vec![lib.clone()];
        let dirs = vec![cache];
        check_caches_with(&deps, &dirs, FingerprintMode::Content).unwrap();

        std::fs::write(&lib, b"two").unwrap();
        let err = check_caches_with(&deps, &dirs, FingerprintMode::Content).unwrap_err();
        assert!(matches!(err, IcError::OutdatedCache { .. }));
        // Path mode does not look at content.
        check_caches(&deps, &dirs).unwrap();
    }
}
