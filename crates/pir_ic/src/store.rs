//! Process-wide memo of built IC data.
//!
//! Each library's IC data is built at most once per process and then shared
//! by every dependent compilation. Concurrent requests for the same library
//! wait on the single build in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing::{debug, info};

use crate::error::IcError;
use crate::validity::absolute_library_path;
use crate::wire::SerializedIcData;

type Slot = Arc<Mutex<Option<Arc<SerializedIcData>>>>;

/// Get-or-build-once cache of IC data, keyed by absolute library path.
#[derive(Debug, Default)]
pub struct IcCacheStore {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Entries are written once under the lock, a panicking builder leaves
    // the slot empty.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IcCacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide store.
    pub fn global() -> &'static IcCacheStore {
        static STORE: OnceLock<IcCacheStore> = OnceLock::new();
        STORE.get_or_init(IcCacheStore::new)
    }

    /// Returns the IC data of `library`, running `build` if it has not been
    /// built yet. A failed build leaves no entry behind.
    pub fn get_or_build<F>(&self, library: &Path, build: F) -> Result<Arc<SerializedIcData>, IcError>
    where
        F: FnOnce() -> Result<SerializedIcData, IcError>,
    {
        let key = absolute_library_path(library)?;
        let slot = lock(&self.slots).entry(key.clone()).or_default().clone();

        let mut entry = lock(&slot);
        if let Some(data) = entry.as_ref() {
            debug!(library = %key.display(), "IC data store hit");
            return Ok(Arc::clone(data));
        }

        match build() {
            Ok(data) => {
                let data = Arc::new(data);
                *entry = Some(Arc::clone(&data));
                info!(library = %key.display(), files = data.files.len(), "built IC data");
                Ok(data)
            }
            Err(err) => {
                drop(entry);
                let mut slots = lock(&self.slots);
                // A waiter holding the slot is about to retry the build.
                let unused = slots.get(&key).is_some_and(|s| {
                    Arc::ptr_eq(s, &slot) && matches!(s.try_lock(), Ok(entry) if entry.is_none())
                });
                if unused {
                    slots.remove(&key);
                }
                Err(err)
            }
        }
    }

    /// The IC data of `library` if it has been built.
    pub fn get(&self, library: &Path) -> Option<Arc<SerializedIcData>> {
        let key = absolute_library_path(library).ok()?;
        let slot = lock(&self.slots).get(&key)?.clone();
        let entry = lock(&slot);
        entry.clone()
    }

    /// Number of libraries with built IC data.
    pub fn len(&self) -> usize {
        lock(&self.slots).values().filter(|s| lock(s).is_some()).count()
    }

    /// Whether no library has been built.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SerializedIcDataForFile;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn data(path: &str) -> SerializedIcData {
        SerializedIcData {
            files: vec![SerializedIcDataForFile::new(path, "lib")],
        }
    }

    #[test]
    fn builds_once() {
        let store = IcCacheStore::new();
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(data("a.kt"))
        };
        let first = store.get_or_build(Path::new("/libs/A"), build).unwrap();
        let second = store
            .get_or_build(Path::new("/libs/A"), || panic!("built twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_build_leaves_no_entry() {
        let store = IcCacheStore::new();
        let err = store
            .get_or_build(Path::new("/libs/A"), || {
                Err(IcError::MissingCache {
                    library: PathBuf::from("/libs/A"),
                })
            })
            .unwrap_err();
        assert!(matches!(err, IcError::MissingCache { .. }));
        assert!(store.get(Path::new("/libs/A")).is_none());
        assert!(store.is_empty());

        let built = store
            .get_or_build(Path::new("/libs/A"), || Ok(data("a.kt")))
            .unwrap();
        assert_eq!(built.files[0].path, "a.kt");
    }

    #[test]
    fn libraries_are_independent() {
        let store = IcCacheStore::new();
        store.get_or_build(Path::new("/libs/A"), || Ok(data("a.kt"))).unwrap();
        store.get_or_build(Path::new("/libs/B"), || Ok(data("b.kt"))).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(Path::new("/libs/B")).unwrap().files[0].path, "b.kt");
    }

    #[test]
    fn concurrent_requests_share_one_build() {
        let store = Arc::new(IcCacheStore::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    store
                        .get_or_build(Path::new("/libs/shared"), || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(10));
                            Ok(data("s.kt"))
                        })
                        .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn global_is_shared() {
        assert!(std::ptr::eq(IcCacheStore::global(), IcCacheStore::global()));
    }
}
