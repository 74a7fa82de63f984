//! Library dependency ordering.
//!
//! A library's IC data can only be built after the IC data of everything it
//! depends on, so caches are prepared in topological order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use tracing::debug;

use crate::error::IcError;
use crate::store::IcCacheStore;
use crate::wire::SerializedIcData;

/// Libraries and their dependency edges. An edge points from a dependency to
/// its dependent.
#[derive(Debug, Clone, Default)]
pub struct LibraryGraph {
    graph: DiGraph<PathBuf, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl LibraryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a library, returning its node. Adding it twice is a no-op.
    pub fn add_library(&mut self, library: impl Into<PathBuf>) -> NodeIndex {
        let library = library.into();
        if let Some(&idx) = self.index.get(&library) {
            return idx;
        }
        let idx = self.graph.add_node(library.clone());
        self.index.insert(library, idx);
        idx
    }

    /// Records that `library` depends on `dependency`.
    pub fn add_dependency(&mut self, library: impl Into<PathBuf>, dependency: impl Into<PathBuf>) {
        let lib = self.add_library(library);
        let dep = self.add_library(dependency);
        self.graph.update_edge(dep, lib, ());
    }

    /// Number of libraries.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph has no libraries.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All libraries, dependencies before dependents.
    pub fn topological_order(&self) -> Result<Vec<PathBuf>, IcError> {
        let order = toposort(&self.graph, None).map_err(|cycle| IcError::DependencyCycle {
            library: self.graph[cycle.node_id()].clone(),
        })?;
        Ok(order.into_iter().map(|idx| self.graph[idx].clone()).collect())
    }

    /// Every library `library` depends on, directly or not, sorted by path.
    pub fn transitive_dependencies(&self, library: &Path) -> Vec<PathBuf> {
        let Some(&start) = self.index.get(library) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut deps = Vec::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                deps.push(self.graph[idx].clone());
            }
        }
        deps.sort();
        deps
    }
}

/// Builds the IC data of every library in `graph` through `store`, in
/// dependency order. Libraries already in the store are not rebuilt.
pub fn prepare_ic_caches<F>(
    graph: &LibraryGraph,
    store: &IcCacheStore,
    mut build: F,
) -> Result<Vec<(PathBuf, Arc<SerializedIcData>)>, IcError>
where
    F: FnMut(&Path) -> Result<SerializedIcData, IcError>,
{
    let order = graph.topological_order()?;
    debug!(libraries = order.len(), "preparing IC caches");
    let mut prepared = Vec::with_capacity(order.len());
    for library in order {
        let data = store.get_or_build(&library, || build(&library))?;
        prepared.push((library, data));
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> LibraryGraph {
        // app -> ui -> core, app -> core
        let mut g = LibraryGraph::new();
        g.add_dependency("/libs/app", "/libs/ui");
        g.add_dependency("/libs/ui", "/libs/core");
        g.add_dependency("/libs/app", "/libs/core");
        g
    }

    fn position(order: &[PathBuf], lib: &str) -> usize {
        order.iter().position(|p| p == Path::new(lib)).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let order = graph().topological_order().unwrap();
        assert_eq!(order.len(), 3);
        assert!(position(&order, "/libs/core") < position(&order, "/libs/ui"));
        assert!(position(&order, "/libs/ui") < position(&order, "/libs/app"));
    }

    #[test]
    fn cycle_is_reported() {
        let mut g = graph();
        g.add_dependency("/libs/core", "/libs/app");
        let err = g.topological_order().unwrap_err();
        assert!(matches!(err, IcError::DependencyCycle { .. }));
    }

    #[test]
    fn transitive_dependencies_follow_chains() {
        let g = graph();
        assert_eq!(
            g.transitive_dependencies(Path::new("/libs/app")),
            vec![PathBuf::from("/libs/core"), PathBuf::from("/libs/ui")]
        );
        assert!(g.transitive_dependencies(Path::new("/libs/core")).is_empty());
        assert!(g.transitive_dependencies(Path::new("/libs/unknown")).is_empty());
    }

    #[test]
    fn adding_twice_keeps_one_node() {
        let mut g = LibraryGraph::new();
        let a = g.add_library("/libs/a");
        assert_eq!(g.add_library("/libs/a"), a);
        g.add_dependency("/libs/b", "/libs/a");
        g.add_dependency("/libs/b", "/libs/a");
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn prepare_builds_in_order_once() {
        let store = IcCacheStore::new();
        let mut built = Vec::new();
        let prepared = prepare_ic_caches(&graph(), &store, |lib| {
            built.push(lib.to_path_buf());
            Ok(SerializedIcData::default())
        })
        .unwrap();
        assert_eq!(prepared.len(), 3);
        assert_eq!(built.first().unwrap(), Path::new("/libs/core"));
        assert_eq!(built.last().unwrap(), Path::new("/libs/app"));

        prepare_ic_caches(&graph(), &store, |_| panic!("already prepared")).unwrap();
    }
}
