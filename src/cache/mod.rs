//! In-memory LRU cache of built graphs.
//!
//! Entries are keyed twice: by opaque [`GraphId`] (the handle callers hold)
//! and by [`BuildSignature`] (so an unchanged project is never rebuilt). The
//! table lock is only held for bookkeeping, never across a build. Concurrent
//! requests for a signature that is already being built wait on a condvar for
//! that build instead of starting their own.
use crate::errors::CallGraphError;
use crate::graph::{BuildConfig, BuildSignature, CallGraph};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_CAPACITY: usize = 8;

/// Handle to a cached graph. Only meaningful within the process that built it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GraphId(String);

impl GraphId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GraphId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub graph_id: GraphId,
    pub graph: Arc<CallGraph>,
    pub signature: BuildSignature,
    /// Logical clock value of the last insert or lookup.
    pub last_access: u64,
}

/// Result of [`GraphCache::get_or_build`].
#[derive(Debug, Clone)]
pub struct Lookup {
    pub graph_id: GraphId,
    pub graph: Arc<CallGraph>,
    /// True when an existing entry satisfied the request.
    pub cached: bool,
}

/// Summary row for [`GraphCache::list`].
#[derive(Debug, Clone, Serialize)]
pub struct CachedGraphInfo {
    pub graph_id: GraphId,
    pub root: PathBuf,
    pub config: BuildConfig,
    pub nodes: usize,
    pub edges: usize,
    pub last_access: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<GraphId, CacheEntry>,
    by_signature: HashMap<BuildSignature, GraphId>,
    in_flight: HashSet<BuildSignature>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, id: &GraphId) -> Option<Arc<CallGraph>> {
        let now = self.tick();
        let entry = self.entries.get_mut(id)?;
        entry.last_access = now;
        Some(Arc::clone(&entry.graph))
    }

    fn remove(&mut self, id: &GraphId) -> Option<CacheEntry> {
        let entry = self.entries.remove(id)?;
        if self.by_signature.get(&entry.signature) == Some(id) {
            self.by_signature.remove(&entry.signature);
        }
        Some(entry)
    }

    fn evict_over(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let Some(oldest) = self
                .entries
                .values()
                .min_by_key(|e| e.last_access)
                .map(|e| e.graph_id.clone())
            else {
                break;
            };
            self.remove(&oldest);
            debug!(graph_id = %oldest, "evicted least recently used graph");
        }
    }
}

#[derive(Debug)]
pub struct GraphCache {
    capacity: usize,
    state: Mutex<CacheState>,
    build_done: Condvar,
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Clears the in-flight marker even if the build errors or panics.
struct InFlightGuard<'c> {
    cache: &'c GraphCache,
    signature: BuildSignature,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.cache.state.lock().in_flight.remove(&self.signature);
        self.cache.build_done.notify_all();
    }
}

impl GraphCache {
    /// A cache holding at most `capacity` graphs (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), state: Mutex::new(CacheState::default()), build_done: Condvar::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the graph for `signature`, building it with `build` on a miss.
    ///
    /// # Errors
    /// Propagates the builder's error; nothing is inserted in that case.
    pub fn get_or_build<F>(&self, signature: &BuildSignature, build: F) -> Result<Lookup, CallGraphError>
    where
        F: FnOnce() -> Result<CallGraph, CallGraphError>,
    {
        self.lookup_or_build(signature, false, build)
    }

    /// Build unconditionally and replace any entry with the same signature.
    ///
    /// # Errors
    /// Propagates the builder's error; the existing entry is kept in that case.
    pub fn rebuild<F>(&self, signature: &BuildSignature, build: F) -> Result<Lookup, CallGraphError>
    where
        F: FnOnce() -> Result<CallGraph, CallGraphError>,
    {
        self.lookup_or_build(signature, true, build)
    }

    fn lookup_or_build<F>(&self, signature: &BuildSignature, force: bool, build: F) -> Result<Lookup, CallGraphError>
    where
        F: FnOnce() -> Result<CallGraph, CallGraphError>,
    {
        let mut state = self.state.lock();
        loop {
            if !force {
                if let Some(id) = state.by_signature.get(signature).cloned() {
                    if let Some(graph) = state.touch(&id) {
                        debug!(graph_id = %id, "graph cache hit");
                        return Ok(Lookup { graph_id: id, graph, cached: true });
                    }
                }
            }
            if state.in_flight.insert(signature.clone()) {
                break;
            }
            // another caller is building this signature
            self.build_done.wait(&mut state);
        }
        drop(state);

        let _guard = InFlightGuard { cache: self, signature: signature.clone() };
        let graph = Arc::new(build()?);
        let graph_id = GraphId::generate();

        let mut state = self.state.lock();
        if let Some(previous) = state.by_signature.get(signature).cloned() {
            if !force {
                // `replace` moved an entry onto this signature while we built; its id stays valid
                if let Some(graph) = state.touch(&previous) {
                    debug!(graph_id = %previous, "graph appeared during build");
                    return Ok(Lookup { graph_id: previous, graph, cached: true });
                }
            }
            state.remove(&previous);
        }
        let now = state.tick();
        state.entries.insert(
            graph_id.clone(),
            CacheEntry {
                graph_id: graph_id.clone(),
                graph: Arc::clone(&graph),
                signature: signature.clone(),
                last_access: now,
            },
        );
        state.by_signature.insert(signature.clone(), graph_id.clone());
        state.evict_over(self.capacity);
        info!(graph_id = %graph_id, entries = state.entries.len(), "cached new graph");
        Ok(Lookup { graph_id, graph, cached: false })
    }

    /// Fetch a graph and mark it as recently used.
    ///
    /// # Errors
    /// `UnknownGraph` if the id was never issued, was evicted, or was cleared.
    pub fn get(&self, id: &GraphId) -> Result<Arc<CallGraph>, CallGraphError> {
        self.state.lock().touch(id).ok_or_else(|| CallGraphError::UnknownGraph(id.to_string()))
    }

    /// Swap the graph behind `id` for a freshly built one with a new signature.
    ///
    /// If another entry already holds `signature`, the stale entry is dropped
    /// and that entry's id is returned instead.
    ///
    /// # Errors
    /// `UnknownGraph` if `id` is no longer cached.
    pub fn replace(&self, id: &GraphId, signature: BuildSignature, graph: CallGraph) -> Result<GraphId, CallGraphError> {
        let mut state = self.state.lock();
        if !state.entries.contains_key(id) {
            return Err(CallGraphError::UnknownGraph(id.to_string()));
        }
        if let Some(existing) = state.by_signature.get(&signature).cloned() {
            if &existing != id {
                state.remove(id);
                state.touch(&existing);
                return Ok(existing);
            }
        }
        let now = state.tick();
        let old_signature = match state.entries.get_mut(id) {
            Some(entry) => {
                let old = std::mem::replace(&mut entry.signature, signature.clone());
                entry.graph = Arc::new(graph);
                entry.last_access = now;
                old
            }
            None => return Err(CallGraphError::UnknownGraph(id.to_string())),
        };
        state.by_signature.remove(&old_signature);
        state.by_signature.insert(signature, id.clone());
        Ok(id.clone())
    }

    /// Signature the entry was built from, without touching recency.
    #[must_use]
    pub fn signature_of(&self, id: &GraphId) -> Option<BuildSignature> {
        self.state.lock().entries.get(id).map(|e| e.signature.clone())
    }

    /// Remove one entry, or all of them when `id` is `None`. Returns how many were removed.
    ///
    /// # Errors
    /// `UnknownGraph` when a specific id is not cached.
    pub fn clear(&self, id: Option<&GraphId>) -> Result<usize, CallGraphError> {
        let mut state = self.state.lock();
        match id {
            Some(id) => state
                .remove(id)
                .map(|_| 1)
                .ok_or_else(|| CallGraphError::UnknownGraph(id.to_string())),
            None => {
                let n = state.entries.len();
                state.entries.clear();
                state.by_signature.clear();
                Ok(n)
            }
        }
    }

    /// Cached graphs, most recently used first.
    #[must_use]
    pub fn list(&self) -> Vec<CachedGraphInfo> {
        let state = self.state.lock();
        let mut out: Vec<CachedGraphInfo> = state
            .entries
            .values()
            .map(|e| CachedGraphInfo {
                graph_id: e.graph_id.clone(),
                root: e.graph.root.clone(),
                config: e.graph.build_config,
                nodes: e.graph.nodes.len(),
                edges: e.graph.edges.len(),
                last_access: e.last_access,
            })
            .collect();
        out.sort_by(|a, b| b.last_access.cmp(&a.last_access));
        out
    }
}
