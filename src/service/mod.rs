//! In-process operation surface: everything a transport layer or the CLI
//! needs, keyed by [`GraphId`] handles into one shared [`GraphCache`].
use crossbeam_channel::RecvTimeoutError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CachedGraphInfo, GraphCache, GraphId, DEFAULT_CAPACITY};
use crate::errors::CallGraphError;
use crate::graph::{BuildConfig, BuildSignature, CallGraph, GraphBuilder, NodeId, ParseFailure};
use crate::query::{
    resolve_target, CalleesQuery, CallersQuery, DependenciesQuery, Direction, PathResult, Query, SearchHit,
    SearchQuery, ShortestPathQuery,
};
use crate::stats::{overview, Overview};
use crate::utils::file_walker::{python_files, SourceFile};
use crate::visualization::{export_subgraph, Export, ExportOptions};

#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub root: PathBuf,
    pub config: BuildConfig,
    /// Walk files even if `.gitignore`/`.ignore` exclude them.
    pub no_ignore: bool,
    pub timeout: Option<Duration>,
    pub force_rebuild: bool,
}

impl BuildRequest {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: BuildConfig) -> Self {
        Self { root: root.into(), config, ..Self::default() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub graph_id: GraphId,
    pub cached: bool,
    pub root: PathBuf,
    pub config: BuildConfig,
    pub signature: BuildSignature,
    pub nodes: usize,
    pub edges: usize,
    pub external_edges: usize,
    pub parse_failures: Vec<ParseFailure>,
}

impl BuildOutcome {
    fn new(graph_id: GraphId, cached: bool, graph: &CallGraph) -> Self {
        Self {
            graph_id,
            cached,
            root: graph.root.clone(),
            config: graph.build_config,
            signature: graph.build_signature.clone(),
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
            external_edges: graph.external_edges.len(),
            parse_failures: graph.report.parse_failures.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Callers,
    Callees,
    Dependencies,
    ReverseDependencies,
    Path,
}

impl FromStr for QueryKind {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "callers" | "incoming" | "used_by" => Ok(QueryKind::Callers),
            "callees" | "outgoing" | "calls" => Ok(QueryKind::Callees),
            "dependencies" | "deps" | "reachable" => Ok(QueryKind::Dependencies),
            "reverse_dependencies" | "rev_deps" | "reverse_deps" => Ok(QueryKind::ReverseDependencies),
            "path" | "shortest_path" => Ok(QueryKind::Path),
            other => Err(CallGraphError::Query(format!("unknown query type '{other}'"))),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryKind::Callers => "callers",
            QueryKind::Callees => "callees",
            QueryKind::Dependencies => "dependencies",
            QueryKind::ReverseDependencies => "reverse_dependencies",
            QueryKind::Path => "path",
        })
    }
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub target: String,
    /// Destination for [`QueryKind::Path`].
    pub path_target: Option<String>,
    pub depth: usize,
    pub direction: Direction,
}

impl QueryRequest {
    #[must_use]
    pub fn new(kind: QueryKind, target: &str) -> Self {
        Self { kind, target: target.to_string(), path_target: None, depth: 1, direction: Direction::Out }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryOutput {
    Nodes { kind: QueryKind, target: NodeId, nodes: Vec<NodeId> },
    Reachable { kind: QueryKind, target: NodeId, depth: usize, direction: Direction, hops: BTreeMap<NodeId, usize> },
    Path { from: NodeId, to: NodeId, result: PathResult },
}

/// What the optional call-certainty classifier consumes.
#[derive(Debug, Clone, Serialize)]
pub struct CallContext {
    pub target: NodeId,
    pub source: String,
    pub callees: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub graph_id: GraphId,
    pub rebuilt: bool,
}

#[derive(Debug)]
pub struct GraphService {
    cache: GraphCache,
}

impl Default for GraphService {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl GraphService {
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self { cache: GraphCache::new(cache_capacity) }
    }

    #[must_use]
    pub fn cache(&self) -> &GraphCache {
        &self.cache
    }

    /// Build (or reuse) the graph for `req.root`.
    ///
    /// # Errors
    /// `Io` if the root cannot be resolved, `BuildTimeout` if the build exceeds
    /// `req.timeout`; in either case nothing is cached.
    pub fn build(&self, req: &BuildRequest) -> Result<BuildOutcome, CallGraphError> {
        let root = canonical_root(&req.root)?;
        let files = python_files(&root, req.no_ignore);
        let signature = BuildSignature::compute(&root, &files, &req.config);
        debug!(root = %root.display(), files = files.len(), signature = %signature, "build requested");

        let config = req.config;
        let timeout = req.timeout;
        let job = move || build_graph(config, root, files, timeout);
        let lookup = if req.force_rebuild {
            self.cache.rebuild(&signature, job)?
        } else {
            self.cache.get_or_build(&signature, job)?
        };
        let outcome = BuildOutcome::new(lookup.graph_id, lookup.cached, &lookup.graph);
        info!(graph_id = %outcome.graph_id, cached = outcome.cached, nodes = outcome.nodes, "build finished");
        Ok(outcome)
    }

    /// # Errors
    /// `UnknownGraph` if `id` is not cached.
    pub fn graph(&self, id: &GraphId) -> Result<Arc<CallGraph>, CallGraphError> {
        self.cache.get(id)
    }

    /// # Errors
    /// `UnknownGraph` if `id` is not cached.
    pub fn overview(&self, id: &GraphId, top_n: usize) -> Result<Overview, CallGraphError> {
        Ok(overview(&*self.graph(id)?, top_n))
    }

    /// # Errors
    /// `UnknownGraph` if `id` is not cached.
    pub fn search(&self, id: &GraphId, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>, CallGraphError> {
        Ok(SearchQuery::new(query, limit).run(&*self.graph(id)?))
    }

    /// # Errors
    /// `UnknownGraph`, or the target resolution errors of [`resolve_target`].
    pub fn resolve(&self, id: &GraphId, reference: &str) -> Result<NodeId, CallGraphError> {
        resolve_target(&*self.graph(id)?, reference)
    }

    /// Run one structural query. Targets may be any reference form accepted by
    /// [`resolve_target`].
    ///
    /// # Errors
    /// `UnknownGraph`, `UnknownNode`, `AmbiguousTarget`, or `Query` when a path
    /// query has no destination.
    pub fn query(&self, id: &GraphId, req: &QueryRequest) -> Result<QueryOutput, CallGraphError> {
        let graph = self.graph(id)?;
        let target = resolve_target(&graph, &req.target)?;
        let output = match req.kind {
            QueryKind::Callers => QueryOutput::Nodes {
                kind: req.kind,
                nodes: CallersQuery::new(target.as_str()).run(&graph)?,
                target,
            },
            QueryKind::Callees => QueryOutput::Nodes {
                kind: req.kind,
                nodes: CalleesQuery::new(target.as_str()).run(&graph)?,
                target,
            },
            QueryKind::Dependencies | QueryKind::ReverseDependencies => {
                let direction = if req.kind == QueryKind::ReverseDependencies { Direction::In } else { req.direction };
                let hops = DependenciesQuery::new(target.as_str(), req.depth, direction).run(&graph)?;
                QueryOutput::Reachable { kind: req.kind, target, depth: req.depth, direction, hops }
            }
            QueryKind::Path => {
                let dest = req
                    .path_target
                    .as_deref()
                    .ok_or_else(|| CallGraphError::Query("path queries need a destination".into()))?;
                let to = resolve_target(&graph, dest)?;
                let result = ShortestPathQuery::new(target.as_str(), to.as_str()).run(&graph)?;
                QueryOutput::Path { from: target, to, result }
            }
        };
        Ok(output)
    }

    /// Export a diagram. `focus` is resolved like a query target.
    ///
    /// # Errors
    /// `UnknownGraph`, or the target resolution errors when `focus` is given.
    pub fn export(&self, id: &GraphId, focus: Option<&str>, mut opts: ExportOptions) -> Result<Export, CallGraphError> {
        let graph = self.graph(id)?;
        opts.focus = focus.map(|f| resolve_target(&graph, f)).transpose()?;
        export_subgraph(&graph, &opts)
    }

    #[must_use]
    pub fn list_cached(&self) -> Vec<CachedGraphInfo> {
        self.cache.list()
    }

    /// # Errors
    /// `UnknownGraph` when a specific id is not cached.
    pub fn clear(&self, id: Option<&GraphId>) -> Result<usize, CallGraphError> {
        self.cache.clear(id)
    }

    /// Rebuild a cached graph in place if its sources changed since it was built.
    ///
    /// The id stays valid. If an equivalent graph is already cached under
    /// another id, that id is returned and the stale entry is dropped.
    ///
    /// # Errors
    /// `UnknownGraph`, or any build error.
    pub fn refresh_if_stale(
        &self,
        id: &GraphId,
        no_ignore: bool,
        timeout: Option<Duration>,
    ) -> Result<RefreshOutcome, CallGraphError> {
        let graph = self.graph(id)?;
        let files = python_files(&graph.root, no_ignore);
        let signature = BuildSignature::compute(&graph.root, &files, &graph.build_config);
        if self.cache.signature_of(id).as_ref() == Some(&signature) {
            debug!(graph_id = %id, "graph is up to date");
            return Ok(RefreshOutcome { graph_id: id.clone(), rebuilt: false });
        }
        info!(graph_id = %id, "sources changed, rebuilding");
        let fresh = build_graph(graph.build_config, graph.root.clone(), files, timeout)?;
        let graph_id = self.cache.replace(id, signature, fresh)?;
        Ok(RefreshOutcome { graph_id, rebuilt: true })
    }

    /// Source text and direct callees of a node.
    ///
    /// # Errors
    /// `UnknownGraph`, target resolution errors, or `Io` if the source file
    /// can no longer be read.
    pub fn call_context(&self, id: &GraphId, reference: &str) -> Result<CallContext, CallGraphError> {
        let graph = self.graph(id)?;
        let target = resolve_target(&graph, reference)?;
        let source = graph.node_source(target.as_str())?;
        let callees = CalleesQuery::new(target.as_str()).run(&graph)?;
        Ok(CallContext { target, source, callees })
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, CallGraphError> {
    let root = std::fs::canonicalize(root)?;
    if !root.is_dir() {
        return Err(CallGraphError::Build(format!("{} is not a directory", root.display())));
    }
    Ok(root)
}

fn build_graph(
    config: BuildConfig,
    root: PathBuf,
    files: Vec<SourceFile>,
    timeout: Option<Duration>,
) -> Result<CallGraph, CallGraphError> {
    run_with_timeout(timeout, move || GraphBuilder::new(config).build(&root, &files))
}

/// Run `job` on a worker thread and give up after `limit`.
///
/// On timeout the worker is left to finish on its own and its result is
/// discarded.
///
/// # Errors
/// `BuildTimeout` past the limit, `Build` if the worker died without a result,
/// otherwise whatever `job` returns.
pub fn run_with_timeout<T, F>(limit: Option<Duration>, job: F) -> Result<T, CallGraphError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CallGraphError> + Send + 'static,
{
    let Some(limit) = limit else {
        return job();
    };
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::Builder::new().name("callgraph-build".into()).spawn(move || {
        // the receiver is gone after a timeout
        let _ = tx.send(job());
    })?;
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX), "build timed out");
            Err(CallGraphError::BuildTimeout { limit })
        }
        Err(RecvTimeoutError::Disconnected) => Err(CallGraphError::Build("build worker exited without a result".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "import b\n\ndef main():\n    b.process()\n").unwrap();
        fs::write(dir.path().join("b.py"), "def process():\n    return 1\n").unwrap();
        dir
    }

    #[test]
    fn query_kind_aliases() {
        assert_eq!("outgoing".parse::<QueryKind>().unwrap(), QueryKind::Callees);
        assert_eq!("used_by".parse::<QueryKind>().unwrap(), QueryKind::Callers);
        assert_eq!("reachable".parse::<QueryKind>().unwrap(), QueryKind::Dependencies);
        assert_eq!("rev-deps".parse::<QueryKind>().unwrap(), QueryKind::ReverseDependencies);
        assert!("sideways".parse::<QueryKind>().is_err());
    }

    #[test]
    fn second_build_is_a_cache_hit() {
        let dir = project();
        let svc = GraphService::new(4);
        let req = BuildRequest::new(dir.path(), BuildConfig::default());
        let first = svc.build(&req).unwrap();
        let second = svc.build(&req).unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.graph_id, second.graph_id);

        let forced = svc.build(&BuildRequest { force_rebuild: true, ..req }).unwrap();
        assert!(!forced.cached);
        assert_eq!(svc.list_cached().len(), 1);
    }

    #[test]
    fn query_accepts_short_references() {
        let dir = project();
        let svc = GraphService::default();
        let id = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap().graph_id;
        let out = svc.query(&id, &QueryRequest::new(QueryKind::Callers, "b.py:process")).unwrap();
        match out {
            QueryOutput::Nodes { target, nodes, .. } => {
                assert_eq!(target.as_str(), "func:b.py:process");
                assert_eq!(nodes, vec![NodeId::from("func:a.py:main")]);
            }
            other => panic!("unexpected output {other:?}"),
        }

        let mut path = QueryRequest::new(QueryKind::Path, "main");
        assert!(matches!(svc.query(&id, &path), Err(CallGraphError::Query(_))));
        path.path_target = Some("process".into());
        match svc.query(&id, &path).unwrap() {
            QueryOutput::Path { result: PathResult::Found { path }, .. } => assert_eq!(path.len(), 2),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn call_context_returns_source_and_callees() {
        let dir = project();
        let svc = GraphService::default();
        let id = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap().graph_id;
        let ctx = svc.call_context(&id, "func:a.py:main").unwrap();
        assert!(ctx.source.starts_with("def main():"));
        assert_eq!(ctx.callees, vec![NodeId::from("func:b.py:process")]);
    }

    #[test]
    fn refresh_rebuilds_only_when_sources_change() {
        let dir = project();
        let svc = GraphService::default();
        let id = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap().graph_id;
        assert!(!svc.refresh_if_stale(&id, false, None).unwrap().rebuilt);

        fs::write(dir.path().join("c.py"), "def extra():\n    pass\n").unwrap();
        let refreshed = svc.refresh_if_stale(&id, false, None).unwrap();
        assert!(refreshed.rebuilt);
        assert_eq!(refreshed.graph_id, id);
        assert!(svc.graph(&id).unwrap().contains("func:c.py:extra"));
    }

    #[test]
    fn unknown_graph_is_reported() {
        let svc = GraphService::default();
        let bogus = GraphId::from("not-a-graph");
        assert!(matches!(svc.overview(&bogus, 5), Err(CallGraphError::UnknownGraph(_))));
        assert!(matches!(svc.clear(Some(&bogus)), Err(CallGraphError::UnknownGraph(_))));
    }

    #[test]
    fn slow_job_times_out() {
        let err = run_with_timeout(Some(Duration::from_millis(20)), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(1)
        })
        .unwrap_err();
        assert!(matches!(err, CallGraphError::BuildTimeout { .. }));
        assert_eq!(run_with_timeout(Some(Duration::from_secs(5)), || Ok(7)).unwrap(), 7);
        assert_eq!(run_with_timeout(None, || Ok(3)).unwrap(), 3);
    }
}
