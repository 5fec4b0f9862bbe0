//! Graph construction.
//!
//! Parsing and per-file resolution run in parallel with rayon; the symbol
//! index in between is built once and shared read-only. Everything that ends
//! up in the graph goes through ordered maps, so two builds over the same
//! inputs produce identical node and edge sets.
use super::resolver::{resolver_for, CallContext, CallResolver, DefRef, Resolution, SymbolIndex};
use super::{
    BuildConfig, BuildReport, CallGraph, Edge, Granularity, LineRange, Node, NodeId, NodeKind,
    ParseFailure, ResolutionMethod,
};
use crate::errors::CallGraphError;
use crate::parser::{CallSite, DefinitionKind, ParsedFile, PythonParser};
use crate::utils::file_walker::SourceFile;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

type EdgeMap = BTreeMap<(NodeId, NodeId), Edge>;

/// Fingerprint of a build's inputs: root, sorted (path, size, mtime) triples,
/// and the build configuration. Equal signatures mean a cached graph is reusable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildSignature(String);

impl BuildSignature {
    #[must_use]
    pub fn compute(root: &Path, files: &[SourceFile], config: &BuildConfig) -> Self {
        let mut sorted: Vec<&SourceFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        let mut hasher = blake3::Hasher::new();
        hasher.update(root.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        for f in sorted {
            hasher.update(f.rel_path.as_bytes());
            hasher.update(&[0]);
            hasher.update(&f.len.to_le_bytes());
            hasher.update(&f.mtime_ns.to_le_bytes());
        }
        let flags = format!(
            "granularity={};include_external={};strategy={}",
            config.granularity, config.include_external, config.strategy
        );
        hasher.update(flags.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct ResolvedCall<'a> {
    caller: NodeId,
    site: &'a CallSite,
    resolution: Resolution,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    config: BuildConfig,
}

impl GraphBuilder {
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    /// Build a call graph over `files`, all located under `root`.
    ///
    /// Files that fail to parse are skipped and listed in the graph's
    /// [`BuildReport`]; unresolvable calls become data, never errors.
    ///
    /// # Errors
    /// Only fails if the Python grammar cannot be loaded at all.
    pub fn build(&self, root: &Path, files: &[SourceFile]) -> Result<CallGraph, CallGraphError> {
        let started = Instant::now();
        let signature = BuildSignature::compute(root, files, &self.config);
        PythonParser::new()
            .map_err(|source| CallGraphError::ParseError { file: root.to_path_buf(), source })?;

        debug!(files = files.len(), strategy = %self.config.strategy, "parsing python sources");
        let outcomes: Vec<Result<ParsedFile, ParseFailure>> = files
            .par_iter()
            .map_init(PythonParser::new, |parser, file| {
                let result = match parser {
                    Ok(p) => p.parse_path(&file.path, &file.rel_path).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                result.map_err(|message| ParseFailure { path: file.rel_path.clone(), message })
            })
            .collect();

        let mut parsed = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(p) => parsed.push(p),
                Err(f) => {
                    warn!(path = %f.path, error = %f.message, "skipping file that failed to parse");
                    failures.push(f);
                }
            }
        }
        parsed.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let index = SymbolIndex::new(&parsed);
        let resolver = resolver_for(self.config.strategy);
        debug!(resolver = resolver.name(), "resolving call sites");
        let resolved: Vec<ResolvedCall<'_>> = (0..parsed.len())
            .into_par_iter()
            .flat_map_iter(|fi| resolve_file(&index, resolver.as_ref(), fi))
            .collect();

        let mut report = BuildReport {
            files_parsed: parsed.len(),
            parse_failures: failures,
            calls_total: resolved.len(),
            ..BuildReport::default()
        };
        let mut internal = EdgeMap::new();
        let mut external = EdgeMap::new();
        for call in resolved {
            match call.resolution {
                Resolution::Resolved { target, method } => {
                    match method {
                        ResolutionMethod::Semantic => report.resolved_semantic += 1,
                        _ => report.resolved_heuristic += 1,
                    }
                    merge_edge(&mut internal, call.caller, index.node_id(target), method, &[call.site.line]);
                }
                Resolution::Unresolved => {
                    report.unresolved += 1;
                    if self.config.include_external && !index.knows_name(&call.site.name) {
                        merge_edge(
                            &mut external,
                            call.caller,
                            NodeId::external(&call.site.callee_text),
                            ResolutionMethod::UnresolvedExternal,
                            &[call.site.line],
                        );
                    }
                }
            }
        }

        let mut nodes = function_nodes(&index);
        if self.config.granularity == Granularity::File {
            (nodes, internal, external) = collapse_to_files(nodes, internal, external);
        }

        let graph = CallGraph::from_parts(
            root.to_path_buf(),
            nodes,
            finish_edges(internal),
            finish_edges(external),
            self.config,
            signature,
            report,
        );
        info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            external_edges = graph.external_edges.len(),
            parse_failures = graph.report.parse_failures.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "call graph built"
        );
        Ok(graph)
    }
}

fn resolve_file<'a>(
    index: &'a SymbolIndex<'a>,
    resolver: &dyn CallResolver,
    fi: usize,
) -> Vec<ResolvedCall<'a>> {
    let file = index.file(fi);
    let module_caller = NodeId::file(&file.rel_path);
    let module_calls = file.module_calls.iter().map(|c| (module_caller.clone(), None, c));
    let def_calls = file.definitions.iter().enumerate().flat_map(|(di, d)| {
        let caller = index.node_id(DefRef { file: fi, def: di });
        d.calls.iter().map(move |c| (caller.clone(), Some(di), c))
    });
    module_calls
        .chain(def_calls)
        .map(|(caller, scope, site)| ResolvedCall {
            resolution: resolver.resolve(index, &CallContext { file: fi, scope, call: site }),
            caller,
            site,
        })
        .collect()
}

fn function_nodes(index: &SymbolIndex<'_>) -> BTreeMap<NodeId, Node> {
    let mut nodes = BTreeMap::new();
    for (fi, file) in index.files().iter().enumerate() {
        let id = NodeId::file(&file.rel_path);
        nodes.insert(
            id.clone(),
            Node {
                id,
                kind: NodeKind::File,
                file_path: file.rel_path.clone(),
                qualified_name: file.module.clone(),
                line_range: LineRange { start: 1, end: file.line_count.max(1) },
            },
        );
        for (di, def) in file.definitions.iter().enumerate() {
            let id = index.node_id(DefRef { file: fi, def: di });
            let kind = match def.kind {
                DefinitionKind::Class => NodeKind::Class,
                DefinitionKind::Function | DefinitionKind::Method => NodeKind::Function,
            };
            nodes.insert(
                id.clone(),
                Node {
                    id,
                    kind,
                    file_path: file.rel_path.clone(),
                    qualified_name: def.qualified_name.clone(),
                    line_range: LineRange { start: def.line_start, end: def.line_end },
                },
            );
        }
    }
    nodes
}

fn merge_edge(edges: &mut EdgeMap, caller: NodeId, callee: NodeId, method: ResolutionMethod, lines: &[usize]) {
    let edge = edges
        .entry((caller.clone(), callee.clone()))
        .or_insert_with(|| Edge { caller, callee, resolution: method, call_sites: Vec::new() });
    edge.resolution = edge.resolution.max(method);
    edge.call_sites.extend_from_slice(lines);
}

fn finish_edges(edges: EdgeMap) -> Vec<Edge> {
    edges
        .into_values()
        .map(|mut e| {
            e.call_sites.sort_unstable();
            e.call_sites.dedup();
            e
        })
        .collect()
}

/// Project a function-level graph onto its file nodes. Intra-file edges vanish.
fn collapse_to_files(
    nodes: BTreeMap<NodeId, Node>,
    internal: EdgeMap,
    external: EdgeMap,
) -> (BTreeMap<NodeId, Node>, EdgeMap, EdgeMap) {
    let file_of: HashMap<NodeId, NodeId> =
        nodes.values().map(|n| (n.id.clone(), NodeId::file(&n.file_path))).collect();

    let mut files = EdgeMap::new();
    for edge in internal.into_values() {
        let (Some(a), Some(b)) = (file_of.get(&edge.caller), file_of.get(&edge.callee)) else {
            continue;
        };
        if a != b {
            merge_edge(&mut files, a.clone(), b.clone(), edge.resolution, &edge.call_sites);
        }
    }
    let mut externals = EdgeMap::new();
    for edge in external.into_values() {
        if let Some(a) = file_of.get(&edge.caller) {
            merge_edge(&mut externals, a.clone(), edge.callee, edge.resolution, &edge.call_sites);
        }
    }

    let file_nodes = nodes.into_iter().filter(|(_, n)| n.kind == NodeKind::File).collect();
    (file_nodes, files, externals)
}
