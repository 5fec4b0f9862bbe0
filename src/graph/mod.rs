//! Call graph model.
//!
//! A [`CallGraph`] is a flat arena: nodes keyed by [`NodeId`], a deduplicated
//! edge list, and caller/callee adjacency indices derived from the edges. It is
//! produced once by [`builder::GraphBuilder`] and never mutated afterwards, so
//! any number of readers can share it behind an `Arc`.
//!
//! Node ids are strings of the form `file:<rel>`, `class:<rel>:<Qual>` and
//! `func:<rel>:<Qual>`. Calls that could not be resolved anywhere in the
//! project may point at `external:<callee>` placeholders, which live only in
//! [`CallGraph::external_edges`].
use crate::errors::CallGraphError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod builder;
pub mod resolver;

pub use builder::{BuildSignature, GraphBuilder};

const EXTERNAL_PREFIX: &str = "external:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    #[must_use]
    pub fn file(rel_path: &str) -> Self {
        Self(format!("file:{rel_path}"))
    }

    #[must_use]
    pub fn class(rel_path: &str, qualified_name: &str) -> Self {
        Self(format!("class:{rel_path}:{qualified_name}"))
    }

    #[must_use]
    pub fn func(rel_path: &str, qualified_name: &str) -> Self {
        Self(format!("func:{rel_path}:{qualified_name}"))
    }

    #[must_use]
    pub fn external(callee_text: &str) -> Self {
        Self(format!("{EXTERNAL_PREFIX}{callee_text}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        self.0.starts_with(EXTERNAL_PREFIX)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Class,
    #[serde(rename = "func")]
    Function,
}

impl NodeKind {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "func",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub file_path: String,
    pub qualified_name: String,
    pub line_range: LineRange,
}

/// How a call edge's target was determined. Ordered weakest to strongest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    UnresolvedExternal,
    Heuristic,
    Semantic,
}

impl ResolutionMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionMethod::Semantic => "semantic",
            ResolutionMethod::Heuristic => "heuristic",
            ResolutionMethod::UnresolvedExternal => "unresolved_external",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub caller: NodeId,
    pub callee: NodeId,
    pub resolution: ResolutionMethod,
    /// Sorted, deduplicated line numbers of the call sites (caller's file).
    pub call_sites: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Function,
    File,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStrategy {
    #[default]
    Semantic,
    #[serde(alias = "fast")]
    Heuristic,
}

impl FromStr for Granularity {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "function" | "func" => Ok(Granularity::Function),
            "file" => Ok(Granularity::File),
            other => Err(CallGraphError::Config(format!("unknown granularity '{other}'"))),
        }
    }
}

impl FromStr for ResolveStrategy {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" | "precise" => Ok(ResolveStrategy::Semantic),
            "heuristic" | "fast" | "fallback" | "fallback_only" => Ok(ResolveStrategy::Heuristic),
            other => Err(CallGraphError::Config(format!("unknown resolve strategy '{other}'"))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Function => "function",
            Granularity::File => "file",
        })
    }
}

impl fmt::Display for ResolveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolveStrategy::Semantic => "semantic",
            ResolveStrategy::Heuristic => "heuristic",
        })
    }
}

/// Options that shape a build; part of the build signature.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BuildConfig {
    pub granularity: Granularity,
    pub include_external: bool,
    pub strategy: ResolveStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseFailure {
    pub path: String,
    pub message: String,
}

/// Per-build bookkeeping: what was skipped and how calls were resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildReport {
    pub files_parsed: usize,
    pub parse_failures: Vec<ParseFailure>,
    pub calls_total: usize,
    pub resolved_semantic: usize,
    pub resolved_heuristic: usize,
    pub unresolved: usize,
}

type Adjacency = BTreeMap<NodeId, BTreeSet<NodeId>>;

#[derive(Debug, Clone, Serialize)]
pub struct CallGraph {
    pub root: PathBuf,
    pub nodes: BTreeMap<NodeId, Node>,
    /// Edges between project nodes, sorted by (caller, callee).
    pub edges: Vec<Edge>,
    /// Edges into `external:` placeholders; excluded from the indices.
    pub external_edges: Vec<Edge>,
    pub build_config: BuildConfig,
    pub build_signature: BuildSignature,
    pub report: BuildReport,
    #[serde(skip)]
    callers_index: Adjacency,
    #[serde(skip)]
    callees_index: Adjacency,
}

impl CallGraph {
    /// Assemble a graph and derive its adjacency indices.
    ///
    /// Edges whose endpoints are not in `nodes` are dropped; every node gets
    /// an (possibly empty) entry in both indices.
    #[must_use]
    pub fn from_parts(
        root: PathBuf,
        nodes: BTreeMap<NodeId, Node>,
        mut edges: Vec<Edge>,
        mut external_edges: Vec<Edge>,
        build_config: BuildConfig,
        build_signature: BuildSignature,
        report: BuildReport,
    ) -> Self {
        edges.retain(|e| nodes.contains_key(&e.caller) && nodes.contains_key(&e.callee));
        external_edges.retain(|e| nodes.contains_key(&e.caller) && e.callee.is_external());
        edges.sort_by(|a, b| a.caller.cmp(&b.caller).then_with(|| a.callee.cmp(&b.callee)));
        external_edges.sort_by(|a, b| a.caller.cmp(&b.caller).then_with(|| a.callee.cmp(&b.callee)));

        let mut callers_index: Adjacency = nodes.keys().map(|k| (k.clone(), BTreeSet::new())).collect();
        let mut callees_index = callers_index.clone();
        for e in &edges {
            if let Some(set) = callees_index.get_mut(&e.caller) {
                set.insert(e.callee.clone());
            }
            if let Some(set) = callers_index.get_mut(&e.callee) {
                set.insert(e.caller.clone());
            }
        }
        Self {
            root,
            nodes,
            edges,
            external_edges,
            build_config,
            build_signature,
            report,
            callers_index,
            callees_index,
        }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct predecessors; `None` when `id` is not a node.
    #[must_use]
    pub fn callers_of(&self, id: &str) -> Option<&BTreeSet<NodeId>> {
        self.callers_index.get(id)
    }

    /// Direct successors; `None` when `id` is not a node.
    #[must_use]
    pub fn callees_of(&self, id: &str) -> Option<&BTreeSet<NodeId>> {
        self.callees_index.get(id)
    }

    #[must_use]
    pub fn edge(&self, caller: &str, callee: &str) -> Option<&Edge> {
        self.edges
            .binary_search_by(|e| e.caller.as_str().cmp(caller).then_with(|| e.callee.as_str().cmp(callee)))
            .ok()
            .map(|i| &self.edges[i])
    }

    /// External placeholders referenced by this graph.
    #[must_use]
    pub fn external_nodes(&self) -> BTreeSet<&NodeId> {
        self.external_edges.iter().map(|e| &e.callee).collect()
    }

    /// Source text of a node, read lazily from disk.
    ///
    /// # Errors
    /// Fails with `UnknownNode` for ids not in the graph, or `Io` if the file
    /// can no longer be read.
    pub fn node_source(&self, id: &str) -> Result<String, CallGraphError> {
        let node = self.node(id).ok_or_else(|| CallGraphError::UnknownNode {
            id: id.to_string(),
            suggestions: Vec::new(),
        })?;
        let content = std::fs::read_to_string(self.root.join(&node.file_path))?;
        if node.kind == NodeKind::File {
            return Ok(content);
        }
        let start = node.line_range.start.saturating_sub(1);
        let len = node.line_range.end.saturating_sub(start);
        Ok(content.lines().skip(start).take(len).collect::<Vec<_>>().join("\n"))
    }
}
