//! Overview metrics over a built graph.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::graph::{CallGraph, NodeId, NodeKind, ResolutionMethod};

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hotspot {
    pub id: NodeId,
    pub in_degree: usize,
    pub out_degree: usize,
}

impl Hotspot {
    #[must_use]
    pub fn degree(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub nodes: usize,
    pub files: usize,
    pub classes: usize,
    pub functions: usize,
    pub edges: usize,
    pub external_edges: usize,
    pub parse_failures: usize,
}

/// Edge counts by resolution method plus per-call outcomes from the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub edges_semantic: usize,
    pub edges_heuristic: usize,
    pub edges_unresolved: usize,
    pub calls_total: usize,
    pub calls_semantic: usize,
    pub calls_heuristic: usize,
    pub calls_unresolved: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub classes: usize,
    pub functions: usize,
    pub methods: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub counts: Counts,
    pub resolution: ResolutionStats,
    /// Nodes nothing in the project calls.
    pub entrypoints: Vec<NodeId>,
    /// Nodes that call nothing in the project, then external placeholders.
    pub leaves: Vec<NodeId>,
    pub hotspots: Vec<Hotspot>,
    pub files: Vec<FileSummary>,
    pub top_n: usize,
}

/// Summarise `graph`; every list is cut to `top_n` entries.
#[must_use]
pub fn overview(graph: &CallGraph, top_n: usize) -> Overview {
    let empty = |set: Option<&std::collections::BTreeSet<NodeId>>| set.map_or(true, |s| s.is_empty());

    let mut entrypoints: Vec<NodeId> =
        graph.nodes.keys().filter(|id| empty(graph.callers_of(id.as_str()))).cloned().collect();
    let mut leaves: Vec<NodeId> =
        graph.nodes.keys().filter(|id| empty(graph.callees_of(id.as_str()))).cloned().collect();
    leaves.extend(graph.external_nodes().into_iter().cloned());
    entrypoints.truncate(top_n);
    leaves.truncate(top_n);

    let mut hotspots: Vec<Hotspot> = graph
        .nodes
        .keys()
        .map(|id| Hotspot {
            id: id.clone(),
            in_degree: graph.callers_of(id.as_str()).map_or(0, |s| s.len()),
            out_degree: graph.callees_of(id.as_str()).map_or(0, |s| s.len()),
        })
        .filter(|h| h.degree() > 0)
        .collect();
    hotspots.sort_by(|a, b| b.degree().cmp(&a.degree()).then_with(|| a.id.cmp(&b.id)));
    hotspots.truncate(top_n);

    let mut counts = Counts {
        nodes: graph.nodes.len(),
        edges: graph.edges.len(),
        external_edges: graph.external_edges.len(),
        parse_failures: graph.report.parse_failures.len(),
        ..Counts::default()
    };
    let mut per_file: BTreeMap<&str, FileSummary> = BTreeMap::new();
    for node in graph.nodes.values() {
        let summary = per_file
            .entry(node.file_path.as_str())
            .or_insert_with(|| FileSummary { path: node.file_path.clone(), ..FileSummary::default() });
        match node.kind {
            NodeKind::File => counts.files += 1,
            NodeKind::Class => {
                counts.classes += 1;
                summary.classes += 1;
            }
            NodeKind::Function => {
                counts.functions += 1;
                if is_method(graph, node.file_path.as_str(), &node.qualified_name) {
                    summary.methods += 1;
                } else {
                    summary.functions += 1;
                }
            }
        }
    }
    let mut files: Vec<FileSummary> = per_file.into_values().collect();
    files.sort_by(|a, b| {
        (b.classes + b.functions + b.methods)
            .cmp(&(a.classes + a.functions + a.methods))
            .then_with(|| a.path.cmp(&b.path))
    });
    files.truncate(top_n);

    let mut resolution = ResolutionStats {
        calls_total: graph.report.calls_total,
        calls_semantic: graph.report.resolved_semantic,
        calls_heuristic: graph.report.resolved_heuristic,
        calls_unresolved: graph.report.unresolved,
        ..ResolutionStats::default()
    };
    for e in graph.edges.iter().chain(&graph.external_edges) {
        match e.resolution {
            ResolutionMethod::Semantic => resolution.edges_semantic += 1,
            ResolutionMethod::Heuristic => resolution.edges_heuristic += 1,
            ResolutionMethod::UnresolvedExternal => resolution.edges_unresolved += 1,
        }
    }

    Overview { counts, resolution, entrypoints, leaves, hotspots, files, top_n }
}

/// A function is a method when its dotted parent is a class node in the same file.
fn is_method(graph: &CallGraph, file: &str, qualified_name: &str) -> bool {
    qualified_name
        .rsplit_once('.')
        .is_some_and(|(parent, _)| graph.contains(NodeId::class(file, parent).as_str()))
}
