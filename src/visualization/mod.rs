use crate::errors::CallGraphError;
use crate::graph::{CallGraph, Edge, NodeId, NodeKind, ResolutionMethod};
use crate::query::{reachable, require_node, Direction};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

pub const DEFAULT_MAX_NODES: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Mermaid,
    Dot,
}

impl FromStr for ExportFormat {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mermaid" | "mmd" => Ok(ExportFormat::Mermaid),
            "dot" | "graphviz" => Ok(ExportFormat::Dot),
            other => Err(CallGraphError::Visualization(format!("unknown export format '{other}'"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Mermaid => "mermaid",
            ExportFormat::Dot => "dot",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DotTheme {
    #[default]
    Light,
    Dark,
}

impl FromStr for DotTheme {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(DotTheme::Light),
            "dark" => Ok(DotTheme::Dark),
            other => Err(CallGraphError::Visualization(format!("unknown theme '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankDir {
    #[default]
    LR,
    TB,
}

impl RankDir {
    fn as_str(self) -> &'static str {
        match self {
            RankDir::LR => "LR",
            RankDir::TB => "TB",
        }
    }
}

impl FromStr for RankDir {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LR" => Ok(RankDir::LR),
            "TB" | "TD" => Ok(RankDir::TB),
            other => Err(CallGraphError::Visualization(format!("unknown rank direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DotOptions {
    /// Group nodes into one cluster per source file.
    pub clusters: bool,
    pub theme: DotTheme,
    pub rankdir: RankDir,
}

impl Default for DotOptions {
    fn default() -> Self {
        Self { clusters: true, theme: DotTheme::Light, rankdir: RankDir::LR }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Restrict the diagram to the neighbourhood of this node.
    pub focus: Option<NodeId>,
    pub depth: usize,
    pub direction: Direction,
    pub format: ExportFormat,
    pub max_nodes: usize,
    pub dot: DotOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            focus: None,
            depth: 1,
            direction: Direction::Out,
            format: ExportFormat::Mermaid,
            max_nodes: DEFAULT_MAX_NODES,
            dot: DotOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Export {
    pub format: ExportFormat,
    pub text: String,
    pub nodes_rendered: usize,
    pub edges_rendered: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Kind(NodeKind),
    External,
}

struct Selection<'g> {
    nodes: Vec<(&'g NodeId, Shape, &'g str)>,
    edges: Vec<&'g Edge>,
    total: usize,
}

/// Render the whole graph, or the neighbourhood of `opts.focus`, as a diagram.
///
/// With a focus the node set is everything within `depth` hops in
/// `direction`; edges are those among the set (none at depth 0). Without one
/// the whole graph is rendered. Either way at most `max_nodes` nodes appear
/// and a comment line marks the cut.
///
/// # Errors
/// `UnknownNode` if the focus is not a node of `graph`.
pub fn export_subgraph(graph: &CallGraph, opts: &ExportOptions) -> Result<Export, CallGraphError> {
    let selection = select(graph, opts)?;
    let truncated = selection.nodes.len() < selection.total;
    let text = match opts.format {
        ExportFormat::Mermaid => render_mermaid(&selection, opts, truncated),
        ExportFormat::Dot => render_dot(&selection, opts, truncated),
    };
    Ok(Export {
        format: opts.format,
        text,
        nodes_rendered: selection.nodes.len(),
        edges_rendered: selection.edges.len(),
        truncated,
    })
}

fn select<'g>(graph: &'g CallGraph, opts: &ExportOptions) -> Result<Selection<'g>, CallGraphError> {
    let cap = opts.max_nodes.max(1);
    let mut ranked: Vec<(&'g NodeId, Shape, &'g str, usize)> = Vec::new();
    let mut external_edges: Vec<&'g Edge> = Vec::new();

    match &opts.focus {
        Some(focus) => {
            let start = &require_node(graph, focus.as_str())?.id;
            let hops: BTreeMap<NodeId, usize> = reachable(graph, start, opts.depth, opts.direction);
            for (id, hop) in &hops {
                if let Some(node) = graph.node(id.as_str()) {
                    ranked.push((&node.id, Shape::Kind(node.kind), node.file_path.as_str(), *hop));
                }
            }
            if opts.direction != Direction::In {
                for e in &graph.external_edges {
                    if hops.get(&e.caller).is_some_and(|h| *h < opts.depth) {
                        external_edges.push(e);
                    }
                }
            }
        }
        None => {
            for node in graph.nodes.values() {
                ranked.push((&node.id, Shape::Kind(node.kind), node.file_path.as_str(), 0));
            }
            external_edges.extend(graph.external_edges.iter());
        }
    }

    let mut placeholders: BTreeSet<&'g NodeId> = BTreeSet::new();
    for e in &external_edges {
        if placeholders.insert(&e.callee) {
            ranked.push((&e.callee, Shape::External, "", usize::MAX));
        }
    }

    // nearest first, then id; the focus (hop 0) always survives the cap
    ranked.sort_by(|a, b| a.3.cmp(&b.3).then_with(|| a.0.cmp(b.0)));
    let total = ranked.len();
    ranked.truncate(cap);

    let kept: BTreeSet<&NodeId> = ranked.iter().map(|r| r.0).collect();
    let mut edges: Vec<&'g Edge> = Vec::new();
    if opts.focus.is_none() || opts.depth > 0 {
        edges.extend(graph.edges.iter().filter(|e| kept.contains(&e.caller) && kept.contains(&e.callee)));
        edges.extend(external_edges.into_iter().filter(|e| kept.contains(&e.caller) && kept.contains(&e.callee)));
    }

    Ok(Selection { nodes: ranked.into_iter().map(|(id, shape, file, _)| (id, shape, file)).collect(), edges, total })
}

fn short_ids<'g>(selection: &Selection<'g>) -> HashMap<&'g NodeId, String> {
    selection.nodes.iter().enumerate().map(|(i, (id, _, _))| (*id, format!("n{i}"))).collect()
}

fn render_mermaid(selection: &Selection<'_>, opts: &ExportOptions, truncated: bool) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "flowchart {}", opts.dot.rankdir.as_str());
    if truncated {
        let _ = writeln!(s, "  %% truncated: showing {} of {} nodes", selection.nodes.len(), selection.total);
    }
    let ids = short_ids(selection);
    for (id, shape, _) in &selection.nodes {
        let label = escape_mermaid(id.as_str());
        let class = match shape {
            Shape::Kind(kind) => kind.tag(),
            Shape::External => "external",
        };
        let _ = writeln!(s, "  {}[\"{label}\"]:::{class}", ids[id]);
    }
    for e in &selection.edges {
        let arrow = match e.resolution {
            ResolutionMethod::Semantic => "-->",
            ResolutionMethod::Heuristic => "-.->",
            ResolutionMethod::UnresolvedExternal => "-. unresolved .->",
        };
        let _ = writeln!(s, "  {} {arrow} {}", ids[&e.caller], ids[&e.callee]);
    }
    let classes = [
        ("file", "#e0f3ff"),
        ("class", "#fff4e0"),
        ("func", "#e8ffe0"),
        ("external", "#eeeeee"),
    ];
    for (class, fill) in classes {
        let _ = writeln!(s, "  classDef {class} fill:{fill}");
    }
    s
}

fn render_dot(selection: &Selection<'_>, opts: &ExportOptions, truncated: bool) -> String {
    let dot = opts.dot;
    let mut s = String::new();
    s.push_str("digraph CallGraph\n{\n");
    let _ = write!(
        s,
        "  rankdir={};\n  graph [fontname=Helvetica] ;\n  node [shape=box, fontsize=10, style=\"filled,rounded\"] ;\n  edge [fontname=Helvetica, fontsize=9];\n",
        dot.rankdir.as_str()
    );
    if truncated {
        let _ = writeln!(s, "  // truncated: showing {} of {} nodes", selection.nodes.len(), selection.total);
    }

    let ids = short_ids(selection);
    let write_node = |out: &mut String, indent: &str, id: &NodeId, shape: Shape| {
        let (fill, node_shape) = style_for_shape(shape, dot.theme);
        let _ = writeln!(
            out,
            "{indent}\"{}\" [label=\"{}\", fillcolor=\"{fill}\", shape=\"{node_shape}\"];",
            ids[id],
            escape_label(id.as_str())
        );
    };

    if dot.clusters {
        let mut by_file: BTreeMap<&str, Vec<(&NodeId, Shape)>> = BTreeMap::new();
        let mut loose: Vec<(&NodeId, Shape)> = Vec::new();
        for (id, shape, file) in &selection.nodes {
            if file.is_empty() {
                loose.push((*id, *shape));
            } else {
                by_file.entry(*file).or_default().push((*id, *shape));
            }
        }
        for (file, members) in by_file {
            let _ = write!(
                s,
                "  subgraph \"cluster_{}\" {{\n    label=\"{}\";\n    color=lightgrey;\n",
                sanitize_id(file),
                escape_label(file)
            );
            for (id, shape) in members {
                write_node(&mut s, "    ", id, shape);
            }
            s.push_str("  }\n");
        }
        for (id, shape) in loose {
            write_node(&mut s, "  ", id, shape);
        }
    } else {
        for (id, shape, _) in &selection.nodes {
            write_node(&mut s, "  ", *id, *shape);
        }
    }

    for e in &selection.edges {
        let (color, style) = style_for_resolution(e.resolution);
        let _ = writeln!(
            s,
            "  \"{}\" -> \"{}\" [label=\"{}\", color=\"{color}\", style=\"{style}\"];",
            ids[&e.caller],
            ids[&e.callee],
            e.resolution.as_str()
        );
    }
    s.push_str("}\n");
    s
}

fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
            _ => '_',
        })
        .collect()
}

fn escape_label(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Mermaid entity codes for characters its flowchart grammar treats as syntax.
fn escape_mermaid(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("#quot;"),
            ':' => out.push_str("#58;"),
            '<' => out.push_str("#lt;"),
            '>' => out.push_str("#gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn style_for_shape(shape: Shape, theme: DotTheme) -> (&'static str, &'static str) {
    match (theme, shape) {
        (DotTheme::Light, Shape::Kind(NodeKind::File)) => ("#e0f3ff", "component"),
        (DotTheme::Light, Shape::Kind(NodeKind::Class)) => ("#fff4e0", "box"),
        (DotTheme::Light, Shape::Kind(NodeKind::Function)) => ("#e8ffe0", "oval"),
        (DotTheme::Light, Shape::External) => ("#eeeeee", "note"),

        (DotTheme::Dark, Shape::Kind(NodeKind::File)) => ("#124559", "component"),
        (DotTheme::Dark, Shape::Kind(NodeKind::Class)) => ("#7a4c00", "box"),
        (DotTheme::Dark, Shape::Kind(NodeKind::Function)) => ("#0b6e4f", "oval"),
        (DotTheme::Dark, Shape::External) => ("#3a3a3a", "note"),
    }
}

fn style_for_resolution(method: ResolutionMethod) -> (&'static str, &'static str) {
    match method {
        ResolutionMethod::Semantic => ("#d62728", "solid"),
        ResolutionMethod::Heuristic => ("#ff7f0e", "dashed"),
        ResolutionMethod::UnresolvedExternal => ("#7f7f7f", "dotted"),
    }
}
