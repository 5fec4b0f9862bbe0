use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::CallGraphError;
use crate::graph::{CallGraph, Node, NodeId};

/// Query trait implemented by all query types.
///
/// Given an immutable reference to a `CallGraph`, returns a result of type `R`.
pub trait Query<R> {
    fn run(&self, graph: &CallGraph) -> R;
}

const SUGGESTION_LIMIT: usize = 5;

/// `pkg/x.py` or `pkg/x.py:Name`.
fn file_reference() -> &'static Regex {
    static FILE_REF: OnceLock<Regex> = OnceLock::new();
    FILE_REF.get_or_init(|| {
        Regex::new(r"^(?P<file>[^:]+\.py)(?::(?P<name>.+))?$").expect("file reference pattern compiles")
    })
}

/// Look up a node, failing with `UnknownNode` (plus close matches) when absent.
///
/// # Errors
/// `UnknownNode` if `id` is not an exact node id of `graph`.
pub fn require_node<'g>(graph: &'g CallGraph, id: &str) -> Result<&'g Node, CallGraphError> {
    graph
        .node(id)
        .ok_or_else(|| CallGraphError::UnknownNode { id: id.to_string(), suggestions: suggestions(graph, id) })
}

/// Close matches for an unknown reference: search hits on the whole text,
/// then on its last path segment.
#[must_use]
pub fn suggestions(graph: &CallGraph, reference: &str) -> Vec<String> {
    let mut hits = SearchQuery::new(reference, Some(SUGGESTION_LIMIT)).run(graph);
    if hits.is_empty() {
        let tail = reference.rsplit([':', '.', '/']).next().unwrap_or(reference);
        if !tail.is_empty() && tail != reference {
            hits = SearchQuery::new(tail, Some(SUGGESTION_LIMIT)).run(graph);
        }
    }
    hits.into_iter().map(|h| h.id.0).collect()
}

/// Turn a user-supplied reference into a node id.
///
/// Accepted forms: an exact id; `pkg/x.py` (file node); `pkg/x.py:Name`
/// (function, then class); otherwise any id or qualified name ending in the
/// reference at a `:`, `.` or `/` boundary.
///
/// # Errors
/// `AmbiguousTarget` when several nodes match, `UnknownNode` when none do.
pub fn resolve_target(graph: &CallGraph, reference: &str) -> Result<NodeId, CallGraphError> {
    let reference = reference.trim();
    if graph.contains(reference) {
        return Ok(NodeId::from(reference));
    }

    if let Some(caps) = file_reference().captures(reference) {
        let file = &caps["file"];
        let candidates = match caps.name("name") {
            None => vec![NodeId::file(file)],
            Some(name) => vec![NodeId::func(file, name.as_str()), NodeId::class(file, name.as_str())],
        };
        if let Some(found) = candidates.into_iter().find(|c| graph.contains(c.as_str())) {
            return Ok(found);
        }
    }

    let mut matches: Vec<&NodeId> = graph
        .nodes
        .values()
        .filter(|n| n.qualified_name == reference || ends_at_boundary(n.id.as_str(), reference))
        .map(|n| &n.id)
        .collect();
    matches.dedup();
    match matches.len() {
        1 => Ok(matches[0].clone()),
        0 => Err(CallGraphError::UnknownNode {
            id: reference.to_string(),
            suggestions: suggestions(graph, reference),
        }),
        _ => Err(CallGraphError::AmbiguousTarget {
            target: reference.to_string(),
            candidates: matches.into_iter().map(|id| id.0.clone()).collect(),
        }),
    }
}

fn ends_at_boundary(id: &str, suffix: &str) -> bool {
    if suffix.is_empty() || !id.ends_with(suffix) {
        return false;
    }
    let head = &id[..id.len() - suffix.len()];
    matches!(head.chars().last(), Some(':' | '.' | '/'))
}

/// Direct predecessors of a node.
pub struct CallersQuery {
    pub target: String,
}

impl CallersQuery {
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self { target: target.to_string() }
    }
}

impl Query<Result<Vec<NodeId>, CallGraphError>> for CallersQuery {
    fn run(&self, graph: &CallGraph) -> Result<Vec<NodeId>, CallGraphError> {
        require_node(graph, &self.target)?;
        Ok(graph.callers_of(&self.target).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}

/// Direct successors of a node.
pub struct CalleesQuery {
    pub target: String,
}

impl CalleesQuery {
    #[must_use]
    pub fn new(target: &str) -> Self {
        Self { target: target.to_string() }
    }
}

impl Query<Result<Vec<NodeId>, CallGraphError>> for CalleesQuery {
    fn run(&self, graph: &CallGraph) -> Result<Vec<NodeId>, CallGraphError> {
        require_node(graph, &self.target)?;
        Ok(graph.callees_of(&self.target).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }
}

/// Which adjacency index a traversal follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    #[default]
    Out,
    Both,
}

impl FromStr for Direction {
    type Err = CallGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "incoming" | "callers" => Ok(Direction::In),
            "out" | "outgoing" | "callees" => Ok(Direction::Out),
            "both" | "all" => Ok(Direction::Both),
            other => Err(CallGraphError::Query(format!("unknown direction '{other}'"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        })
    }
}

/// Breadth-first reachability within `depth` hops.
///
/// The result maps every reached node (the target included, at 0) to its
/// minimum hop distance.
pub struct DependenciesQuery {
    pub target: String,
    pub depth: usize,
    pub direction: Direction,
}

impl DependenciesQuery {
    #[must_use]
    pub fn new(target: &str, depth: usize, direction: Direction) -> Self {
        Self { target: target.to_string(), depth, direction }
    }

    /// Everything that reaches `target` within `depth` hops.
    #[must_use]
    pub fn reverse(target: &str, depth: usize) -> Self {
        Self::new(target, depth, Direction::In)
    }
}

impl Query<Result<BTreeMap<NodeId, usize>, CallGraphError>> for DependenciesQuery {
    fn run(&self, graph: &CallGraph) -> Result<BTreeMap<NodeId, usize>, CallGraphError> {
        let start = require_node(graph, &self.target)?.id.clone();
        Ok(reachable(graph, &start, self.depth, self.direction))
    }
}

pub(crate) fn reachable(
    graph: &CallGraph,
    start: &NodeId,
    depth: usize,
    direction: Direction,
) -> BTreeMap<NodeId, usize> {
    let mut seen: BTreeMap<NodeId, usize> = BTreeMap::new();
    seen.insert(start.clone(), 0);
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::from([(start.clone(), 0)]);
    while let Some((cur, hop)) = queue.pop_front() {
        if hop >= depth {
            continue;
        }
        let outgoing = matches!(direction, Direction::Out | Direction::Both)
            .then(|| graph.callees_of(cur.as_str()))
            .flatten();
        let incoming = matches!(direction, Direction::In | Direction::Both)
            .then(|| graph.callers_of(cur.as_str()))
            .flatten();
        for next in outgoing.into_iter().chain(incoming).flatten() {
            if !seen.contains_key(next) {
                seen.insert(next.clone(), hop + 1);
                queue.push_back((next.clone(), hop + 1));
            }
        }
    }
    seen
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathResult {
    Found { path: Vec<NodeId> },
    NoPathFound,
}

/// Unweighted shortest call path from `from` to `to` along callee edges.
///
/// Neighbours are expanded in id order, so among equally short paths the
/// lexically smallest one wins.
pub struct ShortestPathQuery {
    pub from: String,
    pub to: String,
}

impl ShortestPathQuery {
    #[must_use]
    pub fn new(from: &str, to: &str) -> Self {
        Self { from: from.to_string(), to: to.to_string() }
    }
}

impl Query<Result<PathResult, CallGraphError>> for ShortestPathQuery {
    fn run(&self, graph: &CallGraph) -> Result<PathResult, CallGraphError> {
        let src = require_node(graph, &self.from)?.id.clone();
        let dst = require_node(graph, &self.to)?.id.clone();
        if src == dst {
            return Ok(PathResult::Found { path: vec![src] });
        }

        let mut prev: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::from([src.clone()]);
        'bfs: while let Some(u) = queue.pop_front() {
            for v in graph.callees_of(u.as_str()).into_iter().flatten() {
                if *v == src || prev.contains_key(v) {
                    continue;
                }
                prev.insert(v.clone(), u.clone());
                if *v == dst {
                    break 'bfs;
                }
                queue.push_back(v.clone());
            }
        }

        if !prev.contains_key(&dst) {
            return Ok(PathResult::NoPathFound);
        }
        let mut path = vec![dst.clone()];
        let mut cur = &dst;
        while let Some(p) = prev.get(cur) {
            path.push(p.clone());
            cur = p;
        }
        path.reverse();
        Ok(PathResult::Found { path })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRank {
    Exact,
    Prefix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: NodeId,
    pub qualified_name: String,
    pub rank: MatchRank,
}

/// Case-insensitive search over node ids and qualified names.
pub struct SearchQuery {
    pub query: String,
    pub limit: Option<usize>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(query: &str, limit: Option<usize>) -> Self {
        Self { query: query.trim().to_lowercase(), limit }
    }

    fn rank(&self, node: &Node) -> Option<MatchRank> {
        let id = node.id.as_str().to_lowercase();
        let qual = node.qualified_name.to_lowercase();
        let q = self.query.as_str();
        if id == q || qual == q {
            Some(MatchRank::Exact)
        } else if id.starts_with(q) || qual.starts_with(q) {
            Some(MatchRank::Prefix)
        } else if id.contains(q) || qual.contains(q) {
            Some(MatchRank::Substring)
        } else {
            None
        }
    }
}

impl Query<Vec<SearchHit>> for SearchQuery {
    fn run(&self, graph: &CallGraph) -> Vec<SearchHit> {
        if self.query.is_empty() {
            return Vec::new();
        }
        // nodes iterate in id order, so a stable sort by rank keeps ties by id
        let mut hits: Vec<SearchHit> = graph
            .nodes
            .values()
            .filter_map(|n| {
                self.rank(n).map(|rank| SearchHit {
                    id: n.id.clone(),
                    qualified_name: n.qualified_name.clone(),
                    rank,
                })
            })
            .collect();
        hits.sort_by_key(|h| h.rank);
        if let Some(limit) = self.limit {
            hits.truncate(limit);
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::graph_from_pairs;
    use std::collections::BTreeSet;

    fn id(name: &str) -> NodeId {
        NodeId::func("m.py", name)
    }

    fn chain() -> CallGraph {
        // a -> b -> c -> a (cycle), a -> d, d -> c, e isolated, f recursive
        graph_from_pairs(
            &["a", "b", "c", "d", "e", "f"],
            &[("a", "b"), ("b", "c"), ("c", "a"), ("a", "d"), ("d", "c"), ("f", "f")],
        )
    }

    #[test]
    fn callers_and_callees_are_direct_only() {
        let g = chain();
        assert_eq!(CalleesQuery::new("func:m.py:a").run(&g).unwrap(), vec![id("b"), id("d")]);
        assert_eq!(CallersQuery::new("func:m.py:c").run(&g).unwrap(), vec![id("b"), id("d")]);
        assert!(CallersQuery::new("func:m.py:e").run(&g).unwrap().is_empty());
    }

    #[test]
    fn unknown_target_is_an_error_with_suggestions() {
        let g = chain();
        let err = CalleesQuery::new("func:m.py:zz").run(&g).unwrap_err();
        assert!(matches!(err, CallGraphError::UnknownNode { .. }));

        match CallersQuery::new("m.py:a").run(&g).unwrap_err() {
            CallGraphError::UnknownNode { suggestions, .. } => {
                assert!(suggestions.contains(&"func:m.py:a".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn file_reference_pattern_is_shared() {
        assert!(std::ptr::eq(file_reference(), file_reference()));
        let caps = file_reference().captures("pkg/m.py:Cls.run").unwrap();
        assert_eq!(&caps["file"], "pkg/m.py");
        assert_eq!(caps.name("name").map(|m| m.as_str()), Some("Cls.run"));
        assert!(file_reference().captures("run").is_none());

        let g = chain();
        assert_eq!(resolve_target(&g, "m.py:b").unwrap(), id("b"));
        assert_eq!(resolve_target(&g, "m.py:c").unwrap(), id("c"));
    }

    #[test]
    fn depth_one_out_equals_callees_plus_self() {
        let g = chain();
        for n in ["a", "b", "c", "d", "e", "f"] {
            let target = format!("func:m.py:{n}");
            let deps: BTreeSet<NodeId> =
                DependenciesQuery::new(&target, 1, Direction::Out).run(&g).unwrap().into_keys().collect();
            let mut expected: BTreeSet<NodeId> = CalleesQuery::new(&target).run(&g).unwrap().into_iter().collect();
            expected.insert(NodeId::from(target.as_str()));
            assert_eq!(deps, expected);
        }
    }

    #[test]
    fn dependencies_report_minimum_hops_and_terminate_on_cycles() {
        let g = chain();
        let deps = DependenciesQuery::new("func:m.py:a", 10, Direction::Out).run(&g).unwrap();
        assert_eq!(deps.get(&id("a")), Some(&0));
        assert_eq!(deps.get(&id("b")), Some(&1));
        assert_eq!(deps.get(&id("d")), Some(&1));
        assert_eq!(deps.get(&id("c")), Some(&2));
        assert!(!deps.contains_key(&id("e")));

        let zero = DependenciesQuery::new("func:m.py:a", 0, Direction::Both).run(&g).unwrap();
        assert_eq!(zero.len(), 1);
    }

    #[test]
    fn reverse_dependencies_follow_callers() {
        let g = chain();
        let deps = DependenciesQuery::reverse("func:m.py:c", 1).run(&g).unwrap();
        let keys: Vec<NodeId> = deps.into_keys().collect();
        assert_eq!(keys, vec![id("b"), id("c"), id("d")]);
    }

    #[test]
    fn shortest_path_prefers_lexically_smaller_route() {
        let g = chain();
        // a->b->c and a->d->c are both two hops; b < d
        let r = ShortestPathQuery::new("func:m.py:a", "func:m.py:c").run(&g).unwrap();
        assert_eq!(r, PathResult::Found { path: vec![id("a"), id("b"), id("c")] });
    }

    #[test]
    fn shortest_path_to_self_is_trivial() {
        let g = chain();
        let r = ShortestPathQuery::new("func:m.py:f", "func:m.py:f").run(&g).unwrap();
        assert_eq!(r, PathResult::Found { path: vec![id("f")] });
        let r = ShortestPathQuery::new("func:m.py:e", "func:m.py:e").run(&g).unwrap();
        assert_eq!(r, PathResult::Found { path: vec![id("e")] });
    }

    #[test]
    fn unreachable_is_no_path_not_error() {
        let g = chain();
        let r = ShortestPathQuery::new("func:m.py:a", "func:m.py:e").run(&g).unwrap();
        assert_eq!(r, PathResult::NoPathFound);
    }

    #[test]
    fn search_ranks_exact_then_prefix_then_substring() {
        let g = graph_from_pairs(&["proc", "process", "preprocess", "other"], &[]);
        let hits = SearchQuery::new("PROC", None).run(&g);
        let ranked: Vec<(&str, MatchRank)> = hits.iter().map(|h| (h.qualified_name.as_str(), h.rank)).collect();
        assert_eq!(
            ranked,
            vec![
                ("proc", MatchRank::Exact),
                ("process", MatchRank::Prefix),
                ("preprocess", MatchRank::Substring)
            ]
        );
        assert!(SearchQuery::new("nothing-like-this", None).run(&g).is_empty());
        assert!(SearchQuery::new("   ", None).run(&g).is_empty());
        assert_eq!(SearchQuery::new("p", Some(1)).run(&g).len(), 1);
    }

    #[test]
    fn resolve_target_forms() {
        let g = graph_from_pairs(&["main", "Cls.run", "run"], &[]);
        assert_eq!(resolve_target(&g, "func:m.py:main").unwrap(), id("main"));
        assert_eq!(resolve_target(&g, "m.py:main").unwrap(), id("main"));
        assert_eq!(resolve_target(&g, "Cls.run").unwrap(), id("Cls.run"));
        // "run" ends both `:run` and `.run`
        match resolve_target(&g, "run").unwrap_err() {
            CallGraphError::AmbiguousTarget { candidates, .. } => {
                assert_eq!(candidates, vec!["func:m.py:Cls.run".to_string(), "func:m.py:run".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(resolve_target(&g, "missing"), Err(CallGraphError::UnknownNode { .. })));
    }

    #[test]
    fn resolve_target_does_not_match_partial_names() {
        let g = graph_from_pairs(&["unrun"], &[]);
        assert!(resolve_target(&g, "run").is_err());
    }

    #[test]
    fn direction_parses_aliases() {
        assert_eq!("incoming".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Out);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
