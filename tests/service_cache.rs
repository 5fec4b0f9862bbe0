use std::fs;
use std::time::Duration;

use callgraph_explorer::cache::GraphId;
use callgraph_explorer::errors::CallGraphError;
use callgraph_explorer::graph::{BuildConfig, Granularity, ResolveStrategy};
use callgraph_explorer::service::{BuildRequest, GraphService, QueryKind, QueryOutput, QueryRequest};
use callgraph_explorer::visualization::ExportOptions;
use tempfile::{tempdir, TempDir};

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (rel, body) in files {
        let p = dir.path().join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, body).unwrap();
    }
    dir
}

fn simple() -> TempDir {
    project(&[
        ("a.py", "import b\n\n\ndef main():\n    b.process()\n"),
        ("b.py", "def process():\n    pass\n"),
    ])
}

#[test]
fn rebuilding_unchanged_sources_hits_the_cache() {
    let dir = simple();
    let svc = GraphService::new(4);
    let req = BuildRequest::new(dir.path(), BuildConfig::default());
    let first = svc.build(&req).unwrap();
    let second = svc.build(&req).unwrap();
    assert!(second.cached);
    assert_eq!(first.graph_id, second.graph_id);
    assert_eq!(first.signature, second.signature);
    assert_eq!(svc.list_cached().len(), 1);
}

#[test]
fn different_options_are_different_entries() {
    let dir = simple();
    let svc = GraphService::new(4);
    let func = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap();
    let file = svc
        .build(&BuildRequest::new(dir.path(), BuildConfig { granularity: Granularity::File, ..BuildConfig::default() }))
        .unwrap();
    let fast = svc
        .build(&BuildRequest::new(
            dir.path(),
            BuildConfig { strategy: ResolveStrategy::Heuristic, ..BuildConfig::default() },
        ))
        .unwrap();
    assert_ne!(func.graph_id, file.graph_id);
    assert_ne!(func.graph_id, fast.graph_id);
    assert_eq!(svc.list_cached().len(), 3);
}

#[test]
fn cache_capacity_evicts_least_recently_used_graph() {
    let dirs: Vec<TempDir> = (0..3).map(|_| simple()).collect();
    let svc = GraphService::new(2);
    let a = svc.build(&BuildRequest::new(dirs[0].path(), BuildConfig::default())).unwrap().graph_id;
    let b = svc.build(&BuildRequest::new(dirs[1].path(), BuildConfig::default())).unwrap().graph_id;
    // querying `a` keeps it warm
    svc.overview(&a, 5).unwrap();
    let c = svc.build(&BuildRequest::new(dirs[2].path(), BuildConfig::default())).unwrap().graph_id;

    let live: Vec<GraphId> = svc.list_cached().into_iter().map(|i| i.graph_id).collect();
    assert_eq!(live.len(), 2);
    assert!(live.contains(&a));
    assert!(live.contains(&c));
    assert!(matches!(svc.overview(&b, 5), Err(CallGraphError::UnknownGraph(_))));
}

#[test]
fn syntax_errors_skip_the_file_only() {
    let dir = project(&[
        ("good.py", "def ok():\n    pass\n"),
        ("bad.py", "def broken(:\n    pass\n"),
    ]);
    let svc = GraphService::default();
    let outcome = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap();
    assert_eq!(outcome.parse_failures.len(), 1);
    assert_eq!(outcome.parse_failures[0].path, "bad.py");
    let graph = svc.graph(&outcome.graph_id).unwrap();
    assert!(graph.contains("func:good.py:ok"));
    assert!(!graph.contains("file:bad.py"));
}

#[test]
fn timeout_publishes_nothing() {
    let files: Vec<(String, String)> = (0..300)
        .map(|i| (format!("m{i}.py"), format!("def f{i}():\n    f{}()\n", (i + 1) % 300)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
    let dir = project(&refs);

    let svc = GraphService::default();
    let req = BuildRequest {
        timeout: Some(Duration::from_nanos(1)),
        ..BuildRequest::new(dir.path(), BuildConfig::default())
    };
    let err = svc.build(&req).unwrap_err();
    assert!(matches!(err, CallGraphError::BuildTimeout { .. }));
    assert!(svc.list_cached().is_empty());

    // a generous limit succeeds afterwards
    let ok = svc.build(&BuildRequest { timeout: Some(Duration::from_secs(120)), ..req }).unwrap();
    assert!(!ok.cached);
    assert_eq!(svc.list_cached().len(), 1);
}

#[test]
fn error_taxonomy_surfaces_to_callers() {
    let dir = project(&[
        ("x.py", "def helper():\n    pass\n"),
        ("y.py", "def helper():\n    pass\n"),
    ]);
    let svc = GraphService::default();
    let id = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap().graph_id;

    match svc.query(&id, &QueryRequest::new(QueryKind::Callers, "helper")) {
        Err(CallGraphError::AmbiguousTarget { candidates, .. }) => {
            assert_eq!(candidates, vec!["func:x.py:helper".to_string(), "func:y.py:helper".to_string()]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    match svc.query(&id, &QueryRequest::new(QueryKind::Callees, "helpr")) {
        Err(CallGraphError::UnknownNode { suggestions, .. }) => assert!(suggestions.len() <= 5),
        other => panic!("expected unknown node, got {other:?}"),
    }
    let out = svc.query(&id, &QueryRequest::new(QueryKind::Callers, "x.py:helper")).unwrap();
    assert!(matches!(out, QueryOutput::Nodes { ref nodes, .. } if nodes.is_empty()));

    let bogus = GraphId::from("0000");
    assert!(matches!(svc.search(&bogus, "x", None), Err(CallGraphError::UnknownGraph(_))));
    assert!(matches!(
        svc.export(&bogus, None, ExportOptions::default()),
        Err(CallGraphError::UnknownGraph(_))
    ));
}

#[test]
fn clear_removes_entries() {
    let dir = simple();
    let svc = GraphService::default();
    let id = svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap().graph_id;
    assert_eq!(svc.clear(Some(&id)).unwrap(), 1);
    assert!(svc.graph(&id).is_err());
    svc.build(&BuildRequest::new(dir.path(), BuildConfig::default())).unwrap();
    assert_eq!(svc.clear(None).unwrap(), 1);
    assert!(svc.list_cached().is_empty());
}

#[test]
fn concurrent_builds_share_one_entry() {
    let dir = simple();
    let svc = std::sync::Arc::new(GraphService::default());
    let root = dir.path().to_path_buf();
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let svc = std::sync::Arc::clone(&svc);
            let root = root.clone();
            std::thread::spawn(move || svc.build(&BuildRequest::new(root, BuildConfig::default())).unwrap().graph_id)
        })
        .collect();
    let ids: std::collections::BTreeSet<GraphId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(svc.list_cached().len(), 1);
}
