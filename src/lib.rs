//! callgraph-explorer: static call graphs for Python projects
//!
//! Parse a Python source tree into a call graph of files, classes and
//! functions, cache built graphs in memory, and query them.
//!
//! # Features
//! - tree-sitter based parsing; files with syntax errors are skipped and reported
//! - Two call resolution strategies: semantic (imports, assignments, `self`
//!   dispatch, base classes) with per-call heuristic fallback, or heuristic only
//! - Function or file granularity, optional external placeholders
//! - LRU graph cache keyed by a fingerprint of the sources and build options
//! - Queries: callers, callees, dependencies, reverse dependencies, shortest path, search
//! - Overview metrics and Mermaid/DOT export
//!
//! # Quickstart (Library)
//! ```no_run
//! use callgraph_explorer::graph::BuildConfig;
//! use callgraph_explorer::service::{BuildRequest, GraphService, QueryKind, QueryRequest};
//!
//! let service = GraphService::default();
//! let built = service.build(&BuildRequest::new(".", BuildConfig::default())).expect("build graph");
//! let callers = service
//!     .query(&built.graph_id, &QueryRequest::new(QueryKind::Callers, "b.py:process"))
//!     .expect("query");
//! println!("{} nodes; {callers:?}", built.nodes);
//! ```
//!
//! # Quickstart (CLI)
//! ```text
//! callgraph-explorer build --path .
//! callgraph-explorer query callers b.py:process --path .
//! callgraph-explorer export --focus a.py:main --depth 2 --as dot --path .
//! ```
//!
//! # Logging
//! Diagnostics go to stderr through `tracing`; set `CALLGRAPH_LOG` (e.g.
//! `CALLGRAPH_LOG=debug`) to change the level.
pub mod app;
pub mod cache;
pub mod cli;
pub mod errors;
pub mod graph;
pub mod parser;
pub mod query;
pub mod service;
pub mod stats;
pub mod utils;
pub mod visualization;
