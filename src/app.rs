use crate::cache::DEFAULT_CAPACITY;
use crate::cli::{BuildArgs, Cli, Commands, OnOffArg, OutputFormat};
use crate::errors::CallGraphError;
use crate::graph::BuildConfig;
use crate::query::PathResult;
use crate::service::{BuildOutcome, BuildRequest, GraphService, QueryKind, QueryOutput, QueryRequest};
use crate::stats::{Overview, DEFAULT_TOP_N};
use crate::utils::config::{load_config_at, load_config_near, Config};
use crate::utils::table;
use crate::visualization::{DotOptions, ExportFormat, ExportOptions};
use clap::CommandFactory;
use clap_complete::generate;
use serde::Serialize;
use std::fs;
use std::io;
use std::time::Duration;

const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Run the CLI logic in-process.
///
/// Returns an exit code: 0 on success, 2 for usage problems (bad target,
/// query type or configuration), 1 for everything else.
#[must_use]
pub fn run_cli(cli: Cli) -> i32 {
    match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            exit_code(&e)
        }
    }
}

#[must_use]
pub fn exit_code(err: &CallGraphError) -> i32 {
    match err {
        CallGraphError::UnknownNode { .. }
        | CallGraphError::AmbiguousTarget { .. }
        | CallGraphError::Query(_)
        | CallGraphError::Config(_)
        | CallGraphError::Visualization(_) => 2,
        _ => 1,
    }
}

/// One CLI invocation: the effective configuration plus an in-process service.
struct Session {
    service: GraphService,
    config: Config,
    quiet: bool,
}

impl Session {
    fn open(args: &BuildArgs, quiet: bool) -> Result<Self, CallGraphError> {
        let config = match &args.config {
            Some(path) => load_config_at(path)?,
            None => load_config_near(&args.path)?.unwrap_or_default(),
        };
        let service = GraphService::new(config.cache_capacity().unwrap_or(DEFAULT_CAPACITY));
        Ok(Self { service, config, quiet })
    }

    fn build(&self, args: &BuildArgs) -> Result<BuildOutcome, CallGraphError> {
        let cfg = &self.config;
        let config = BuildConfig {
            granularity: match args.granularity {
                Some(g) => g.into(),
                None => cfg.granularity()?.unwrap_or_default(),
            },
            include_external: args.include_external || cfg.include_external().unwrap_or(false),
            strategy: match args.strategy {
                Some(s) => s.into(),
                None => cfg.strategy()?.unwrap_or_default(),
            },
        };
        let request = BuildRequest {
            root: args.path.clone(),
            config,
            no_ignore: args.no_ignore || cfg.no_ignore().unwrap_or(false),
            timeout: args.timeout.or(cfg.timeout_secs()).map(Duration::from_secs),
            force_rebuild: false,
        };
        self.service.build(&request)
    }

    fn format(&self, flag: Option<OutputFormat>) -> OutputFormat {
        flag.or_else(|| {
            match self.config.query.as_ref().and_then(|q| q.default_format.as_deref()) {
                Some("json") => Some(OutputFormat::Json),
                Some("text") => Some(OutputFormat::Text),
                _ => None,
            }
        })
        .unwrap_or(OutputFormat::Text)
    }

    fn export_options(&self) -> Result<ExportOptions, CallGraphError> {
        let mut opts = ExportOptions::default();
        let Some(section) = self.config.export.as_ref() else {
            return Ok(opts);
        };
        if let Some(f) = &section.format {
            opts.format = f.parse()?;
        }
        if let Some(n) = section.max_nodes {
            opts.max_nodes = n;
        }
        if let Some(t) = &section.theme {
            opts.dot.theme = t.parse()?;
        }
        if let Some(r) = &section.rankdir {
            opts.dot.rankdir = r.parse()?;
        }
        if let Some(c) = section.clusters {
            opts.dot.clusters = c;
        }
        Ok(opts)
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CallGraphError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn numbered(ids: &[impl ToString]) -> Vec<Vec<String>> {
    ids.iter().enumerate().map(|(i, id)| vec![(i + 1).to_string(), id.to_string()]).collect()
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<(), CallGraphError> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "callgraph-explorer", &mut io::stdout());
        }
        Commands::Build { build, json, format } => {
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            if let Some(path) = json {
                let graph = session.service.graph(&outcome.graph_id)?;
                fs::write(&path, serde_json::to_string_pretty(&*graph)?)?;
            }
            match session.format(format) {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text if !session.quiet => print_build_summary(&outcome),
                OutputFormat::Text => {}
            }
        }
        Commands::Overview { build, top, format } => {
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            let top = top
                .or_else(|| session.config.query.as_ref().and_then(|q| q.top))
                .unwrap_or(DEFAULT_TOP_N);
            let overview = session.service.overview(&outcome.graph_id, top)?;
            match session.format(format) {
                OutputFormat::Json => print_json(&overview)?,
                OutputFormat::Text => print_overview(&overview),
            }
        }
        Commands::Search { build, query, limit, format } => {
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            let limit = limit
                .or_else(|| session.config.query.as_ref().and_then(|q| q.search_limit))
                .unwrap_or(DEFAULT_SEARCH_LIMIT);
            let hits = session.service.search(&outcome.graph_id, &query, Some(limit))?;
            match session.format(format) {
                OutputFormat::Json => print_json(&hits)?,
                OutputFormat::Text => {
                    let rows: Vec<Vec<String>> = hits
                        .iter()
                        .enumerate()
                        .map(|(i, h)| {
                            vec![(i + 1).to_string(), h.id.to_string(), format!("{:?}", h.rank).to_lowercase()]
                        })
                        .collect();
                    println!("{}", table::render(&["#", "Node", "Match"], &rows));
                }
            }
        }
        Commands::Query { build, kind, target, to, depth, direction, format } => {
            let kind: QueryKind = kind.parse()?;
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            let request = QueryRequest { kind, target, path_target: to, depth, direction: direction.into() };
            let output = session.service.query(&outcome.graph_id, &request)?;
            match session.format(format) {
                OutputFormat::Json => print_json(&output)?,
                OutputFormat::Text => print_query(&output),
            }
        }
        Commands::Export {
            build,
            focus,
            depth,
            direction,
            diagram,
            max_nodes,
            dot_theme,
            rankdir,
            dot_clusters,
            output,
        } => {
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            let mut opts = session.export_options()?;
            opts.depth = depth;
            opts.direction = direction.into();
            if let Some(d) = diagram {
                opts.format = ExportFormat::from(d);
            }
            if let Some(n) = max_nodes {
                opts.max_nodes = n;
            }
            opts.dot = DotOptions {
                clusters: dot_clusters.map_or(opts.dot.clusters, |c| c == OnOffArg::On),
                theme: dot_theme.map_or(opts.dot.theme, Into::into),
                rankdir: rankdir.map_or(opts.dot.rankdir, Into::into),
            };
            let export = session.service.export(&outcome.graph_id, focus.as_deref(), opts)?;
            match output {
                Some(path) => {
                    fs::write(&path, &export.text)?;
                    if !session.quiet {
                        eprintln!(
                            "Wrote {} nodes and {} edges to {}{}",
                            export.nodes_rendered,
                            export.edges_rendered,
                            path.display(),
                            if export.truncated { " (truncated)" } else { "" }
                        );
                    }
                }
                None => print!("{}", export.text),
            }
        }
        Commands::Context { build, target, format } => {
            let session = Session::open(&build, quiet)?;
            let outcome = session.build(&build)?;
            let ctx = session.service.call_context(&outcome.graph_id, &target)?;
            match session.format(format) {
                OutputFormat::Json => print_json(&ctx)?,
                OutputFormat::Text => {
                    println!("Target: {}", ctx.target);
                    println!("{}", ctx.source);
                    println!("{}", table::render(&["#", "Callee"], &numbered(&ctx.callees)));
                }
            }
        }
    }
    Ok(())
}

fn print_build_summary(outcome: &BuildOutcome) {
    let rows = vec![
        vec!["Graph id".to_string(), outcome.graph_id.to_string()],
        vec!["Root".to_string(), outcome.root.display().to_string()],
        vec!["Granularity".to_string(), outcome.config.granularity.to_string()],
        vec!["Strategy".to_string(), outcome.config.strategy.to_string()],
        vec!["Nodes".to_string(), outcome.nodes.to_string()],
        vec!["Edges".to_string(), outcome.edges.to_string()],
        vec!["External edges".to_string(), outcome.external_edges.to_string()],
        vec!["Parse failures".to_string(), outcome.parse_failures.len().to_string()],
    ];
    println!("{}", table::render(&["Field", "Value"], &rows));
    if !outcome.parse_failures.is_empty() {
        let rows: Vec<Vec<String>> =
            outcome.parse_failures.iter().map(|f| vec![f.path.clone(), f.message.clone()]).collect();
        println!("{}", table::render(&["Skipped file", "Reason"], &rows));
    }
}

fn print_overview(o: &Overview) {
    let c = &o.counts;
    let r = &o.resolution;
    let counts = vec![
        vec!["Nodes".to_string(), c.nodes.to_string()],
        vec!["Files".to_string(), c.files.to_string()],
        vec!["Classes".to_string(), c.classes.to_string()],
        vec!["Functions".to_string(), c.functions.to_string()],
        vec!["Edges".to_string(), c.edges.to_string()],
        vec!["External edges".to_string(), c.external_edges.to_string()],
        vec!["Parse failures".to_string(), c.parse_failures.to_string()],
        vec!["Calls resolved (semantic)".to_string(), r.calls_semantic.to_string()],
        vec!["Calls resolved (heuristic)".to_string(), r.calls_heuristic.to_string()],
        vec!["Calls unresolved".to_string(), r.calls_unresolved.to_string()],
    ];
    println!("{}", table::render(&["Metric", "Value"], &counts));

    println!("Entrypoints");
    println!("{}", table::render(&["#", "Node"], &numbered(&o.entrypoints)));
    println!("Leaves");
    println!("{}", table::render(&["#", "Node"], &numbered(&o.leaves)));

    println!("Hotspots");
    let rows: Vec<Vec<String>> = o
        .hotspots
        .iter()
        .map(|h| vec![h.id.to_string(), h.in_degree.to_string(), h.out_degree.to_string(), h.degree().to_string()])
        .collect();
    println!("{}", table::render(&["Node", "In", "Out", "Total"], &rows));

    println!("Files");
    let rows: Vec<Vec<String>> = o
        .files
        .iter()
        .map(|f| vec![f.path.clone(), f.classes.to_string(), f.functions.to_string(), f.methods.to_string()])
        .collect();
    println!("{}", table::render(&["File", "Classes", "Functions", "Methods"], &rows));
}

fn print_query(output: &QueryOutput) {
    match output {
        QueryOutput::Nodes { kind, target, nodes } => {
            println!("{kind} of {target}");
            println!("{}", table::render(&["#", "Node"], &numbered(nodes)));
        }
        QueryOutput::Reachable { kind, target, depth, direction, hops } => {
            println!("{kind} of {target} (depth {depth}, direction {direction})");
            let mut rows: Vec<(&usize, String)> = hops.iter().map(|(id, h)| (h, id.to_string())).collect();
            rows.sort();
            let rows: Vec<Vec<String>> = rows.into_iter().map(|(h, id)| vec![id, h.to_string()]).collect();
            println!("{}", table::render(&["Node", "Hops"], &rows));
        }
        QueryOutput::Path { from, to, result } => match result {
            PathResult::Found { path } => {
                let parts: Vec<&str> = path.iter().map(|p| p.as_str()).collect();
                println!("{}", parts.join(" -> "));
            }
            PathResult::NoPathFound => println!("No path found from {from} to {to}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_exit_with_two() {
        let unknown = CallGraphError::UnknownNode { id: "x".into(), suggestions: vec![] };
        assert_eq!(exit_code(&unknown), 2);
        assert_eq!(exit_code(&CallGraphError::Query("bad".into())), 2);
        assert_eq!(exit_code(&CallGraphError::UnknownGraph("g".into())), 1);
        assert_eq!(exit_code(&CallGraphError::BuildTimeout { limit: Duration::from_secs(1) }), 1);
    }
}
