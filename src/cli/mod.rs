use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::graph::{Granularity, ResolveStrategy};
use crate::query::Direction;
use crate::visualization::{DotTheme, ExportFormat, RankDir};

#[derive(Debug, Parser)]
#[command(
    name = "callgraph-explorer",
    version,
    about = "Static call graphs for Python projects",
    long_about = "Parse a Python project into a call graph and query it: callers, callees, transitive dependencies, shortest call paths, search, overview metrics and Mermaid/DOT export. File discovery respects .gitignore and .ignore; use --no-ignore to bypass them. Settings can also come from callgraph.toml in the project root."
)]
pub struct Cli {
    /// Suppress informational output
    #[arg(short, long, global = true, default_value_t = false)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GranularityArg {
    Function,
    File,
}

impl From<GranularityArg> for Granularity {
    fn from(g: GranularityArg) -> Self {
        match g {
            GranularityArg::Function => Granularity::Function,
            GranularityArg::File => Granularity::File,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Semantic,
    #[value(alias = "fast")]
    Heuristic,
}

impl From<StrategyArg> for ResolveStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Semantic => ResolveStrategy::Semantic,
            StrategyArg::Heuristic => ResolveStrategy::Heuristic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    In,
    Out,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::In => Direction::In,
            DirectionArg::Out => Direction::Out,
            DirectionArg::Both => Direction::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormatArg {
    Mermaid,
    Dot,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(f: ExportFormatArg) -> Self {
        match f {
            ExportFormatArg::Mermaid => ExportFormat::Mermaid,
            ExportFormatArg::Dot => ExportFormat::Dot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DotThemeArg {
    Light,
    Dark,
}

impl From<DotThemeArg> for DotTheme {
    fn from(t: DotThemeArg) -> Self {
        match t {
            DotThemeArg::Light => DotTheme::Light,
            DotThemeArg::Dark => DotTheme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[allow(clippy::upper_case_acronyms)]
pub enum DotRankDirArg {
    #[value(name = "LR", alias = "lr")]
    LR,
    #[value(name = "TB", alias = "tb")]
    TB,
}

impl From<DotRankDirArg> for RankDir {
    fn from(r: DotRankDirArg) -> Self {
        match r {
            DotRankDirArg::LR => RankDir::LR,
            DotRankDirArg::TB => RankDir::TB,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnOffArg {
    On,
    Off,
}

/// Options shared by every command that needs a graph.
///
/// Unset options fall back to `callgraph.toml`, then to built-in defaults.
#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
    /// Path to the Python project root
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,
    /// Path to a TOML configuration file (default: <path>/callgraph.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Include files even if matched by .gitignore/.ignore
    #[arg(long, default_value_t = false)]
    pub no_ignore: bool,
    /// Node granularity
    #[arg(long, value_enum)]
    pub granularity: Option<GranularityArg>,
    /// Call resolution strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
    /// Keep calls to names never defined in the project as external placeholders
    #[arg(long)]
    pub include_external: bool,
    /// Abort the build after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the call graph and print a summary
    Build {
        #[command(flatten)]
        build: BuildArgs,
        /// Write the full graph as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// Output format: text or json
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Show entrypoints, leaves, hotspots and counts
    Overview {
        #[command(flatten)]
        build: BuildArgs,
        /// Top N entries per list
        #[arg(long)]
        top: Option<usize>,
        /// Output format: text or json
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Search node ids and qualified names
    Search {
        #[command(flatten)]
        build: BuildArgs,
        /// Case-insensitive search text
        query: String,
        /// Maximum number of hits
        #[arg(long)]
        limit: Option<usize>,
        /// Output format: text or json
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Run a structural query against one node
    Query {
        #[command(flatten)]
        build: BuildArgs,
        /// callers, callees, dependencies, reverse_dependencies or path (aliases: incoming, outgoing, deps, rev_deps, ...)
        kind: String,
        /// Target node: full id, `file.py`, `file.py:Name`, or a unique name suffix
        target: String,
        /// Destination node for `path`
        #[arg(long)]
        to: Option<String>,
        /// Hop limit for dependency queries
        #[arg(long, default_value_t = 1)]
        depth: usize,
        /// Traversal direction for `dependencies`
        #[arg(long, value_enum, default_value = "out")]
        direction: DirectionArg,
        /// Output format: text or json
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Export the graph or a focused subgraph as Mermaid or DOT
    Export {
        #[command(flatten)]
        build: BuildArgs,
        /// Focus node; omit to export the whole graph
        #[arg(long)]
        focus: Option<String>,
        /// Hops around the focus
        #[arg(long, default_value_t = 1)]
        depth: usize,
        /// Traversal direction around the focus
        #[arg(long, value_enum, default_value = "out")]
        direction: DirectionArg,
        /// Diagram notation
        #[arg(long = "as", value_enum)]
        diagram: Option<ExportFormatArg>,
        /// Maximum nodes before the diagram is truncated
        #[arg(long)]
        max_nodes: Option<usize>,
        /// DOT: theme (light or dark)
        #[arg(long, value_enum)]
        dot_theme: Option<DotThemeArg>,
        /// Rank direction (LR or TB)
        #[arg(long, value_enum)]
        rankdir: Option<DotRankDirArg>,
        /// DOT: one cluster per file (default: on)
        #[arg(long, value_enum)]
        dot_clusters: Option<OnOffArg>,
        /// Write the diagram to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a node's source and its direct callees
    Context {
        #[command(flatten)]
        build: BuildArgs,
        /// Target node reference
        target: String,
        /// Output format: text or json
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
