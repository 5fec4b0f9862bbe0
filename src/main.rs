use tracing_subscriber::EnvFilter;

fn main() {
    let cli = callgraph_explorer::cli::parse();
    let default_level = if cli.quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_env("CALLGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = callgraph_explorer::app::run_cli(cli);
    if code != 0 {
        std::process::exit(code);
    }
}
