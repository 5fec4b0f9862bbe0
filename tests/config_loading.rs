use callgraph_explorer::errors::CallGraphError;
use callgraph_explorer::graph::{Granularity, ResolveStrategy};
use callgraph_explorer::utils::config::{self, CONFIG_FILE_NAME};
use std::fs;
use std::path::Path;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    fs::write(path, content).unwrap();
}

#[test]
fn parses_full_config_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg_path = tmp.path().join("custom.toml");
    let data = r#"
[build]
granularity = "file"
strategy = "fast"
include_external = true
timeout_secs = 30
no_ignore = false

[cache]
capacity = 3

[export]
format = "dot"
max_nodes = 50
theme = "dark"
rankdir = "TB"
clusters = false

[query]
default_format = "json"
search_limit = 7
top = 4
"#;
    write(&cfg_path, data);

    let cfg = config::load_config_at(&cfg_path).expect("config parsed");
    assert_eq!(cfg.granularity().unwrap(), Some(Granularity::File));
    assert_eq!(cfg.strategy().unwrap(), Some(ResolveStrategy::Heuristic));
    assert_eq!(cfg.include_external(), Some(true));
    assert_eq!(cfg.timeout_secs(), Some(30));
    assert_eq!(cfg.no_ignore(), Some(false));
    assert_eq!(cfg.cache_capacity(), Some(3));

    let export = cfg.export.as_ref().unwrap();
    assert_eq!(export.format.as_deref(), Some("dot"));
    assert_eq!(export.max_nodes, Some(50));
    assert_eq!(export.theme.as_deref(), Some("dark"));
    assert_eq!(export.rankdir.as_deref(), Some("TB"));
    assert_eq!(export.clusters, Some(false));

    let query = cfg.query.as_ref().unwrap();
    assert_eq!(query.default_format.as_deref(), Some("json"));
    assert_eq!(query.search_limit, Some(7));
    assert_eq!(query.top, Some(4));
}

#[test]
fn load_config_near_looks_for_default_name() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(config::load_config_near(tmp.path()).unwrap().is_none());

    write(&tmp.path().join(CONFIG_FILE_NAME), "[query]\ndefault_format = 'text'\n");
    let cfg = config::load_config_near(tmp.path()).unwrap().expect("found default config");
    assert_eq!(cfg.query.and_then(|q| q.default_format), Some("text".to_string()));
    assert!(cfg.build.is_none());
}

#[test]
fn invalid_values_are_config_errors() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join(CONFIG_FILE_NAME);

    write(&path, "[build]\ngranularity = \"module\"\n");
    let cfg = config::load_config_at(&path).unwrap();
    assert!(matches!(cfg.granularity(), Err(CallGraphError::Config(_))));

    write(&path, "[cache]\ncapacity = \"lots\"\n");
    assert!(matches!(config::load_config_at(&path), Err(CallGraphError::Config(_))));

    write(&path, "not toml at all [");
    assert!(matches!(config::load_config_near(tmp.path()), Err(CallGraphError::Config(_))));

    assert!(matches!(
        config::load_config_at(&tmp.path().join("missing.toml")),
        Err(CallGraphError::Config(_))
    ));
}
