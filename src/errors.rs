use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid UTF-8 in file {file}")]
    InvalidUtf8 { file: PathBuf },
    #[error("Failed to load the Python grammar: {0}")]
    Language(String),
    #[error("Syntax error in {file} at line {line}, column {column}")]
    Syntax { file: PathBuf, line: usize, column: usize },
    #[error("Parser produced no syntax tree for {file}")]
    NoTree { file: PathBuf },
}

#[derive(Debug, Error)]
pub enum CallGraphError {
    #[error("Parse error in file {file}: {source}")]
    ParseError { file: PathBuf, source: ParseError },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown graph id: {0} (it was evicted, cleared, or never built)")]
    UnknownGraph(String),

    #[error("Unknown node: {id}{}", suggestion_hint(.suggestions))]
    UnknownNode { id: String, suggestions: Vec<String> },

    #[error("Ambiguous target {target}: matches {}", .candidates.join(", "))]
    AmbiguousTarget { target: String, candidates: Vec<String> },

    #[error("Build exceeded its time limit of {}s; no graph was published", .limit.as_secs_f64())]
    BuildTimeout { limit: Duration },

    #[error("Build failed: {0}")]
    Build(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Visualization error: {0}")]
    Visualization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}

fn suggestion_hint(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_node_lists_suggestions() {
        let err = CallGraphError::UnknownNode {
            id: "proces".into(),
            suggestions: vec!["func:b.py:process".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("proces"));
        assert!(msg.contains("did you mean: func:b.py:process"));

        let bare = CallGraphError::UnknownNode { id: "x".into(), suggestions: vec![] };
        assert_eq!(bare.to_string(), "Unknown node: x");
    }

    #[test]
    fn ambiguous_target_lists_candidates() {
        let err = CallGraphError::AmbiguousTarget {
            target: "helper".into(),
            candidates: vec!["func:a.py:helper".into(), "func:b.py:helper".into()],
        };
        assert!(err.to_string().contains("func:a.py:helper, func:b.py:helper"));
    }
}
