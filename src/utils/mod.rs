pub mod table {
    fn width(s: &str) -> usize {
        s.chars().count()
    }

    fn is_numeric(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    }

    fn sep(widths: &[usize]) -> String {
        let mut s = String::from("+");
        for w in widths {
            s.push_str(&"-".repeat(w + 2));
            s.push('+');
        }
        s
    }

    // Numeric cells are right-aligned, everything else left-aligned
    fn line(cells: &[String], widths: &[usize]) -> String {
        let mut s = String::from("|");
        for (cell, &w) in cells.iter().zip(widths) {
            let pad = " ".repeat(w.saturating_sub(width(cell)));
            s.push(' ');
            if is_numeric(cell) {
                s.push_str(&pad);
                s.push_str(cell);
            } else {
                s.push_str(cell);
                s.push_str(&pad);
            }
            s.push_str(" |");
        }
        s
    }

    /// Render an ASCII table. Missing cells render empty; extra cells are ignored.
    #[must_use]
    pub fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
        let cols = headers.len();
        let mut widths: Vec<usize> = headers.iter().map(|h| width(h)).collect();
        for row in rows {
            for (c, w) in widths.iter_mut().enumerate() {
                *w = (*w).max(row.get(c).map_or(0, |s| width(s)));
            }
        }

        let border = sep(&widths);
        let mut out = String::new();
        out.push_str(&border);
        out.push('\n');
        let header_cells: Vec<String> = headers.iter().map(|s| (*s).to_string()).collect();
        out.push_str(&line(&header_cells, &widths));
        out.push('\n');
        out.push_str(&border);
        out.push('\n');
        for row in rows {
            let cells: Vec<String> = (0..cols).map(|i| row.get(i).cloned().unwrap_or_default()).collect();
            out.push_str(&line(&cells, &widths));
            out.push('\n');
        }
        out.push_str(&border);
        out
    }
}

pub mod config {
    //! `callgraph.toml` loading. Every field is optional; command-line flags
    //! take precedence over the file, and the file over built-in defaults.
    use crate::errors::CallGraphError;
    use crate::graph::{Granularity, ResolveStrategy};
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;
    use std::str::FromStr;

    pub const CONFIG_FILE_NAME: &str = "callgraph.toml";

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct BuildSection {
        pub granularity: Option<String>, // "function" | "file"
        pub include_external: Option<bool>,
        pub strategy: Option<String>, // "semantic" | "heuristic"
        pub timeout_secs: Option<u64>,
        pub no_ignore: Option<bool>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct CacheSection {
        pub capacity: Option<usize>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct ExportSection {
        pub format: Option<String>, // "mermaid" | "dot"
        pub max_nodes: Option<usize>,
        pub theme: Option<String>,   // "light" | "dark"
        pub rankdir: Option<String>, // "LR" | "TB"
        pub clusters: Option<bool>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct QuerySection {
        pub default_format: Option<String>, // "text" | "json"
        pub search_limit: Option<usize>,
        pub top: Option<usize>,
    }

    #[derive(Debug, Clone, Deserialize, Default)]
    pub struct Config {
        pub build: Option<BuildSection>,
        pub cache: Option<CacheSection>,
        pub export: Option<ExportSection>,
        pub query: Option<QuerySection>,
    }

    fn parse_opt<T: FromStr<Err = CallGraphError>>(v: Option<&String>) -> Result<Option<T>, CallGraphError> {
        v.map(|s| s.parse()).transpose()
    }

    impl Config {
        /// # Errors
        /// Returns `CallGraphError::Config` for an unknown granularity name.
        pub fn granularity(&self) -> Result<Option<Granularity>, CallGraphError> {
            parse_opt(self.build.as_ref().and_then(|b| b.granularity.as_ref()))
        }

        /// # Errors
        /// Returns `CallGraphError::Config` for an unknown strategy name.
        pub fn strategy(&self) -> Result<Option<ResolveStrategy>, CallGraphError> {
            parse_opt(self.build.as_ref().and_then(|b| b.strategy.as_ref()))
        }

        #[must_use]
        pub fn include_external(&self) -> Option<bool> {
            self.build.as_ref().and_then(|b| b.include_external)
        }

        #[must_use]
        pub fn no_ignore(&self) -> Option<bool> {
            self.build.as_ref().and_then(|b| b.no_ignore)
        }

        #[must_use]
        pub fn timeout_secs(&self) -> Option<u64> {
            self.build.as_ref().and_then(|b| b.timeout_secs)
        }

        #[must_use]
        pub fn cache_capacity(&self) -> Option<usize> {
            self.cache.as_ref().and_then(|c| c.capacity)
        }
    }

    /// Load a config file.
    ///
    /// # Errors
    /// Returns `CallGraphError::Config` if the file cannot be read or is not valid TOML
    /// for this schema.
    pub fn load_config_at(path: &Path) -> Result<Config, CallGraphError> {
        let data = fs::read_to_string(path)
            .map_err(|e| CallGraphError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str::<Config>(&data).map_err(|e| CallGraphError::Config(format!("{}: {e}", path.display())))
    }

    /// Load `callgraph.toml` from `root` if present.
    ///
    /// # Errors
    /// Same as [`load_config_at`] when the file exists but is invalid.
    pub fn load_config_near(root: &Path) -> Result<Option<Config>, CallGraphError> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            load_config_at(&path).map(Some)
        } else {
            Ok(None)
        }
    }
}

pub mod file_walker {
    //! Python source discovery honouring `.gitignore`/`.ignore`.
    use std::ffi::OsStr;
    use std::path::{Path, PathBuf};
    use std::time::UNIX_EPOCH;

    /// Dependency, build and cache directories never worth analysing.
    const EXCLUDED_DIRS: &[&str] = &[
        "__pycache__",
        "venv",
        "env",
        "site-packages",
        "node_modules",
        "dist",
        "build",
    ];

    /// A discovered source file with its change fingerprint.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SourceFile {
        pub path: PathBuf,
        /// Relative to the walk root, `/`-separated.
        pub rel_path: String,
        pub len: u64,
        pub mtime_ns: u128,
    }

    fn is_excluded_dir(name: &OsStr) -> bool {
        name.to_str().is_some_and(|n| EXCLUDED_DIRS.contains(&n))
    }

    fn rel_path_of(root: &Path, path: &Path) -> String {
        let rel = path.strip_prefix(root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Discover `.py` files under `root`, sorted by relative path.
    ///
    /// Hidden entries and well-known dependency directories are always skipped;
    /// `no_ignore` only bypasses `.gitignore`/`.ignore` rules.
    #[must_use]
    pub fn python_files(root: &Path, no_ignore: bool) -> Vec<SourceFile> {
        let mut walker = ignore::WalkBuilder::new(root);
        walker
            .follow_links(false)
            .hidden(true)
            .git_ignore(!no_ignore)
            .git_global(false)
            .git_exclude(false)
            .ignore(!no_ignore)
            .parents(!no_ignore)
            .require_git(false)
            .filter_entry(|e| {
                e.depth() == 0
                    || !e.file_type().is_some_and(|t| t.is_dir())
                    || !is_excluded_dir(e.file_name())
            });

        let mut out = Vec::new();
        for entry in walker.build().flatten() {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if entry.path().extension() != Some(OsStr::new("py")) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let mtime_ns = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            out.push(SourceFile {
                path: entry.path().to_path_buf(),
                rel_path: rel_path_of(root, entry.path()),
                len: meta.len(),
                mtime_ns,
            });
        }
        out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn table_aligns_text_left_and_numbers_right() {
        let rows = vec![vec!["main".to_string(), "3".to_string()], vec!["process".to_string(), "12".to_string()]];
        let out = table::render(&["Node", "In"], &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+---------+----+");
        assert_eq!(lines[1], "| Node    | In |");
        assert_eq!(lines[3], "| main    |  3 |");
        assert_eq!(lines[4], "| process | 12 |");
    }

    #[test]
    fn table_pads_short_rows() {
        let out = table::render(&["A", "B"], &[vec!["x".to_string()]]);
        assert!(out.contains("| x |   |"));
    }

    #[test]
    fn walker_skips_hidden_dependency_and_ignored_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for rel in [
            "app.py",
            "pkg/mod.py",
            "venv/lib.py",
            ".venv/lib.py",
            "pkg/__pycache__/mod.py",
            "generated/out.py",
            "notes.txt",
        ] {
            let p = root.join(rel);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "x = 1\n").unwrap();
        }
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let found: Vec<String> = file_walker::python_files(root, false).into_iter().map(|f| f.rel_path).collect();
        assert_eq!(found, vec!["app.py".to_string(), "pkg/mod.py".to_string()]);

        let all: Vec<String> = file_walker::python_files(root, true).into_iter().map(|f| f.rel_path).collect();
        assert!(all.contains(&"generated/out.py".to_string()));
        assert!(!all.contains(&"venv/lib.py".to_string()));
    }

    #[test]
    fn walker_records_size_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "pass\n").unwrap();
        let files = file_walker::python_files(dir.path(), false);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].len, 5);
        assert!(files[0].mtime_ns > 0);
    }
}
