//! Architectural Enforcement Helpers
//!
//! Source scanning shared by the integration tests in `tests/`:
//! - `sleep_prohibition`: no sleeping in production code outside paced replay
//! - `blocking_io_prohibition`: no blocking I/O inside async functions
//!
//! The scanners work line by line. They are heuristics tuned to how this
//! workspace is formatted (rustfmt output), not a Rust parser.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["relay/core/src", "relay/cli/src"];

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files below `dir`, sorted for stable reports
#[must_use]
pub fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .collect();
    files.sort();
    files
}

/// A production source file, cut at its `#[cfg(test)]` module
#[derive(Debug)]
pub struct SourceFile {
    /// Path as scanned
    pub path: PathBuf,
    /// Lines before the first `#[cfg(test)]`
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Read `path`; unreadable files yield `None`
    #[must_use]
    pub fn read(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            lines: production_lines(&content),
        })
    }

    /// Lines as string slices, for the context helpers
    #[must_use]
    pub fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }

    /// `path:line - text` report entry for the 0-based `idx`
    #[must_use]
    pub fn report(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// Every production source file in [`PRODUCTION_DIRS`]
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| rust_sources(&root.join(dir)))
        .filter_map(|path| SourceFile::read(&path))
        .collect()
}

/// Lines preceding the first `#[cfg(test)]` attribute
#[must_use]
pub fn production_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(str::to_string)
        .collect()
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function declared on a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    /// `fn`, with any visibility
    Sync,
    /// `async fn`, with any visibility
    Async,
}

/// Classify a line as a function declaration
#[must_use]
pub fn fn_declaration(line: &str) -> Option<FnKind> {
    let mut rest = line.trim_start();
    if let Some(stripped) = rest.strip_prefix("pub") {
        rest = stripped.trim_start();
        if rest.starts_with('(') {
            let close = rest.find(')')?;
            rest = rest[close + 1..].trim_start();
        }
    }
    if let Some(stripped) = rest.strip_prefix("async ") {
        return stripped.trim_start().starts_with("fn ").then_some(FnKind::Async);
    }
    rest.starts_with("fn ").then_some(FnKind::Sync)
}

/// Nearest function declaration at or above `current_idx`
///
/// Stops at `mod` and `impl` boundaries.
#[must_use]
pub fn enclosing_fn(lines: &[&str], current_idx: usize) -> Option<(usize, FnKind)> {
    for i in (0..=current_idx).rev() {
        if let Some(kind) = fn_declaration(lines[i]) {
            return Some((i, kind));
        }

        let line = lines[i].trim();
        if line.starts_with("mod ") || (line.starts_with("impl") && line.ends_with('{')) {
            return None;
        }
    }
    None
}

/// Whether `current_idx` is inside an `async fn`
#[must_use]
pub fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    matches!(enclosing_fn(lines, current_idx), Some((_, FnKind::Async)))
}

/// Whether `current_idx` is inside a function marked as a test
#[must_use]
pub fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    let Some((fn_idx, _)) = enclosing_fn(lines, current_idx) else {
        return false;
    };

    for i in (0..fn_idx).rev() {
        let line = lines[i].trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_declaration_visibility() {
        assert_eq!(fn_declaration("fn main() {"), Some(FnKind::Sync));
        assert_eq!(fn_declaration("    pub fn load() {"), Some(FnKind::Sync));
        assert_eq!(
            fn_declaration("pub(crate) async fn replay<S>("),
            Some(FnKind::Async)
        );
        assert_eq!(fn_declaration("    async fn run(&self) {"), Some(FnKind::Async));
        assert_eq!(fn_declaration("let f = fn_ptr;"), None);
        assert_eq!(fn_declaration("pub struct Fn;"), None);
    }

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let content = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}", ""]);
    }

    #[test]
    fn test_enclosing_fn_stops_at_impl() {
        let lines = vec![
            "async fn outer() {}",
            "impl Thing {",
            "    const X: u8 = 1;",
        ];
        assert_eq!(enclosing_fn(&lines, 2), None);
        assert!(is_in_async_function(&lines, 0));
    }

    #[test]
    fn test_test_function_detection() {
        let lines = vec![
            "#[tokio::test]",
            "async fn test_something() {",
            "    std::fs::read_to_string(\"x\");",
            "}",
            "fn helper() {",
            "    std::fs::read_to_string(\"y\");",
            "}",
        ];
        assert!(is_in_test_function(&lines, 2));
        assert!(!is_in_test_function(&lines, 5));
    }

    #[test]
    fn test_workspace_root_contains_production_dirs() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
    }
}
