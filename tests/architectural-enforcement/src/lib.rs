//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce workspace policy on
//! production code:
//! - No sleep() calls (wait on I/O or cancellation instead)
//! - No blocking I/O inside async functions
//!
//! The helpers here walk the production source trees and give the policy
//! tests the context they need (is this line test code, is it inside an
//! async function).

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by the policy tests, relative to the
/// workspace root
pub const PRODUCTION_DIRS: &[&str] = &["linewindow/core/src", "linewindow/monitor/src"];

/// A policy violation at a source location
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What rule was broken
    pub rule: &'static str,
    /// The offending source line, trimmed
    pub source: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.rule,
            self.source
        )
    }
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Every `.rs` file under the production trees
#[must_use]
pub fn production_files() -> Vec<PathBuf> {
    let root = workspace_root();
    PRODUCTION_DIRS
        .iter()
        .map(|dir| root.join(dir))
        .filter(|dir| dir.exists())
        .flat_map(|dir| {
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
                .map(walkdir::DirEntry::into_path)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Lines of `content` that belong to production code
///
/// Everything from the first `#[cfg(test)]` onwards is test code; modules
/// in this workspace keep their tests at the bottom.
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| !line.trim().starts_with("#[cfg(test)]"))
        .collect()
}

/// Code portion of a line, without a trailing `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether the line opens a function, and if so whether it is async
#[must_use]
pub fn fn_header(line: &str) -> Option<bool> {
    let mut rest = line.trim();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }
    if rest.starts_with("async fn ") {
        Some(true)
    } else if rest.starts_with("fn ") {
        Some(false)
    } else {
        None
    }
}

/// Whether the nearest enclosing function above `idx` is async
#[must_use]
pub fn is_in_async_function(lines: &[&str], idx: usize) -> bool {
    lines[..idx]
        .iter()
        .rev()
        .find_map(|line| fn_header(line))
        .unwrap_or(false)
}

/// Scan every production file with `check`
pub fn scan<F>(mut check: F) -> Vec<Violation>
where
    F: FnMut(&Path, &[&str], usize) -> Option<&'static str>,
{
    let mut violations = Vec::new();

    for path in production_files() {
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let lines = production_lines(&content);

        for idx in 0..lines.len() {
            if let Some(rule) = check(&path, &lines, idx) {
                violations.push(Violation {
                    path: path.clone(),
                    line: idx + 1,
                    rule,
                    source: lines[idx].trim().to_string(),
                });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_header_detection() {
        assert_eq!(fn_header("    pub async fn shutdown(&self) {"), Some(true));
        assert_eq!(fn_header("fn decode(&mut self) -> String {"), Some(false));
        assert_eq!(fn_header("pub(crate) fn helper() {}"), Some(false));
        assert_eq!(fn_header("let f = 1;"), None);
    }

    #[test]
    fn test_async_context_detection() {
        let code = [
            "async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
            "fn fine() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_async_function(&code, 4));
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}"]);
    }

    #[test]
    fn test_production_trees_exist() {
        assert!(!production_files().is_empty());
    }
}
