//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that scan the workspace's
//! production sources and enforce:
//! - No sleep() calls (wait on I/O, never on the clock)
//! - Async I/O only inside async code
//! - No `unwrap()` / `expect()` outside tests
//!
//! The scanners are line based. They understand comments, `#[cfg(test)]`
//! modules, test attributes and the nearest enclosing `fn`, which is enough
//! for the code layout used here.

use std::fmt;
use std::path::{Path, PathBuf};

/// Source directories that count as production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["citechat/core/src", "citechat/cli/src"];

/// Workspace root, derived from this crate's manifest location
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// One rule violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// File containing the violation
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Short rule description
    pub kind: &'static str,
    /// The offending source line, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

/// All `.rs` files under `dir`
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a trimmed line declares a function
#[must_use]
pub fn is_fn_declaration(line: &str) -> bool {
    let mut rest = line.trim_start();
    loop {
        let stripped = ["pub(crate) ", "pub(super) ", "pub ", "async ", "const ", "unsafe "]
            .iter()
            .find_map(|prefix| rest.strip_prefix(prefix));
        match stripped {
            Some(next) => rest = next,
            None => break,
        }
    }
    rest.starts_with("fn ")
}

/// Whether a function declaration line is async
#[must_use]
pub fn is_async_fn(line: &str) -> bool {
    is_fn_declaration(line) && line.contains("async fn ")
}

/// Index of the nearest function declaration at or above `idx`
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> Option<usize> {
    for i in (0..=idx).rev() {
        let line = lines[i].trim();
        if is_fn_declaration(line) {
            return Some(i);
        }
        if line.starts_with("mod ") || line.starts_with("pub mod ") || line.starts_with("impl") {
            return None;
        }
    }
    None
}

/// Index where the `#[cfg(test)]` module starts, if any
#[must_use]
pub fn test_module_start(lines: &[&str]) -> Option<usize> {
    lines.windows(2).position(|pair| {
        pair[0].trim() == "#[cfg(test)]" && pair[1].trim_start().starts_with("mod ")
    })
}

/// Whether line `idx` is test code: in the test module or a test function
#[must_use]
pub fn is_in_test_code(lines: &[&str], idx: usize) -> bool {
    if test_module_start(lines).is_some_and(|start| idx >= start) {
        return true;
    }

    let Some(fn_idx) = enclosing_fn(lines, idx) else {
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

/// Whether line `idx` is inside an async function
#[must_use]
pub fn is_in_async_function(lines: &[&str], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|i| is_async_fn(lines[i]))
}

/// Whether line `idx` is inside a non-async function
#[must_use]
pub fn is_in_non_async_function(lines: &[&str], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|i| !is_async_fn(lines[i]))
}

/// Run `check` over every non-test production line
///
/// `check` receives all lines of the file, the line index, and the code part
/// of that line, and returns a rule description when the line violates it.
pub fn scan<F>(check: F) -> Vec<Violation>
where
    F: Fn(&[&str], usize, &str) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();

    for dir in PRODUCTION_DIRS {
        for path in rust_files(&root.join(dir)) {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();

            for (idx, line) in lines.iter().enumerate() {
                if is_in_test_code(&lines, idx) {
                    continue;
                }
                if let Some(kind) = check(&lines, idx, code_part(line)) {
                    violations.push(Violation {
                        path: path.clone(),
                        line: idx + 1,
                        kind,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_declarations() {
        assert!(is_fn_declaration("fn main() {"));
        assert!(is_fn_declaration("    pub async fn append("));
        assert!(is_fn_declaration("pub(crate) fn mutate<R>("));
        assert!(!is_fn_declaration("let f = fn_pointer;"));
        assert!(is_async_fn("pub async fn run() {"));
        assert!(!is_async_fn("pub fn run() {"));
    }

    #[test]
    fn test_async_detection() {
        let code = vec![
            "pub async fn bad_function() {",
            "    let contents = std::fs::read_to_string(\"file.txt\")?;",
            "}",
        ];
        assert!(is_in_async_function(&code, 1));
        assert!(!is_in_non_async_function(&code, 1));
    }

    #[test]
    fn test_non_async_detection() {
        let code = vec![
            "fn load_file_layer() {",
            "    let contents = std::fs::read_to_string(\"config.toml\")?;",
            "}",
        ];
        assert!(is_in_non_async_function(&code, 1));
    }

    #[test]
    fn test_test_code_detection() {
        let code = vec![
            "fn production() {}",
            "",
            "#[tokio::test]",
            "async fn test_something() {",
            "    thing.unwrap();",
            "}",
        ];
        assert!(is_in_test_code(&code, 4));
        assert!(!is_in_test_code(&code, 0));

        let module = vec!["fn a() {}", "#[cfg(test)]", "mod tests {", "    x.unwrap();", "}"];
        assert_eq!(test_module_start(&module), Some(1));
        assert!(is_in_test_code(&module, 3));
    }

    #[test]
    fn test_comments_ignored() {
        assert_eq!(code_part("let x = 1; // x.unwrap()"), "let x = 1; ");
        assert_eq!(code_part("//! docs .unwrap()"), "");
    }

    #[test]
    fn test_production_dirs_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).is_dir(), "missing {dir}");
        }
    }
}
