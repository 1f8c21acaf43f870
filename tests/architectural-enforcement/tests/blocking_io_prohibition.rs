//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async production code MUST NOT use blocking I/O.
//! **Required**: `tokio::io`, `tokio::fs`, `reqwest` async client.
//! **Allowed**: non-async functions (e.g. config loading before the chat
//! loop starts), test code.

use architectural_enforcement::{is_in_async_function, is_in_non_async_function, scan};

#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = scan(|lines, idx, code| {
        if is_in_non_async_function(lines, idx) {
            return None;
        }

        if code.contains("std::fs::") || code.contains("use std::fs") {
            return Some("Blocking file I/O");
        }
        if code.contains("std::net::") || code.contains("use std::net") {
            return Some("Blocking network I/O");
        }
        if code.contains("std::process::Command") {
            return Some("Blocking process I/O");
        }
        if code.contains("reqwest::blocking") {
            return Some("Blocking HTTP client");
        }
        if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            && is_in_async_function(lines, idx)
        {
            return Some("Blocking stdin/stdout in async");
        }
        None
    });

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::io / tokio::fs inside async code.");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}
