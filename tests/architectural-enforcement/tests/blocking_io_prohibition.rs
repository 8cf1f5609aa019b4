//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O. A blocked
//! worker delays every session scheduled on it, including the cancellation
//! of a superseded one.
//! **Required**: reqwest async client, `tokio::io`, `tokio::fs`
//! **Acceptable**: non-async functions (configuration loading before the
//! runtime work starts), test code

use architectural_enforcement::{code_part, is_in_async_function, scan};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(|_, lines, idx| {
        let code = code_part(lines[idx]);

        if code.contains("reqwest::blocking") {
            return Some("Blocking HTTP client");
        }
        if code.contains("std::net::") || code.trim_start().starts_with("use std::net") {
            return Some("Blocking network I/O");
        }
        if !is_in_async_function(lines, idx) {
            return None;
        }
        if code.contains("std::fs::") {
            return Some("Blocking file I/O in async");
        }
        if code.contains("std::io::stdin()") {
            return Some("Blocking stdin in async");
        }
        if code.contains("std::process::Command") {
            return Some("Blocking process I/O in async");
        }
        None
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - reqwest::Client (async), bytes_stream()");
        eprintln!("  - tokio::io::stdin() with AsyncBufReadExt");
        eprintln!("  - tokio::fs::read_to_string().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
