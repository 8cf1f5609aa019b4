//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Sessions wait on
//! the stream or on their cancellation signal, never on a timer.
//! **Exceptions**: test code

use architectural_enforcement::{code_part, scan};

const FORBIDDEN: &[&str] = &["thread::sleep", "time::sleep(", "sleep_until("];

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|_, lines, idx| {
        let code = code_part(lines[idx]);
        FORBIDDEN
            .iter()
            .any(|pattern| code.contains(pattern))
            .then_some("Sleep call")
    });

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ Wait on the stream, a channel or the cancel signal instead");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
