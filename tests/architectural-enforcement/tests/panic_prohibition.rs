//! Integration Test: Panic Prohibition
//!
//! **Policy**: production code propagates errors; it MUST NOT call
//! `.unwrap()` or `.expect(..)`. `unwrap_or*` variants are fine.
//! **Exceptions**: test code.

use architectural_enforcement::scan;

#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(|_, _, code| {
        if code.contains(".unwrap()") {
            Some("unwrap() in production")
        } else if code.contains(".expect(") {
            Some("expect() in production")
        } else {
            None
        }
    });

    if !violations.is_empty() {
        eprintln!("\nPanicking calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }

        panic!(
            "\nFound {} unwrap/expect violation(s) in production code.",
            violations.len()
        );
    }
}
