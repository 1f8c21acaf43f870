//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code MUST NOT sleep. Streaming waits on the bridge,
//! the CLI waits on stdin, signals and snapshot changes.
//! **Exceptions**: test code.

use architectural_enforcement::scan;

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(|_, _, code| {
        let sleeps = code.contains("thread::sleep")
            || code.contains("time::sleep")
            || code.contains("sleep_until")
            || code.contains("sleep(");
        sleeps.then_some("Sleep call")
    });

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on I/O (channels, watch, signals) instead.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
