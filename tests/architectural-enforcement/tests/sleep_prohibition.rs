//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in relay MUST NOT sleep. A session waits on
//! the network, the sink or its cancellation token, never on a timer.
//! **Exception**: the paced fallback replay in `relay/core/src/fallback.rs`,
//! which must race its pause against cancellation.

use std::path::Path;

use architectural_enforcement::{code_part, is_in_test_function, production_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Paced fallback replay, inside a select! on the cancellation token");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for chunks (await the stream instead)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn find_sleep_violations() -> Vec<String> {
    let policy = SleepPolicy {
        allow_paced_replay: true,
        allow_tests: true,
    };

    let mut violations = Vec::new();
    for file in production_sources() {
        let lines = file.line_refs();
        for idx in 0..lines.len() {
            if is_sleep_violation(&file.path, &lines, idx, &policy) {
                violations.push(file.report(idx, "Sleep"));
            }
        }
    }
    violations
}

struct SleepPolicy {
    allow_paced_replay: bool,
    allow_tests: bool,
}

fn is_sleep_violation(path: &Path, lines: &[&str], idx: usize, policy: &SleepPolicy) -> bool {
    let code = code_part(lines[idx]);
    if !code.contains("::sleep(") && !code.contains(".sleep(") {
        return false;
    }

    if policy.allow_tests && is_in_test_function(lines, idx) {
        return false;
    }

    if policy.allow_paced_replay
        && path.ends_with("relay/core/src/fallback.rs")
        && is_cancellable_pause(lines, idx)
    {
        return false;
    }

    true
}

/// Sleep sits in a `select!` that also waits on `cancelled()`
fn is_cancellable_pause(lines: &[&str], current_idx: usize) -> bool {
    let context = current_idx.saturating_sub(4)..std::cmp::min(current_idx + 3, lines.len());

    let mut in_select = false;
    let mut watches_cancel = false;
    for i in context {
        let line = lines[i];
        if line.contains("select!") {
            in_select = true;
        }
        if line.contains(".cancelled()") {
            watches_cancel = true;
        }
    }

    in_select && watches_cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACED: &[&str] = &[
        "    for (index, piece) in pieces.into_iter().enumerate() {",
        "        if index > 0 {",
        "            tokio::select! {",
        "                biased;",
        "                () = emitter.token().cancelled() => return Err(Cancelled),",
        "                () = tokio::time::sleep(interval) => {}",
        "            }",
        "        }",
    ];

    fn policy() -> SleepPolicy {
        SleepPolicy {
            allow_paced_replay: true,
            allow_tests: true,
        }
    }

    #[test]
    fn test_sleep_violation_detection() {
        let lines = vec![
            "async fn wait_for_chunk() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];
        assert!(is_sleep_violation(
            Path::new("relay/core/src/session.rs"),
            &lines,
            1,
            &policy()
        ));
    }

    #[test]
    fn test_paced_replay_allowed_only_in_fallback() {
        assert!(!is_sleep_violation(
            Path::new("relay/core/src/fallback.rs"),
            PACED,
            5,
            &policy()
        ));
        assert!(is_sleep_violation(
            Path::new("relay/core/src/session.rs"),
            PACED,
            5,
            &policy()
        ));
    }

    #[test]
    fn test_uncancellable_pause_rejected() {
        let lines = vec![
            "pub(crate) async fn replay() {",
            "    tokio::time::sleep(interval).await;",
            "}",
        ];
        assert!(is_sleep_violation(
            Path::new("relay/core/src/fallback.rs"),
            &lines,
            1,
            &policy()
        ));
    }

    #[test]
    fn test_commented_sleep_ignored() {
        let lines = vec!["    // tokio::time::sleep(interval).await;"];
        assert!(!is_sleep_violation(
            Path::new("relay/core/src/session.rs"),
            &lines,
            0,
            &policy()
        ));
    }
}
