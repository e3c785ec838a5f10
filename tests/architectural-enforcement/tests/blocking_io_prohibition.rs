//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async code in relay MUST NOT block the runtime.
//! **Required**: `tokio::io`, `tokio::net` and `reqwest` async APIs inside
//! `async fn`. Synchronous functions (config loading before the stream
//! starts, for example) may use `std::fs`.

use architectural_enforcement::{code_part, is_in_async_function, production_sources};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();
    for file in production_sources() {
        let lines = file.line_refs();
        for idx in 0..lines.len() {
            if let Some(what) = blocking_io_violation(&lines, idx) {
                violations.push(file.report(idx, what));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n❌ FORBIDDEN in async fn:");
        eprintln!("  - std::fs::read(), std::fs::write(), std::fs::File");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::io::stdin(), std::io::stdout()");
        eprintln!("  - std::thread::sleep()");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::io::stdout() with AsyncWriteExt");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - reqwest::Client::post().send().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Classify a blocking call on line `idx`, if any
fn blocking_io_violation(lines: &[&str], idx: usize) -> Option<&'static str> {
    let code = code_part(lines[idx]);

    // Never acceptable, async or not
    if code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }

    if !is_in_async_function(lines, idx) {
        return None;
    }

    if code.contains("std::fs::") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O")
    } else if code.contains("std::io::stdin()") || code.contains("std::io::stdout()") {
        Some("Blocking stdin/stdout")
    } else if code.contains("std::thread::sleep(") {
        Some("Blocking sleep")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_io_in_async_detected() {
        let lines = vec![
            "pub async fn send(&self) {",
            "    let body = std::fs::read_to_string(\"reply.txt\")?;",
            "}",
        ];
        assert_eq!(blocking_io_violation(&lines, 1), Some("Blocking file I/O"));
    }

    #[test]
    fn test_blocking_io_in_sync_fn_allowed() {
        let lines = vec![
            "pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) {",
            "    let content = std::fs::read_to_string(path)?;",
            "}",
        ];
        assert_eq!(blocking_io_violation(&lines, 1), None);
    }

    #[test]
    fn test_blocking_client_always_rejected() {
        let lines = vec!["use reqwest::blocking::Client;"];
        assert_eq!(
            blocking_io_violation(&lines, 0),
            Some("Blocking HTTP client")
        );
    }

    #[test]
    fn test_stderr_writer_in_sync_fn_allowed() {
        let lines = vec![
            "fn init_logging(level: &str) {",
            "        .with_writer(std::io::stderr)",
            "}",
        ];
        assert_eq!(blocking_io_violation(&lines, 1), None);
    }
}
