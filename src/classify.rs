//! Detecting `go test -json` runs where no tests executed
//!
//! A package without test files produces exactly three events: `start`, an
//! `output` line saying `[no test files]`, and a final `skip`. Uploading such
//! a run would only add noise.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

/// Lines parsed before giving up; any fourth event means tests ran.
const MAX_PARSED_LINES: usize = 4;

/// One event from `go test -json` (see `go doc test2json`)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoTestEvent {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub elapsed: f64,
}

/// True when the captured `go test -json` output shows that no tests ran.
///
/// Unparseable lines are logged and skipped; they never make a run count as
/// empty on their own.
pub fn no_tests_ran(stdout: &[u8]) -> bool {
    let mut parsed = 0;
    let mut last_action = String::new();

    for line in stdout.split(|b| *b == b'\n') {
        if parsed >= MAX_PARSED_LINES {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        match serde_json::from_slice::<GoTestEvent>(line) {
            Ok(event) => {
                parsed += 1;
                last_action = event.action;
            }
            Err(err) => {
                warn!(
                    error = %err,
                    line = %String::from_utf8_lossy(line),
                    "error parsing output line"
                );
            }
        }
    }

    parsed == 3 && last_action == "skip"
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = r#"{"Time":"2024-03-01T10:00:00.000000Z","Action":"start","Package":"example.com/pkg"}"#;
    const NO_FILES: &str = r#"{"Time":"2024-03-01T10:00:00.001Z","Action":"output","Package":"example.com/pkg","Output":"?   \texample.com/pkg\t[no test files]\n"}"#;
    const SKIP: &str = r#"{"Time":"2024-03-01T10:00:00.002Z","Action":"skip","Package":"example.com/pkg","Elapsed":0}"#;
    const RUN: &str = r#"{"Action":"run","Package":"example.com/pkg","Test":"TestA"}"#;
    const PASS: &str = r#"{"Action":"pass","Package":"example.com/pkg","Elapsed":0.01}"#;

    fn lines(parts: &[&str]) -> Vec<u8> {
        let mut out = parts.join("\n");
        out.push('\n');
        out.into_bytes()
    }

    #[test]
    fn test_three_lines_ending_in_skip_is_empty() {
        assert!(no_tests_ran(&lines(&[START, NO_FILES, SKIP])));
    }

    #[test]
    fn test_without_trailing_newline() {
        assert!(no_tests_ran([START, NO_FILES, SKIP].join("\n").as_bytes()));
    }

    #[test]
    fn test_fourth_line_means_tests_ran() {
        assert!(!no_tests_ran(&lines(&[START, NO_FILES, SKIP, START])));
        assert!(!no_tests_ran(&lines(&[START, RUN, NO_FILES, PASS])));
    }

    #[test]
    fn test_three_lines_not_ending_in_skip() {
        assert!(!no_tests_ran(&lines(&[START, RUN, PASS])));
    }

    #[test]
    fn test_fewer_lines() {
        assert!(!no_tests_ran(b""));
        assert!(!no_tests_ran(&lines(&[START, SKIP])));
    }

    #[test]
    fn test_unparseable_lines_are_ignored() {
        assert!(no_tests_ran(&lines(&[
            START,
            "go: downloading example.com/dep v1.0.0",
            NO_FILES,
            SKIP
        ])));
        assert!(!no_tests_ran(b"not json\nstill not json\n"));
    }

    #[test]
    fn test_event_fields() {
        let event: GoTestEvent = serde_json::from_str(NO_FILES).unwrap();
        assert_eq!(event.action, "output");
        assert_eq!(event.package, "example.com/pkg");
        assert!(event.output.contains("[no test files]"));
        assert!(event.time.is_some());
    }
}
