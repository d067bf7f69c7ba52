use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::runner::RunResult;

const MARKER: &str = "\nStacktrace:\n";

// Tolerates CRLF line endings and indentation around the header.
static LOOSE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.*?)\r?\n[ \t]*Stacktrace:[ \t]*\r?\n(.*)$").expect("valid regex")
});

/// Split Julia error output into the message and the stacktrace, if any.
pub fn split_stacktrace(msg: &str) -> (String, Option<String>) {
    if let Some((head, stack)) = msg.split_once(MARKER) {
        return (head.trim().to_string(), Some(stack.trim().to_string()));
    }
    if let Some(caps) = LOOSE_MARKER.captures(msg) {
        let head = caps.get(1).map_or("", |m| m.as_str());
        let stack = caps.get(2).map_or("", |m| m.as_str());
        return (head.trim().to_string(), Some(stack.trim().to_string()));
    }
    (msg.trim().to_string(), None)
}

/// Drop stacktrace lines matching any of `patterns` (regular expressions).
///
/// Returns `None` when nothing is left.
pub fn filter_stacktrace(stack: &str, patterns: &[String]) -> Option<String> {
    let compiled: Vec<Regex> = patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %p, error = %e, "ignoring invalid stacktrace pattern");
                None
            }
        })
        .collect();

    let kept: Vec<&str> = stack
        .lines()
        .filter(|line| !compiled.iter().any(|re| re.is_match(line)))
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}

/// Message followed by the stacktrace section, as shown to the model.
pub fn error_message(result: &RunResult) -> String {
    match &result.error_stacktrace {
        Some(stack) => format!("{}\n\nStacktrace:\n{}", result.error_message, stack),
        None => result.error_message.clone(),
    }
}
