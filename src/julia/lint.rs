use tracing::{info, warn};

use super::runner::{JuliaRunner, ProcessOutput};
use crate::code::truncate_for_display;

pub const LINT_SCRIPT: &str = "julia_lint_script.jl";

const LINT_MARKER: &str = "STARTING LINT:";

/// Lint `code` and return the reported issues, or `""` when there are none.
///
/// A linter that cannot run, times out or prints no marker is treated as
/// having found nothing; the code runner still checks the code afterwards.
pub async fn linting_result(runner: &JuliaRunner, code: &str) -> String {
    match runner.run_file(code, LINT_SCRIPT).await {
        Ok(out) => parse_lint_output(&out),
        Err(e) => {
            warn!(error = %e, "linter failed to start, skipping");
            String::new()
        }
    }
}

/// Extract linter findings from the helper script output.
pub fn parse_lint_output(out: &ProcessOutput) -> String {
    if out.stderr.to_lowercase().contains("timed out") {
        warn!("linter timed out while loading packages, skipping lint check");
        return String::new();
    }

    let lines: Vec<&str> = out.stdout.lines().collect();
    if let Some(pos) = lines.iter().position(|l| l.contains(LINT_MARKER)) {
        let findings = lines[pos + 1..].join("\n");
        if findings.is_empty() {
            info!("no linting issues found");
        }
        return findings;
    }

    if !out.stdout.is_empty() {
        warn!(
            output = %truncate_for_display(&out.stdout, 500),
            "linter produced no marker, output may be incomplete"
        );
    }
    if !out.stderr.is_empty() {
        warn!(stderr = %truncate_for_display(&out.stderr, 500), "linter error output");
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn test_findings_after_marker() {
        let out = output(
            "Activating project\nSTARTING LINT:\nLine 3: Missing reference: judiVectr\nLine 5: unused variable",
            "",
        );
        assert_eq!(
            parse_lint_output(&out),
            "Line 3: Missing reference: judiVectr\nLine 5: unused variable"
        );
    }

    #[test]
    fn test_clean_lint() {
        assert_eq!(parse_lint_output(&output("STARTING LINT:\n", "")), "");
    }

    #[test]
    fn test_timeout_is_skipped() {
        let out = output(
            "STARTING LINT:\nshould be ignored",
            "Error: Julia process TIMED OUT after 30 seconds.",
        );
        assert_eq!(parse_lint_output(&out), "");
    }

    #[test]
    fn test_missing_marker() {
        let out = output("partial output", "ERROR: LoadError: StaticLint not found");
        assert_eq!(parse_lint_output(&out), "");
    }
}
