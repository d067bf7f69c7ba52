use tracing::{info, warn};

use super::runner::JuliaRunner;

pub const DOC_SCRIPT: &str = "julia_get_function_documentation.jl";

/// Parse the helper script output.
///
/// The script prints a `FUNCTION NAMES:` line, a Julia array literal of
/// names, a `DOCUMENTATION` line and then the docstrings.
pub fn parse_doc_output(output: &str) -> (Vec<String>, String) {
    let lines: Vec<&str> = output.lines().collect();
    let names_start = lines.iter().position(|l| *l == "FUNCTION NAMES:");
    let docs_start = lines.iter().position(|l| *l == "DOCUMENTATION");
    let (Some(names_start), Some(docs_start)) = (names_start, docs_start) else {
        return (Vec::new(), String::new());
    };
    if docs_start <= names_start {
        return (Vec::new(), String::new());
    }

    let raw = lines[names_start + 1..docs_start].concat();
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .unwrap_or(raw);
    let names = inner
        .split(',')
        .map(|n| n.trim().trim_matches('"').to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let documentation = lines[docs_start + 1..].join("\n").trim().to_string();
    (names, documentation)
}

/// Function names used in `code` and their documentation.
pub async fn function_documentation(runner: &JuliaRunner, code: &str) -> (Vec<String>, String) {
    match runner.run_file(code, DOC_SCRIPT).await {
        Ok(out) => {
            let (names, docs) = parse_doc_output(&out.stdout);
            let names: Vec<String> = names.into_iter().filter(|n| n != "String[]").collect();
            if names.is_empty() {
                warn!("no function documentation found");
            } else {
                info!(functions = %names.join(", "), "retrieved function documentation");
            }
            (names, docs)
        }
        Err(e) => {
            warn!(error = %e, "error retrieving function documentation");
            (Vec::new(), String::new())
        }
    }
}

/// Documentation for the named functions.
pub async fn function_documentation_for(runner: &JuliaRunner, names: &[String]) -> (Vec<String>, String) {
    info!(functions = %names.join(", "), "retrieving documentation for functions");
    function_documentation(runner, &calls_for(names)).await
}

fn calls_for(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("{n}();"))
        .collect::<Vec<_>>()
        .join("\n")
}
