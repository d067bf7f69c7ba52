//! Helpers for pulling Julia code out of model responses and preparing it
//! for a check run.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::state::CodeBlock;

static JULIA_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```julia\s*([\s\S]*?)```").expect("valid regex"));

/// Snippets that mean the code tries to change the package environment.
const PACKAGE_INSTALL_MARKERS: &[&str] = &["using Pkg", "Pkg.add", "Pkg.update", "Pkg.instantiate"];

/// Argument names rewritten by [`shorter_simulations`].
const SHORTENED_ARGUMENTS: &[&str] = &["case", "dt", "timesteps"];

/// Every fenced julia block in `response`, trimmed and joined by a blank line.
pub fn code_string_from_response(response: &str) -> String {
    JULIA_BLOCK
        .captures_iter(response)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split a response into imports and code.
///
/// With `within_julia_context` only fenced julia blocks are considered;
/// otherwise the whole text is treated as code.
pub fn code_from_response(response: &str, within_julia_context: bool) -> CodeBlock {
    let code = if within_julia_context {
        code_string_from_response(response)
    } else {
        response.to_string()
    };
    if code.is_empty() {
        return CodeBlock::default();
    }

    let mut imports = Vec::new();
    let mut body = Vec::new();
    for line in code.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("using ") {
            imports.push(trimmed);
        } else {
            body.push(line);
        }
    }

    CodeBlock::new(imports.join("\n"), body.join("\n").trim())
}

pub fn add_julia_context(code: &str) -> String {
    format!("```julia\n{code}\n```")
}

pub fn remove_julia_context(code: &str) -> String {
    code.replace("```julia\n", "").replace("\n```", "")
}

/// Activate the local project when all of `packages` are referenced.
pub fn fix_imports(code: &str, packages: &[String]) -> String {
    if packages.is_empty() || !packages.iter().all(|p| code.contains(p.as_str())) {
        return code.to_string();
    }
    format!("using Pkg; Pkg.activate(\".\");\n{code}")
}

/// Rewrite simulation calls so the check run only covers the first step.
///
/// Known argument names (`case`, `dt`, `timesteps`) are sliced to `[1:1]`.
/// If none of them appear, the first argument of each call is sliced instead.
pub fn shorter_simulations(code: &str, functions: &[String]) -> String {
    let mut out = code.to_string();
    for name in SHORTENED_ARGUMENTS {
        out = replace_argument(&out, name, functions);
    }
    if out == code {
        out = shorten_first_argument(&out, functions);
    }
    out
}

fn replace_argument(code: &str, argument: &str, functions: &[String]) -> String {
    let mut out = code.to_string();
    for func in functions {
        let pattern = format!(
            r"(?s)({}\s*\(.*?)\b{}\b(.*?\))",
            regex::escape(func),
            regex::escape(argument)
        );
        match Regex::new(&pattern) {
            Ok(re) => {
                let replacement = format!("${{1}}{argument}[1:1]${{2}}");
                out = re.replace_all(&out, replacement.as_str()).into_owned();
            }
            Err(e) => warn!(function = %func, error = %e, "skipping simulation rewrite"),
        }
    }
    out
}

fn shorten_first_argument(code: &str, functions: &[String]) -> String {
    let mut out = code.to_string();
    for func in functions {
        let pattern = format!(r"(?s)({}\s*\()\s*([^,)\s]+)(.*?\))", regex::escape(func));
        match Regex::new(&pattern) {
            Ok(re) => out = re.replace_all(&out, "${1}${2}[1:1]${3}").into_owned(),
            Err(e) => warn!(function = %func, error = %e, "skipping simulation rewrite"),
        }
    }
    out
}

/// True when the block would modify the package environment.
pub fn check_for_package_install(block: &CodeBlock) -> bool {
    PACKAGE_INSTALL_MARKERS
        .iter()
        .any(|m| block.imports.contains(m) || block.code.contains(m))
}

/// Split `provider:model` at the first colon.
pub fn provider_and_model(name: &str) -> Result<(&str, &str)> {
    match name.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Ok((provider, model)),
        _ => Err(Error::InvalidModelName(name.to_string())),
    }
}

/// Cut `text` to at most `limit` bytes on a char boundary, marking the cut.
pub fn truncate_for_display(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sims() -> Vec<String> {
        vec!["simulate_reservoir".to_string()]
    }

    #[test]
    fn test_extract_single_block() {
        let response = "Here you go:\n```julia\nusing JUDI\nx = 1\n```\nDone.";
        assert_eq!(code_string_from_response(response), "using JUDI\nx = 1");
    }

    #[test]
    fn test_extract_multiple_blocks_case_insensitive() {
        let response = "```Julia\na = 1\n```\ntext\n```julia\n\n```\n```JULIA\nb = 2\n```";
        assert_eq!(code_string_from_response(response), "a = 1\n\nb = 2");
    }

    #[test]
    fn test_no_block() {
        assert_eq!(code_string_from_response("plain answer"), "");
        assert!(code_from_response("plain answer", true).is_empty());
    }

    #[test]
    fn test_code_from_response_splits_imports() {
        let response = "```julia\nusing JUDI\n  using LinearAlgebra\n\nn = (120, 100)\nmodel = Model(n, d, o, m)\n```";
        let block = code_from_response(response, true);
        assert_eq!(block.imports, "using JUDI\nusing LinearAlgebra");
        assert_eq!(block.code, "n = (120, 100)\nmodel = Model(n, d, o, m)");
    }

    #[test]
    fn test_code_from_raw_text() {
        let block = code_from_response("using JUDI\nx = 1\n", false);
        assert_eq!(block, CodeBlock::new("using JUDI", "x = 1"));
    }

    #[test]
    fn test_julia_context_roundtrip() {
        let code = "x = 1\ny = 2";
        assert_eq!(remove_julia_context(&add_julia_context(code)), code);
    }

    #[test]
    fn test_fix_imports() {
        let packages = vec!["Fimbul".to_string(), "GLMakie".to_string()];
        let code = "using Fimbul, GLMakie\nx = 1";
        assert_eq!(
            fix_imports(code, &packages),
            "using Pkg; Pkg.activate(\".\");\nusing Fimbul, GLMakie\nx = 1"
        );
        assert_eq!(fix_imports("using JUDI", &packages), "using JUDI");
    }

    #[test]
    fn test_shorter_simulations_named_arguments() {
        let code = "result = simulate_reservoir(case, dt; info_level = 0)";
        assert_eq!(
            shorter_simulations(code, &sims()),
            "result = simulate_reservoir(case[1:1], dt[1:1]; info_level = 0)"
        );
    }

    #[test]
    fn test_shorter_simulations_first_argument_fallback() {
        let code = "ws, states = simulate_reservoir(my_case, output_substates = true)";
        assert_eq!(
            shorter_simulations(code, &sims()),
            "ws, states = simulate_reservoir(my_case[1:1], output_substates = true)"
        );
    }

    #[test]
    fn test_shorter_simulations_ignores_other_calls() {
        let code = "model = Model(n, d, o, m)";
        assert_eq!(shorter_simulations(code, &sims()), code);
    }

    #[test]
    fn test_check_for_package_install() {
        assert!(check_for_package_install(&CodeBlock::new("using Pkg", "")));
        assert!(check_for_package_install(&CodeBlock::new("", "Pkg.add(\"JUDI\")")));
        assert!(!check_for_package_install(&CodeBlock::new("using JUDI", "x = 1")));
    }

    #[test]
    fn test_provider_and_model() {
        assert_eq!(
            provider_and_model("ollama:qwen2.5:1.5b").unwrap(),
            ("ollama", "qwen2.5:1.5b")
        );
        assert!(provider_and_model("gpt-4").is_err());
        assert!(provider_and_model(":model").is_err());
    }

    #[test]
    fn test_truncate_for_display() {
        assert_eq!(truncate_for_display("short", 10), "short");
        assert_eq!(truncate_for_display("abcdef", 3), "abc...");
        // multi-byte char straddling the limit
        assert_eq!(truncate_for_display("aé", 2), "a...");
    }
}
