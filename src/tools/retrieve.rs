//! Lookup tools: JUDI.jl examples, function docstrings and keyword search.

use std::path::Path;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{str_arg, Tool, ToolContext, ToolOutput};
use crate::console::Style;
use crate::julia::function_documentation_for;
use crate::rag::split_examples::format_examples;

const GREP_LIMIT: usize = 20;

pub struct RetrieveJudiExamples;

#[async_trait]
impl Tool for RetrieveJudiExamples {
    fn name(&self) -> &str {
        "retrieve_judi_examples"
    }

    fn description(&self) -> &str {
        "Use this tool to look up full examples from the JUDI.jl documentation. Use this tool when answering any Julia code question about JUDI.jl."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query that will be used for document and example retrieval"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let query = match str_arg(&args, "query") {
            Ok(q) => q.to_string(),
            Err(e) => return e,
        };
        let interaction = &ctx.config.human_interaction;

        let query = if interaction.rag_query {
            ctx.reviewer.modify_rag_query(&query, "JUDI.jl")
        } else {
            ctx.console.panel(
                "Retrieving from JUDI.jl examples",
                &format!("**Query:** `{query}`"),
                Style::Message,
            );
            query
        };
        if query.trim().is_empty() {
            return ToolOutput::ok("The query is empty.");
        }

        let retriever = match ctx.examples().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "could not open the example retriever");
                return ToolOutput::err(format!("Error loading JUDI.jl examples: {e}"));
            }
        };
        let mut docs = retriever.retrieve(&query);
        if interaction.retrieved_examples {
            docs = ctx
                .reviewer
                .on_retrieved(docs, "Modify retrieved JUDI.jl examples", true);
        }

        let examples = format_examples(&docs);
        if examples.is_empty() {
            ToolOutput::ok("(empty)")
        } else {
            ToolOutput::ok(examples)
        }
    }
}

pub struct RetrieveFunctionDocumentation;

#[async_trait]
impl Tool for RetrieveFunctionDocumentation {
    fn name(&self) -> &str {
        "retrieve_function_documentation"
    }

    fn description(&self) -> &str {
        "Retrieve documentation for specific Julia functions. Use this tool when needing detailed information about function signatures and usage."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "function_names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "A list of function names to retrieve the documentation for."
                }
            },
            "required": ["function_names"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let names: Vec<String> = args["function_names"]
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        if names.is_empty() {
            return ToolOutput::err("Error: `function_names` must be a non-empty list of strings.");
        }

        let (_, documentation) = function_documentation_for(&ctx.runner, &names).await;
        if documentation.is_empty() {
            ToolOutput::ok("No function signatures found for the provided function names.")
        } else {
            ToolOutput::ok(documentation)
        }
    }
}

pub struct GrepSearch;

#[async_trait]
impl Tool for GrepSearch {
    fn name(&self) -> &str {
        "grep_search"
    }

    fn description(&self) -> &str {
        "Do a keyword based search in the JUDI.jl documentation. Limited to 20 results. Use this tool to get an overview of which files to consider reading using the file-reader tool."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The keyword based pattern to search for in files. Can be a regex or plain text pattern"
                },
                "includePattern": {
                    "type": "string",
                    "description": "Search files matching this glob pattern."
                },
                "isRegexp": {
                    "type": "boolean",
                    "description": "Whether the pattern is a regex."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let query = match str_arg(&args, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let include = args["includePattern"].as_str();
        let is_regex = args["isRegexp"].as_bool().unwrap_or(false);

        let root = ctx.config.judi_root();
        match grep(&root, query, include, is_regex) {
            Ok(matches) if matches.is_empty() => ToolOutput::ok(format!("No matches found for: {query}")),
            Ok(matches) => {
                let listing = matches.join("\n\n");
                ctx.console.panel(
                    &format!("Grep search: {query}"),
                    &crate::code::truncate_for_display(&listing, 500),
                    Style::Message,
                );
                ToolOutput::ok(format!("Found {} matches:\n{listing}", matches.len()))
            }
            Err(e) => ToolOutput::err(format!("Error during text search: {e}")),
        }
    }
}

fn include_set(include: Option<&str>) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    match include {
        Some(pattern) => {
            builder.add(Glob::new(pattern)?);
        }
        None => {
            builder.add(Glob::new("*.jl")?);
            builder.add(Glob::new("*.md")?);
        }
    }
    builder.build()
}

/// At most [`GREP_LIMIT`] matching lines under `root` as
/// `File: f, Line n: content`, in path order.
fn grep(root: &Path, query: &str, include: Option<&str>, is_regex: bool) -> Result<Vec<String>, String> {
    let pattern = if is_regex {
        query.to_string()
    } else {
        regex::escape(query)
    };
    let re = Regex::new(&pattern).map_err(|e| e.to_string())?;
    let globs = include_set(include).map_err(|e| e.to_string())?;

    let mut files: Vec<_> = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .build()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| e.into_path())
        .filter(|p| {
            p.file_name()
                .is_some_and(|name| globs.is_match(name) || globs.is_match(p))
        })
        .collect();
    files.sort();
    debug!(root = %root.display(), files = files.len(), "grep search");

    let mut matches = Vec::new();
    for path in files {
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (i, line) in content.lines().enumerate() {
            if re.is_match(line) {
                matches.push(format!("File: {}, Line {}: {}", path.display(), i + 1, line));
                if matches.len() >= GREP_LIMIT {
                    return Ok(matches);
                }
            }
        }
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{Document, Retriever, SearchParams, SearchType};
    use crate::tools::test_support::auto_context;

    fn judi_tree(dir: &Path) -> std::path::PathBuf {
        let root = dir.join("rag").join("judi");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(
            root.join("docs").join("abstract_vectors.md"),
            "# judiVector\nA judiVector holds shot records.\nUse judiVector(geometry, data).\n",
        )
        .unwrap();
        std::fs::write(root.join("modeling.jl"), "d_obs = F * q  # judiVector\n").unwrap();
        std::fs::write(root.join("notes.txt"), "judiVector in a text file\n").unwrap();
        root
    }

    #[test]
    fn test_grep_default_filetypes() {
        let dir = tempfile::tempdir().unwrap();
        let root = judi_tree(dir.path());
        let matches = grep(&root, "judiVector", None, false).unwrap();
        assert_eq!(matches.len(), 4);
        assert!(matches[0].starts_with(&format!(
            "File: {}, Line 1: ",
            root.join("docs").join("abstract_vectors.md").display()
        )));
        assert!(matches.iter().all(|m| !m.contains("notes.txt")));
    }

    #[test]
    fn test_grep_include_and_regex() {
        let dir = tempfile::tempdir().unwrap();
        let root = judi_tree(dir.path());
        let matches = grep(&root, "judiVector", Some("*.txt"), false).unwrap();
        assert_eq!(matches.len(), 1);

        let matches = grep(&root, r"judiVector\(\w+", None, true).unwrap();
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("Use judiVector(geometry, data)."));

        // plain-text mode escapes regex syntax
        assert!(grep(&root, "judiVector(", None, false).unwrap().len() == 1);
        assert!(grep(&root, "(", None, true).is_err());
    }

    #[test]
    fn test_grep_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rag").join("judi");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("many.jl"), "x = 1\n".repeat(50)).unwrap();
        assert_eq!(grep(&root, "x", None, false).unwrap().len(), GREP_LIMIT);
    }

    #[tokio::test]
    async fn test_grep_tool_no_matches() {
        let dir = tempfile::tempdir().unwrap();
        judi_tree(dir.path());
        let ctx = auto_context(dir.path());
        let out = GrepSearch.execute(json!({"query": "Geometry"}), &ctx).await;
        assert_eq!(out.content, "No matches found for: Geometry");
        let out = GrepSearch.execute(json!({"query": "shot records"}), &ctx).await;
        assert!(out.content.starts_with("Found 1 matches:\nFile: "));
    }

    #[tokio::test]
    async fn test_retrieve_examples() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = Document::new("# # FWI\nfhistory = fwi(model, q, d_obs)", "examples/fwi.jl");
        doc.heading = Some("FWI".into());
        let params = SearchParams {
            search_type: SearchType::Similarity,
            k: 1,
            ..SearchParams::default()
        };
        let retriever = Retriever::from_documents("judi_examples", vec![doc], params);
        let ctx = auto_context(dir.path()).with_examples(retriever);

        let out = RetrieveJudiExamples.execute(json!({"query": "fwi"}), &ctx).await;
        assert_eq!(
            out.content,
            "# From `examples/fwi.jl`:\n```julia\n# # FWI\nfhistory = fwi(model, q, d_obs)\n```"
        );
        let out = RetrieveJudiExamples.execute(json!({"query": "  "}), &ctx).await;
        assert_eq!(out.content, "The query is empty.");
    }

    #[tokio::test]
    async fn test_retrieve_examples_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        // no rag/judi/examples directory: the retriever opens empty
        let ctx = auto_context(dir.path());
        let out = RetrieveJudiExamples.execute(json!({"query": "fwi"}), &ctx).await;
        assert_eq!(out.content, "(empty)");
    }

    #[tokio::test]
    async fn test_function_documentation_requires_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = auto_context(dir.path());
        let out = RetrieveFunctionDocumentation
            .execute(json!({"function_names": []}), &ctx)
            .await;
        assert!(out.is_error);
        // julia is not installed in the test context, so nothing is found
        let out = RetrieveFunctionDocumentation
            .execute(json!({"function_names": ["Model"]}), &ctx)
            .await;
        assert_eq!(out.content, "No function signatures found for the provided function names.");
    }
}
