//! Splitting of Julia example scripts.
//!
//! Example files use markdown headings inside comments (`# # Title`,
//! `# ## Subtitle`), so each heading starts a new chunk.

use regex::Regex;

use super::{deduplicate, Document};
use crate::error::Result;

/// Split `doc` at comment headings with up to `header_level` hashes.
pub fn split_examples(doc: &Document, header_level: usize) -> Result<Vec<Document>> {
    let heading = Regex::new(&format!(r"^#\s+(#{{1,{}}})\s+(.*)", header_level.max(1)))?;

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_heading: Option<String> = None;

    for line in doc.content.lines() {
        if let Some(caps) = heading.captures(line.trim()) {
            push_chunk(&mut chunks, doc, &current, current_heading.take());
            current.clear();
            current.push(line);
            current_heading = caps.get(2).map(|m| m.as_str().to_string());
        } else {
            current.push(line);
        }
    }
    push_chunk(&mut chunks, doc, &current, current_heading);
    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<Document>, doc: &Document, lines: &[&str], heading: Option<String>) {
    let text = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        return;
    }
    chunks.push(Document {
        content: text,
        source: doc.source.clone(),
        heading,
        headers: Vec::new(),
    });
}

pub fn format_example(doc: &Document, within_julia_context: bool) -> String {
    let content = doc.content.trim();
    if within_julia_context {
        format!("```julia\n{content}\n```")
    } else {
        content.to_string()
    }
}

/// Render examples for the model, dropping duplicate chunks.
pub fn format_examples(docs: &[Document]) -> String {
    deduplicate(docs)
        .iter()
        .map(|d| format!("# From `{}`:\n{}", d.source, format_example(d, true)))
        .collect::<Vec<_>>()
        .join("\n\n")
}
