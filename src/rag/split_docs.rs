//! Splitting of markdown documentation pages.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use super::{deduplicate, Document};

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*>+").expect("valid regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[.*?\]\(.*?\)").expect("valid regex"));
static ANSI_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```ansi[\s\S]*?```").expect("valid regex"));
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+?)\s*$").expect("valid regex"));
static ANCHOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\{#[^}]*\}").expect("valid regex"));
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));

/// Strip blockquote markers, images and ```ansi output blocks.
pub fn preprocess_content(content: &str) -> String {
    let content = BLOCKQUOTE.replace_all(content, "");
    let content = IMAGE.replace_all(content.trim(), "");
    let content = ANSI_BLOCK.replace_all(content.trim(), "");
    content.trim().to_string()
}

/// Replace `[text](url)` with `text`.
pub fn remove_markdown_links(text: &str) -> String {
    LINK.replace_all(text, "$1").into_owned()
}

/// Split a page into header sections, then into overlapping chunks.
pub fn split_docs(doc: &Document, chunk_size: usize, chunk_overlap: usize) -> Vec<Document> {
    let content = preprocess_content(&doc.content);
    let mut out = Vec::new();
    for (headers, text) in split_by_headers(&content) {
        for chunk in split_text(&text, chunk_size, chunk_overlap) {
            out.push(Document {
                content: chunk,
                source: doc.source.clone(),
                heading: None,
                headers: headers.clone(),
            });
        }
    }
    out
}

/// Sections keyed by their `#`/`##`/`###` header path. Header lines are removed.
fn split_by_headers(content: &str) -> Vec<(Vec<String>, String)> {
    let mut sections = Vec::new();
    let mut headers: Vec<String> = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let flush = |sections: &mut Vec<(Vec<String>, String)>, headers: &[String], body: &mut Vec<&str>| {
        let text = body.join("\n").trim().to_string();
        if !text.is_empty() {
            sections.push((headers.to_vec(), text));
        }
        body.clear();
    };

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let caps = if in_fence { None } else { HEADER.captures(line) };
        match caps {
            Some(caps) => {
                flush(&mut sections, &headers, &mut body);
                let level = caps[1].len();
                let title = ANCHOR.replace_all(&caps[2], "").trim().to_string();
                headers.truncate(level - 1);
                while headers.len() < level - 1 {
                    headers.push(String::new());
                }
                headers.push(title);
            }
            None => body.push(line),
        }
    }
    flush(&mut sections, &headers, &mut body);
    sections
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Recursive character splitting: try paragraph, line, word, then character
/// boundaries until every chunk fits in `chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    split_recursive(text, SEPARATORS, chunk_size.max(1), chunk_overlap)
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let idx = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s))
        .unwrap_or(separators.len() - 1);
    let sep = separators[idx];
    let rest = &separators[idx + 1..];

    let pieces: Vec<String> = if sep.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(sep).filter(|p| !p.is_empty()).map(String::from).collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<String> = Vec::new();
    for piece in pieces {
        if char_len(&piece) <= size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, sep, size, overlap));
            fitting.clear();
        }
        if rest.is_empty() {
            out.push(piece);
        } else {
            out.extend(split_recursive(&piece, rest, size, overlap));
        }
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, sep, size, overlap));
    }
    out
}

fn merge_pieces(pieces: &[String], sep: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(sep);
    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        let joined_sep = if current.is_empty() { 0 } else { sep_len };
        if total + len + joined_sep > size && !current.is_empty() {
            push_joined(&mut chunks, &current, sep);
            // keep a tail of at most `overlap` characters
            while total > overlap
                || (total > 0 && total + len + if current.is_empty() { 0 } else { sep_len } > size)
            {
                let Some(front) = current.pop_front() else { break };
                total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
            }
        }
        current.push_back(piece);
        total += len + if current.len() > 1 { sep_len } else { 0 };
    }
    push_joined(&mut chunks, &current, sep);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, current: &VecDeque<&str>, sep: &str) {
    let text = current.iter().copied().collect::<Vec<_>>().join(sep);
    let text = text.trim();
    if !text.is_empty() {
        chunks.push(text.to_string());
    }
}

/// Header path such as `Getting started > Installation`, or `Root`.
pub fn section_path(doc: &Document) -> String {
    let parts: Vec<&str> = doc
        .headers
        .iter()
        .map(String::as_str)
        .filter(|h| !h.is_empty())
        .collect();
    if parts.is_empty() {
        "Root".to_string()
    } else {
        parts.join(" > ")
    }
}

/// Render documentation chunks for the model, dropping duplicates.
pub fn format_docs(docs: &[Document]) -> String {
    deduplicate(docs)
        .iter()
        .map(|d| format!("# From `{}`: Section `{}`\n{}", d.source, section_path(d), d.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
