//! Retrieval over the JUDI.jl (and Fimbul.jl) documentation and examples.

pub mod index;
pub mod split_docs;
pub mod split_examples;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
pub use index::{SearchParams, SearchType, TfIdfIndex};

/// A loaded file, or a chunk of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source: String,
    /// Comment heading of an example chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Header path of a documentation chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            heading: None,
            headers: Vec::new(),
        }
    }
}

/// First occurrence of each distinct (trimmed) content, in order.
pub fn deduplicate(docs: &[Document]) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.iter()
        .filter(|d| seen.insert(d.content.trim().to_string()))
        .cloned()
        .collect()
}

/// How loaded files are chunked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Docs { chunk_size: usize, chunk_overlap: usize },
    Examples { header_level: usize },
}

impl SplitKind {
    pub fn apply(&self, doc: &Document) -> Result<Vec<Document>> {
        match *self {
            SplitKind::Docs {
                chunk_size,
                chunk_overlap,
            } => Ok(split_docs::split_docs(doc, chunk_size, chunk_overlap)),
            SplitKind::Examples { header_level } => split_examples::split_examples(doc, header_level),
        }
    }
}

/// Where a retriever's documents come from and how they are chunked.
#[derive(Debug, Clone)]
pub struct RetrieverSpec {
    pub name: String,
    pub dir: PathBuf,
    pub filetypes: Vec<String>,
    pub cache_path: PathBuf,
    pub split: SplitKind,
}

impl RetrieverSpec {
    /// Built-in specs: `judi`/`fimbul` crossed with `examples`/`docs`.
    pub fn builtin(rag_root: &Path, library: &str, kind: &str) -> Result<Self> {
        let (dir, filetypes, split) = match (library, kind) {
            ("judi", "examples") => (
                rag_root.join("judi").join("examples"),
                vec!["jl".to_string()],
                SplitKind::Examples { header_level: 1 },
            ),
            ("judi", "docs") => (
                rag_root.join("judi").join("docs").join("src"),
                vec!["md".to_string()],
                SplitKind::Docs {
                    chunk_size: 1000,
                    chunk_overlap: 200,
                },
            ),
            ("fimbul", "examples") => (
                rag_root.join("fimbul").join("examples"),
                vec!["jl".to_string()],
                SplitKind::Examples { header_level: 1 },
            ),
            ("fimbul", "docs") => (
                rag_root.join("fimbul").join("docs").join("man"),
                vec!["md".to_string()],
                SplitKind::Docs {
                    chunk_size: 1000,
                    chunk_overlap: 200,
                },
            ),
            _ => return Err(Error::UnknownSpec(format!("{library}/{kind}"))),
        };
        Ok(Self {
            name: format!("{library}_{kind}"),
            dir,
            filetypes,
            cache_path: rag_root
                .join("loaded_store")
                .join(format!("loaded_{library}_{kind}.json")),
            split,
        })
    }
}

/// Raw files under `spec.dir`, sorted by path.
fn walk_documents(spec: &RetrieverSpec) -> Result<Vec<Document>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkBuilder::new(&spec.dir).hidden(true).git_ignore(true).build() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| spec.filetypes.iter().any(|f| f == ext));
        if matches {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        docs.push(Document::new(content, path.display().to_string()));
    }
    Ok(docs)
}

/// Load the raw documents for `spec` (from the JSON cache when present)
/// and split them.
pub fn load_documents(spec: &RetrieverSpec) -> Result<Vec<Document>> {
    let raw: Vec<Document> = if spec.cache_path.exists() {
        debug!(cache = %spec.cache_path.display(), "loading cached documents");
        serde_json::from_str(&std::fs::read_to_string(&spec.cache_path)?)?
    } else {
        if !spec.dir.is_dir() {
            warn!(retriever = %spec.name, dir = %spec.dir.display(), "document directory not found");
            return Ok(Vec::new());
        }
        let docs = walk_documents(spec)?;
        if let Some(parent) = spec.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&spec.cache_path, serde_json::to_string(&docs)?)?;
        docs
    };

    let mut chunks = Vec::new();
    for doc in &raw {
        chunks.extend(spec.split.apply(doc)?);
    }
    info!(retriever = %spec.name, files = raw.len(), chunks = chunks.len(), "documents loaded");
    Ok(chunks)
}

/// Documents plus the index over them.
#[derive(Debug, Clone)]
pub struct Retriever {
    name: String,
    documents: Vec<Document>,
    index: TfIdfIndex,
    params: SearchParams,
}

impl Retriever {
    pub fn open(spec: &RetrieverSpec, params: SearchParams) -> Result<Self> {
        let documents = load_documents(spec)?;
        Ok(Self::from_documents(&spec.name, documents, params))
    }

    pub fn from_documents(name: &str, documents: Vec<Document>, params: SearchParams) -> Self {
        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let index = TfIdfIndex::from_corpus(&texts);
        Self {
            name: name.to_string(),
            documents,
            index,
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Matching documents, best first.
    pub fn retrieve(&self, query: &str) -> Vec<Document> {
        let hits = self.index.search(query, &self.params);
        debug!(retriever = %self.name, hits = hits.len(), "retrieved");
        hits.into_iter().map(|i| self.documents[i].clone()).collect()
    }
}
