//! In-process lexical index over document chunks.
//!
//! Chunks are embedded as sparse TF-IDF vectors normalized to unit length,
//! so cosine similarity is a dot product. Queries run as plain top-k,
//! thresholded top-k, or maximal marginal relevance (MMR).

use std::collections::{HashMap, HashSet};

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};

/// Common English words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "it", "in", "on", "of", "to", "and", "or", "for", "with", "this",
    "that", "be", "are", "was", "were", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "shall", "not", "no",
    "but", "if", "at", "by", "from", "as", "into", "about", "up", "out", "so", "its", "you",
    "your", "i", "my", "we", "our", "they", "them", "their", "he", "she", "his", "her",
];

/// Sorted (dimension, weight) pairs.
pub type SparseVec = Vec<(usize, f32)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchType {
    Similarity,
    Mmr,
    SimilarityScoreThreshold,
}

impl SearchType {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            "similarity_score_threshold" => Ok(Self::SimilarityScoreThreshold),
            other => Err(Error::Config(format!("unknown search_type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub search_type: SearchType,
    pub k: usize,
    pub fetch_k: usize,
    pub lambda_mult: f32,
    pub score_threshold: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            search_type: SearchType::Mmr,
            k: 2,
            fetch_k: 10,
            lambda_mult: 0.5,
            score_threshold: 0.2,
        }
    }
}

impl SearchParams {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            search_type: SearchType::parse(&config.search_type)?,
            k: config.k,
            fetch_k: config.fetch_k.max(config.k),
            lambda_mult: config.lambda_mult,
            score_threshold: config.score_threshold,
        })
    }
}

/// TF-IDF vectors for a fixed corpus.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    vectors: Vec<SparseVec>,
}

impl TfIdfIndex {
    pub fn from_corpus(documents: &[&str]) -> Self {
        if documents.is_empty() {
            return Self::default();
        }
        let n = documents.len() as f32;
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(term.to_string()).or_insert(next);
                if idx == doc_freq.len() {
                    doc_freq.push(0);
                }
                doc_freq[idx] += 1;
            }
        }

        // Smoothed IDF: ln(N / df) + 1
        let idf = doc_freq
            .iter()
            .map(|&df| (n / (df as f32).max(1.0)).ln() + 1.0)
            .collect();

        let mut index = Self {
            vocabulary,
            idf,
            vectors: Vec::new(),
        };
        index.vectors = tokenized.iter().map(|t| index.vectorize(t)).collect();
        index
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn embed(&self, text: &str) -> SparseVec {
        self.vectorize(&tokenize(text))
    }

    fn vectorize(&self, tokens: &[String]) -> SparseVec {
        let mut tf: HashMap<usize, f32> = HashMap::new();
        for token in tokens {
            if let Some(&idx) = self.vocabulary.get(token) {
                *tf.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut v: SparseVec = tf.into_iter().map(|(i, c)| (i, c * self.idf[i])).collect();
        v.sort_unstable_by_key(|(i, _)| *i);
        normalize(&mut v);
        v
    }

    /// All documents scored against `query`, best first.
    pub fn rank(&self, query: &str) -> Vec<(usize, f32)> {
        let q = self.embed(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&q, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }

    /// Indices of the documents selected for `query`.
    pub fn search(&self, query: &str, params: &SearchParams) -> Vec<usize> {
        let ranked = self.rank(query);
        match params.search_type {
            SearchType::Similarity => ranked.into_iter().take(params.k).map(|(i, _)| i).collect(),
            SearchType::SimilarityScoreThreshold => ranked
                .into_iter()
                .filter(|(_, s)| *s >= params.score_threshold)
                .take(params.k)
                .map(|(i, _)| i)
                .collect(),
            SearchType::Mmr => {
                let candidates: Vec<(usize, f32)> = ranked.into_iter().take(params.fetch_k).collect();
                self.mmr(&candidates, params.k, params.lambda_mult)
            }
        }
    }

    fn mmr(&self, candidates: &[(usize, f32)], k: usize, lambda: f32) -> Vec<usize> {
        let mut selected: Vec<usize> = Vec::new();
        let mut remaining: Vec<(usize, f32)> = candidates.to_vec();

        while selected.len() < k && !remaining.is_empty() {
            let mut best = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (pos, (idx, relevance)) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|s| dot(&self.vectors[*idx], &self.vectors[*s]))
                    .fold(0.0f32, f32::max);
                let score = lambda * relevance - (1.0 - lambda) * redundancy;
                if score > best_score {
                    best_score = score;
                    best = pos;
                }
            }
            selected.push(remaining.remove(best).0);
        }
        selected
    }
}

/// Lowercase, split on anything but alphanumerics and `_`, drop stop words.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() > 1)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn normalize(v: &mut SparseVec) {
    let norm = v.iter().map(|(_, x)| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, x) in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn dot(a: &SparseVec, b: &SparseVec) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}
