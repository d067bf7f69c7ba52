//! Crate-wide error type.
//!
//! Only failures that should stop the caller end up here. Julia, linter and
//! tool failures are reported back to the model as text instead.

/// Errors surfaced by the assistant runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("LLM API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("julia script name must end with .jl: {0}")]
    InvalidScript(String),
    #[error("name must not be empty or contain spaces: {0:?}")]
    InvalidName(String),
    #[error("model name must look like provider:model, got {0:?}")]
    InvalidModelName(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(u32),
    #[error("unknown retriever spec: {0}")]
    UnknownSpec(String),
}

pub type Result<T> = std::result::Result<T, Error>;
