use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::code::provider_and_model;
use crate::error::{Error, Result};

/// Assistant configuration, loaded from `judigpt.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Chat model selection and sampling
    pub model: ModelConfig,

    /// Prompt overrides
    pub prompts: PromptConfig,

    /// Which steps ask the user before continuing
    pub human_interaction: HumanInteraction,

    /// Example and documentation retrieval
    pub retrieval: RetrievalConfig,

    /// Julia runtime used to run and lint generated code
    pub julia: JuliaConfig,

    /// Graph steps allowed for one invocation
    pub recursion_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub agent_model: String,
    pub autonomous_agent_model: String,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Characters of history sent to the model
    pub history_char_budget: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    pub agent_prompt: Option<String>,
    pub autonomous_agent_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HumanInteraction {
    /// Review the generated retrieval query
    pub rag_query: bool,
    /// Filter retrieved examples before they reach the model
    pub retrieved_examples: bool,
    /// Confirm, edit or skip the code check
    pub code_check: bool,
    /// Decide whether the model should fix a failed check
    pub fix_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Root holding `judi/` and `fimbul/` checkouts
    pub rag_root: PathBuf,
    /// `similarity`, `mmr` or `similarity_score_threshold`
    pub search_type: String,
    pub k: usize,
    pub fetch_k: usize,
    pub lambda_mult: f32,
    pub score_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JuliaConfig {
    pub binary: String,
    /// Project activated for every run; the working directory when unset
    pub project_dir: Option<PathBuf>,
    /// Directory holding the lint and documentation helper scripts
    pub script_dir: PathBuf,
    pub lint_timeout_secs: u64,
    pub run_timeout_secs: u64,
    pub terminal_timeout_secs: u64,
    /// `using Pkg; Pkg.activate(".")` is prepended when all of these appear
    pub activate_project_for: Vec<String>,
    /// Calls shortened to a single step during checks
    pub simulation_functions: Vec<String>,
    /// Stacktrace lines matching any of these are dropped
    pub stacktrace_exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            prompts: PromptConfig::default(),
            human_interaction: HumanInteraction::default(),
            retrieval: RetrievalConfig::default(),
            julia: JuliaConfig::default(),
            recursion_limit: 200,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            agent_model: "anthropic:claude-sonnet-4-5".to_string(),
            autonomous_agent_model: "anthropic:claude-sonnet-4-5".to_string(),
            base_url: None,
            api_key_env: "LLM_API_KEY".to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            history_char_budget: 160_000,
        }
    }
}

impl Default for HumanInteraction {
    fn default() -> Self {
        Self {
            rag_query: false,
            retrieved_examples: false,
            code_check: true,
            fix_error: true,
        }
    }
}

impl HumanInteraction {
    /// No prompts at all, for one-shot and batch use.
    pub fn none() -> Self {
        Self {
            rag_query: false,
            retrieved_examples: false,
            code_check: false,
            fix_error: false,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rag_root: PathBuf::from("rag"),
            search_type: "mmr".to_string(),
            k: 2,
            fetch_k: 10,
            lambda_mult: 0.5,
            score_threshold: 0.2,
        }
    }
}

impl Default for JuliaConfig {
    fn default() -> Self {
        Self {
            binary: "julia".to_string(),
            project_dir: None,
            script_dir: PathBuf::from("julia"),
            lint_timeout_secs: 30,
            run_timeout_secs: 120,
            terminal_timeout_secs: 60,
            activate_project_for: vec!["Fimbul".to_string(), "GLMakie".to_string()],
            simulation_functions: vec!["simulate_reservoir".to_string()],
            stacktrace_exclude: ["PythonCall", "JlWrap", "juliacall", "pyjlmodule_seval"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl JuliaConfig {
    pub fn resolved_project_dir(&self) -> Result<PathBuf> {
        match &self.project_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!(
            agent_model = %config.model.agent_model,
            search_type = %config.retrieval.search_type,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise `judigpt.toml` if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new("judigpt.toml").exists() => Self::from_file("judigpt.toml"),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.retrieval.search_type.as_str() {
            "similarity" | "mmr" | "similarity_score_threshold" => {}
            other => {
                return Err(Error::Config(format!(
                    "unknown search_type {other:?}, expected similarity, mmr or similarity_score_threshold"
                )))
            }
        }
        if self.retrieval.k == 0 {
            return Err(Error::Config("retrieval.k must be at least 1".into()));
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            return Err(Error::Config("retrieval.fetch_k must be >= retrieval.k".into()));
        }
        if self.recursion_limit == 0 {
            return Err(Error::Config("recursion_limit must be at least 1".into()));
        }
        provider_and_model(&self.model.agent_model)?;
        provider_and_model(&self.model.autonomous_agent_model)?;
        Ok(())
    }

    /// JUDI.jl docs and examples checkout.
    pub fn judi_root(&self) -> PathBuf {
        self.retrieval.rag_root.join("judi")
    }
}
