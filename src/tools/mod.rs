//! Tools the model can call.
//!
//! Each tool returns text that goes straight back to the model, so
//! failures (missing files, refused commands, Julia errors) are reported as
//! output rather than as `Err`.

pub mod execution;
pub mod file;
pub mod retrieve;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::Config;
use crate::console::Console;
use crate::error::{Error, Result};
use crate::julia::JuliaRunner;
use crate::rag::Retriever;
use crate::review::Reviewer;

/// Tool definition for LLM function calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Text returned to the model, flagged when the call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Everything a tool (or the check-code node) may touch.
pub struct ToolContext {
    pub config: Config,
    pub runner: JuliaRunner,
    pub reviewer: Arc<dyn Reviewer>,
    pub console: Console,
    examples: OnceCell<Retriever>,
}

impl ToolContext {
    pub fn new(config: Config, runner: JuliaRunner, reviewer: Arc<dyn Reviewer>, console: Console) -> Self {
        Self {
            config,
            runner,
            reviewer,
            console,
            examples: OnceCell::new(),
        }
    }

    /// Context with a ready-made example retriever.
    pub fn with_examples(self, retriever: Retriever) -> Self {
        Self {
            examples: OnceCell::new_with(Some(retriever)),
            ..self
        }
    }

    /// JUDI.jl example retriever, built on first use.
    pub async fn examples(&self) -> Result<&Retriever> {
        self.examples
            .get_or_try_init(|| async {
                let spec = crate::rag::RetrieverSpec::builtin(&self.config.retrieval.rag_root, "judi", "examples")?;
                let params = crate::rag::SearchParams::from_config(&self.config.retrieval)?;
                Retriever::open(&spec, params)
            })
            .await
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput;
}

/// Tool names are sent to the model verbatim and must be single tokens.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        validate_name(&name)?;
        info!(tool = %name, "registering tool");
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolOutput {
        match self.tools.get(name) {
            Some(tool) => {
                info!(tool = %name, "executing tool");
                tool.execute(args, ctx).await
            }
            None => {
                warn!(tool = %name, "model requested unknown tool");
                ToolOutput::err(format!(
                    "Error: {name} is not a valid tool, try one of [{}].",
                    self.order.join(", ")
                ))
            }
        }
    }

    /// Tools for the default agent: files, search, docs and examples.
    pub fn for_agent() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(retrieve::RetrieveJudiExamples))?;
        registry.register(Arc::new(retrieve::RetrieveFunctionDocumentation))?;
        registry.register(Arc::new(retrieve::GrepSearch))?;
        registry.register(Arc::new(file::ReadFromFile))?;
        registry.register(Arc::new(file::WriteToFile))?;
        registry.register(Arc::new(file::ListFilesInDirectory))?;
        Ok(registry)
    }

    /// Everything the default agent has plus code execution and the shell.
    pub fn for_autonomous_agent() -> Result<Self> {
        let mut registry = Self::for_agent()?;
        registry.register(Arc::new(file::GetWorkingDirectory))?;
        registry.register(Arc::new(execution::RunJuliaCode))?;
        registry.register(Arc::new(execution::RunJuliaLinter))?;
        registry.register(Arc::new(execution::ExecuteTerminalCommand))?;
        Ok(registry)
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, ToolOutput> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolOutput::err(format!("Error: missing required string argument `{key}`.")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::review::AutoReviewer;
    use std::path::Path;
    use std::time::Duration;

    /// Quiet context rooted at `dir` with an auto reviewer.
    pub fn context(dir: &Path, julia_bin: &str, reviewer: Arc<dyn Reviewer>) -> ToolContext {
        let mut config = Config::default();
        config.retrieval.rag_root = dir.join("rag");
        config.human_interaction = crate::config::HumanInteraction::none();
        let runner = JuliaRunner::new(
            julia_bin,
            dir,
            dir,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        ToolContext::new(config, runner, reviewer, Console::quiet())
    }

    pub fn auto_context(dir: &Path) -> ToolContext {
        context(dir, "julia-not-installed", Arc::new(AutoReviewer::new()))
    }
}
