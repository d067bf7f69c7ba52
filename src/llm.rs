use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::code::provider_and_model;
use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::state::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

/// One model call: system prompt, history and the tools on offer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The assistant turn produced by a model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: Message,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub stop_reason: Option<String>,
}

/// Anything that can continue a conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// LLM client for calling language models via Anthropic-compatible API
pub struct LLMClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
    msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Endpoint used when the config does not name one.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "anthropic" => Some("https://api.anthropic.com"),
        "ollama" => Some("http://localhost:11434"),
        _ => None,
    }
}

impl LLMClient {
    /// Create a new LLM client
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables
    pub fn from_env() -> Option<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = var("LLM_BASE_URL")?;
        let api_key = var("LLM_API_KEY")?;
        let model = var("LLM_MODEL").unwrap_or_else(|| "claude-sonnet-4-5".to_string());

        Some(Self::new(&base_url, &api_key, &model))
    }

    /// Client for `model_name` (`provider:model`) with the endpoint and key
    /// taken from `config` and the environment.
    pub fn from_config(config: &ModelConfig, model_name: &str) -> Result<Self> {
        let (provider, model) = provider_and_model(model_name)?;
        let base_url = config
            .base_url
            .clone()
            .or_else(|| std::env::var("LLM_BASE_URL").ok())
            .or_else(|| default_base_url(provider).map(String::from))
            .ok_or_else(|| {
                Error::Config(format!(
                    "no base_url configured and no default endpoint for provider {provider:?}"
                ))
            })?;
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        Ok(Self::new(&base_url, &api_key, model))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for LLMClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = build_request(&self.model, request);

        info!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending LLM request"
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed = parse_response(&text)?;
        info!(
            model = %self.model,
            input_tokens = parsed.input_tokens,
            output_tokens = parsed.output_tokens,
            tool_calls = parsed.message.tool_calls.len(),
            "LLM response received"
        );
        Ok(parsed)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => err
            .msg
            .or_else(|| err.error.and_then(|e| e.message))
            .unwrap_or_else(|| "unknown error".to_string()),
        Err(_) => body.to_string(),
    }
}

fn build_request(model: &str, request: ChatRequest) -> ApiRequest {
    // system messages in the history are folded into the system prompt
    let mut system = request.system;
    for m in request.messages.iter().filter(|m| m.role == Role::System) {
        if !system.is_empty() {
            system.push_str("\n\n");
        }
        system.push_str(&m.content);
    }

    ApiRequest {
        model: model.to_string(),
        max_tokens: request.max_tokens,
        system: (!system.is_empty()).then_some(system),
        messages: to_api_messages(&request.messages),
        tools: request
            .tools
            .into_iter()
            .map(|t| ApiTool {
                name: t.name,
                description: t.description,
                input_schema: t.parameters,
            })
            .collect(),
        temperature: request.temperature,
    }
}

/// Map history to API turns. Tool results travel in user turns, and
/// consecutive turns of the same role are merged.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut out: Vec<ApiMessage> = Vec::new();
    for m in messages {
        let (role, blocks) = match m.role {
            Role::System => continue,
            Role::User => ("user", vec![ApiContent::Text { text: m.content.clone() }]),
            Role::Tool => (
                "user",
                vec![ApiContent::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                }],
            ),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(ApiContent::Text { text: m.content.clone() });
                }
                blocks.extend(m.tool_calls.iter().map(|c| ApiContent::ToolUse {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    input: c.arguments.clone(),
                }));
                ("assistant", blocks)
            }
        };
        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(ApiMessage { role, content: blocks }),
        }
    }
    out
}

fn parse_response(body: &str) -> Result<ChatResponse> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block.content_type.as_str() {
            "text" => text.push_str(block.text.as_deref().unwrap_or_default()),
            "tool_use" => tool_calls.push(ToolCall {
                id: block.id.unwrap_or_default(),
                name: block.name.unwrap_or_default(),
                arguments: block.input.unwrap_or(Value::Object(Default::default())),
            }),
            other => debug!(block = %other, "ignoring content block"),
        }
    }
    let usage = response.usage.unwrap_or_default();
    debug!(model = ?response.model, "parsed LLM response");
    Ok(ChatResponse {
        message: Message::assistant_with_tools(text, tool_calls),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        stop_reason: response.stop_reason,
    })
}

fn message_chars(m: &Message) -> usize {
    m.content.chars().count()
        + m.tool_calls
            .iter()
            .map(|c| c.name.len() + c.arguments.to_string().len())
            .sum::<usize>()
}

/// Most recent messages fitting in `char_budget` (0 keeps everything).
///
/// The window always begins on a user message so that no tool result is
/// left without the assistant turn that requested it.
pub fn trim_history(messages: &[Message], char_budget: usize) -> Vec<Message> {
    if char_budget == 0 || messages.is_empty() {
        return messages.to_vec();
    }
    let mut start = messages.len() - 1;
    let mut used = message_chars(&messages[start]);
    while start > 0 {
        let next = message_chars(&messages[start - 1]);
        if used + next > char_budget {
            break;
        }
        used += next;
        start -= 1;
    }
    while start > 0 && messages[start].role != Role::User {
        start -= 1;
    }
    if start > 0 {
        debug!(dropped = start, kept = messages.len() - start, "trimmed history");
    }
    messages[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_llm_client_new() {
        let client = LLMClient::new("https://api.example.com/", "test-key", "test-model");
        assert_eq!(client.base_url, "https://api.example.com");
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.model(), "test-model");
    }

    #[test]
    fn test_from_config_uses_provider_default() {
        let mut config = ModelConfig::default();
        config.base_url = Some("http://localhost:9000".into());
        let client = LLMClient::from_config(&config, "anthropic:claude-sonnet-4-5").unwrap();
        assert_eq!(client.base_url, "http://localhost:9000");
        assert_eq!(client.model(), "claude-sonnet-4-5");

        assert_eq!(default_base_url("ollama"), Some("http://localhost:11434"));
        assert!(LLMClient::from_config(&config, "no-provider").is_err());
    }

    #[test]
    fn test_from_env_vars() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("LLM_BASE_URL", "http://localhost:8080/"),
            ("LLM_API_KEY", "secret"),
        ]
        .into();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());
        let client = LLMClient::from_vars(lookup).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.api_key, "secret");
        assert_eq!(client.model(), "claude-sonnet-4-5");

        let no_key = |name: &str| (name == "LLM_BASE_URL").then(|| "http://localhost:8080".to_string());
        assert!(LLMClient::from_vars(no_key).is_none());
    }

    #[test]
    fn test_request_serialization() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "grep_search".into(),
            arguments: json!({"query": "Model"}),
        };
        let request = ChatRequest {
            system: "You are helpful".into(),
            messages: vec![
                Message::system("**Current workspace:** /work"),
                Message::user("find Model"),
                Message::assistant_with_tools("", vec![call]),
                Message::tool("toolu_1", "grep_search", "Found 1 matches"),
                Message::user("thanks"),
            ],
            tools: vec![ToolDefinition {
                name: "grep_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }],
            max_tokens: 1000,
            temperature: 0.0,
        };
        let body = serde_json::to_value(build_request("claude", request)).unwrap();
        assert_eq!(body["system"], "You are helpful\n\n**Current workspace:** /work");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        // tool result and the next user text share one user turn
        assert_eq!(body["messages"][2]["role"], "user");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(body["messages"][2]["content"][1]["text"], "thanks");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "id": "msg_123",
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "toolu_9", "name": "read_from_file", "input": {"file_path": "/a.jl"}}
            ],
            "model": "claude-sonnet-4-5",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let response = parse_response(json).unwrap();
        assert_eq!(response.message.content, "Let me look.");
        assert_eq!(response.message.tool_calls[0].name, "read_from_file");
        assert_eq!(response.message.tool_calls[0].arguments["file_path"], "/a.jl");
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(response.output_tokens, 5);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"msg": "quota"}"#), "quota");
        assert_eq!(
            error_message(r#"{"error": {"type": "auth", "message": "bad key"}}"#),
            "bad key"
        );
        assert_eq!(error_message("gateway down"), "gateway down");
    }

    #[test]
    fn test_trim_history_keeps_recent_window() {
        let messages = vec![
            Message::user("a".repeat(100)),
            Message::assistant("b".repeat(100)),
            Message::user("c".repeat(10)),
            Message::assistant("d".repeat(10)),
        ];
        let trimmed = trim_history(&messages, 50);
        assert_eq!(trimmed, messages[2..].to_vec());
        assert_eq!(trim_history(&messages, 0), messages);
    }

    #[test]
    fn test_trim_history_never_starts_on_tool_result() {
        let call = ToolCall {
            id: "t1".into(),
            name: "grep_search".into(),
            arguments: json!({}),
        };
        let messages = vec![
            Message::user("question"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool("t1", "grep_search", "x".repeat(40)),
            Message::assistant("answer"),
        ];
        let trimmed = trim_history(&messages, 50);
        assert_eq!(trimmed[0].role, Role::User);
        assert_eq!(trimmed.len(), 4);
    }
}
