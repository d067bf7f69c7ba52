//! Conversation state threaded through the agent graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Result of running the tool call `call_id`.
    pub fn tool(call_id: impl Into<String>, tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(tool_name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Generated code, split into `using` lines and the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    #[serde(default)]
    pub imports: String,
    #[serde(default)]
    pub code: String,
}

impl CodeBlock {
    pub fn new(imports: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            imports: imports.into(),
            code: code.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.code.is_empty()
    }

    /// Imports followed by code, optionally fenced as a julia markdown block.
    pub fn full_code(&self, within_julia_context: bool, return_empty_if_no_code: bool) -> String {
        if return_empty_if_no_code && self.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        if within_julia_context {
            out.push_str("```julia");
        }
        if !self.imports.is_empty() {
            if within_julia_context {
                out.push('\n');
            }
            out.push_str(&self.imports);
        }
        if !self.code.is_empty() {
            if within_julia_context || !self.imports.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.code);
        }
        if within_julia_context {
            out.push_str("\n```");
        }
        out
    }

    /// Markdown rendering with a blank line between imports and code.
    pub fn format_response(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::from("```julia\n");
        if !self.imports.is_empty() {
            out.push_str(&self.imports);
            out.push_str("\n\n");
        }
        if !self.code.is_empty() {
            out.push_str(&self.code);
            out.push('\n');
        }
        out.push_str("```");
        out
    }
}

/// Internal graph state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub messages: Vec<Message>,
    pub error: bool,
    pub code_block: CodeBlock,
    pub remaining_steps: u32,
    pub is_last_step: bool,
    /// One-shot mode input and output.
    pub question: String,
    pub current_filepath: String,
    pub answer: String,
}

impl Default for State {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            error: false,
            code_block: CodeBlock::default(),
            remaining_steps: 50,
            is_last_step: false,
            question: String::new(),
            current_filepath: String::new(),
            answer: String::new(),
        }
    }
}

impl State {
    pub fn with_step_budget(steps: u32) -> Self {
        Self {
            remaining_steps: steps,
            ..Self::default()
        }
    }

    pub fn from_ask(input: &AskInput, steps: u32) -> Self {
        Self {
            question: input.question.clone(),
            current_filepath: input.current_filepath.clone().unwrap_or_default(),
            ..Self::with_step_budget(steps)
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Text of the most recent assistant message.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Merge a node's partial update. Messages are append-only.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(code_block) = update.code_block {
            self.code_block = code_block;
        }
    }
}

/// Partial state change returned by a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub error: Option<bool>,
    pub code_block: Option<CodeBlock>,
}

impl StateUpdate {
    pub fn error(error: bool) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_code_block(mut self, code_block: CodeBlock) -> Self {
        self.code_block = Some(code_block);
        self
    }
}

/// Input for one-shot mode, where another tool asks a single question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskInput {
    pub question: String,
    #[serde(default)]
    pub current_filepath: Option<String>,
}

/// Output for one-shot mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskOutput {
    pub answer: String,
    pub code_block: CodeBlock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_block_empty() {
        assert!(CodeBlock::default().is_empty());
        assert!(!CodeBlock::new("using JUDI", "").is_empty());
        assert!(!CodeBlock::new("", "x = 1").is_empty());
    }

    #[test]
    fn test_full_code_plain() {
        let block = CodeBlock::new("using JUDI", "model = Model(n, d, o, m)");
        assert_eq!(
            block.full_code(false, false),
            "using JUDI\nmodel = Model(n, d, o, m)"
        );

        let code_only = CodeBlock::new("", "x = 1");
        assert_eq!(code_only.full_code(false, false), "x = 1");
    }

    #[test]
    fn test_full_code_within_julia_context() {
        let block = CodeBlock::new("using JUDI", "x = 1");
        assert_eq!(
            block.full_code(true, false),
            "```julia\nusing JUDI\nx = 1\n```"
        );
        assert_eq!(CodeBlock::default().full_code(true, false), "```julia\n```");
        assert_eq!(CodeBlock::default().full_code(true, true), "");
    }

    #[test]
    fn test_format_response() {
        let block = CodeBlock::new("using JUDI", "x = 1");
        assert_eq!(block.format_response(), "```julia\nusing JUDI\n\nx = 1\n```");
        assert_eq!(CodeBlock::default().format_response(), "");
    }

    #[test]
    fn test_state_apply_appends_messages() {
        let mut state = State::with_step_budget(10);
        state.messages.push(Message::user("hi"));
        state.error = true;

        state.apply(
            StateUpdate::error(false)
                .with_messages(vec![Message::assistant("hello")])
                .with_code_block(CodeBlock::new("", "x = 1")),
        );

        assert_eq!(state.messages.len(), 2);
        assert!(!state.error);
        assert_eq!(state.code_block.code, "x = 1");
        assert_eq!(state.last_assistant_text(), Some("hello"));
    }

    #[test]
    fn test_state_apply_keeps_untouched_fields() {
        let mut state = State::default();
        state.error = true;
        state.code_block = CodeBlock::new("", "keep");
        state.apply(StateUpdate::default());
        assert!(state.error);
        assert_eq!(state.code_block.code, "keep");
    }

    #[test]
    fn test_state_fields() {
        let json = serde_json::to_value(State::default()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "answer",
                "code_block",
                "current_filepath",
                "error",
                "is_last_step",
                "messages",
                "question",
                "remaining_steps",
            ]
        );
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let tool = Message::tool("call_1", "read_from_file", "ok");
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["role"], "tool");
    }

    #[test]
    fn test_has_tool_calls() {
        let call = ToolCall {
            id: "1".into(),
            name: "grep_search".into(),
            arguments: serde_json::json!({"query": "Model"}),
        };
        assert!(Message::assistant_with_tools("", vec![call]).has_tool_calls());
        assert!(!Message::assistant("done").has_tool_calls());
    }

    #[test]
    fn test_ask_input_optional_file() {
        let input: AskInput = serde_json::from_str(r#"{"question": "how?"}"#).unwrap();
        assert!(input.current_filepath.is_none());
        let state = State::from_ask(&input, 20);
        assert_eq!(state.question, "how?");
        assert_eq!(state.remaining_steps, 20);
    }
}
