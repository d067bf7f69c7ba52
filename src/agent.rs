//! The agent graph.
//!
//! A small explicit state machine: each [`Node`] updates the [`State`] and
//! names the node to run next. The default agent sends every final answer
//! through the code check; the autonomous agent runs code itself through
//! its tools and skips it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::check_code::check_code;
use crate::code::code_from_response;
use crate::console::{Console, Style};
use crate::error::{Error, Result};
use crate::llm::{trim_history, ChatModel, ChatRequest};
use crate::prompts::{ask_prompt, AGENT_PROMPT, AUTONOMOUS_AGENT_PROMPT};
use crate::review::Reviewer;
use crate::state::{AskInput, AskOutput, CodeBlock, Message, State};
use crate::tools::{validate_name, ToolContext, ToolRegistry};

const MORE_STEPS_NEEDED: &str = "Sorry, need more steps to process this request.";
const DEFAULT_SAVE_FILE: &str = "generated_code.jl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    GetUserInput,
    AskInput,
    Agent,
    Tools,
    CheckCode,
    Finalize,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Default,
    Autonomous,
}

/// Interactive sessions loop back to the user; one-shot runs stop after
/// the first final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Ask,
}

pub struct Agent {
    name: String,
    kind: AgentKind,
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    ctx: ToolContext,
    system_prompt: String,
}

impl Agent {
    pub fn new(kind: AgentKind, model: Arc<dyn ChatModel>, ctx: ToolContext) -> Result<Self> {
        let name = match kind {
            AgentKind::Default => "Agent",
            AgentKind::Autonomous => "AutonomousAgent",
        };
        Self::named(name, kind, model, ctx)
    }

    pub fn named(name: &str, kind: AgentKind, model: Arc<dyn ChatModel>, ctx: ToolContext) -> Result<Self> {
        validate_name(name)?;
        let (tools, prompt) = match kind {
            AgentKind::Default => (
                ToolRegistry::for_agent()?,
                ctx.config.prompts.agent_prompt.clone().unwrap_or_else(|| AGENT_PROMPT.to_string()),
            ),
            AgentKind::Autonomous => (
                ToolRegistry::for_autonomous_agent()?,
                ctx.config
                    .prompts
                    .autonomous_agent_prompt
                    .clone()
                    .unwrap_or_else(|| AUTONOMOUS_AGENT_PROMPT.to_string()),
            ),
        };
        info!(agent = %name, tools = tools.len(), "agent ready");
        Ok(Self {
            name: name.to_string(),
            kind,
            model,
            tools,
            ctx,
            system_prompt: prompt,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Interactive session: banner, then user turns until the user quits.
    pub async fn chat(&self) -> Result<State> {
        self.ctx.console.banner();
        let state = State::with_step_budget(self.ctx.config.recursion_limit);
        self.run(state, Node::GetUserInput, Mode::Interactive).await
    }

    /// Answer a single question and return the final text and code.
    pub async fn ask(&self, input: &AskInput) -> Result<AskOutput> {
        let state = State::from_ask(input, self.ctx.config.recursion_limit);
        let state = self.run(state, Node::AskInput, Mode::Ask).await?;
        Ok(AskOutput {
            answer: state.answer,
            code_block: state.code_block,
        })
    }

    /// Drive the graph from `entry` until [`Node::End`].
    ///
    /// Every node counts against `recursion_limit`; in interactive mode the
    /// budget starts over with each user turn.
    pub async fn run(&self, mut state: State, entry: Node, mode: Mode) -> Result<State> {
        let limit = self.ctx.config.recursion_limit;
        let mut node = entry;
        let mut steps = 0u32;
        while node != Node::End {
            if node == Node::GetUserInput {
                steps = 0;
                state.remaining_steps = limit;
            }
            if steps >= limit {
                warn!(agent = %self.name, limit, "recursion limit reached");
                return Err(Error::RecursionLimit(limit));
            }
            debug!(node = ?node, remaining = state.remaining_steps, "graph step");
            node = self.step(node, &mut state, mode).await?;
            steps += 1;
            state.remaining_steps = state.remaining_steps.saturating_sub(1);
            state.is_last_step = state.remaining_steps <= 1;
        }
        Ok(state)
    }

    async fn step(&self, node: Node, state: &mut State, mode: Mode) -> Result<Node> {
        match node {
            Node::GetUserInput => Ok(self.get_user_input(state)),
            Node::AskInput => {
                state
                    .messages
                    .push(Message::user(ask_prompt(&state.question, &state.current_filepath)));
                Ok(Node::Agent)
            }
            Node::Agent => {
                self.call_model(state).await?;
                Ok(route_after_agent(self.kind, state))
            }
            Node::Tools => {
                self.run_tools(state).await;
                Ok(Node::Agent)
            }
            Node::CheckCode => {
                let update = check_code(state, &self.ctx).await;
                state.apply(update);
                Ok(route_after_check(state))
            }
            Node::Finalize => Ok(self.finalize(state, mode)),
            Node::End => Ok(Node::End),
        }
    }

    fn get_user_input(&self, state: &mut State) -> Node {
        let Some(input) = self.ctx.reviewer.read_user_input() else {
            self.ctx.console.print("Goodbye!", Style::Error);
            return Node::End;
        };
        if let Some(rest) = input.strip_prefix("/save") {
            let target = rest.trim();
            let target = if target.is_empty() { DEFAULT_SAVE_FILE } else { target };
            if let Err(e) = save_code_to_file(&state.code_block, Path::new(target), self.ctx.reviewer.as_ref(), &self.ctx.console) {
                self.ctx
                    .console
                    .print(&format!("Error saving file: {e}"), Style::Error);
            }
            return Node::GetUserInput;
        }
        state.messages.push(Message::user(input));
        Node::Agent
    }

    fn workspace_message(&self) -> String {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let judi_root = self.ctx.config.judi_root();
        let judi_root = if judi_root.is_absolute() {
            judi_root
        } else {
            cwd.join(judi_root)
        };
        format!(
            "**Current workspace:** {} \n**JUDI.jl documentation and examples can be found at:** {}",
            cwd.display(),
            judi_root.display()
        )
    }

    async fn call_model(&self, state: &mut State) -> Result<()> {
        let model_config = &self.ctx.config.model;
        let mut messages = vec![Message::system(self.workspace_message())];
        messages.extend(trim_history(&state.messages, model_config.history_char_budget));

        let request = ChatRequest {
            system: self.system_prompt.clone(),
            messages,
            tools: self.tools.definitions(),
            max_tokens: model_config.max_tokens,
            temperature: model_config.temperature,
        };
        let response = self.model.complete(request).await?;
        let mut message = response.message;
        message.name = Some(self.name.clone());

        if message.has_tool_calls() && state.remaining_steps < 2 {
            warn!(agent = %self.name, remaining = state.remaining_steps, "out of steps with pending tool calls");
            let mut sorry = Message::assistant(MORE_STEPS_NEEDED);
            sorry.name = Some(self.name.clone());
            state.messages.push(sorry);
            return Ok(());
        }

        if !message.content.trim().is_empty() {
            self.ctx.console.panel(&self.name, &message.content, Style::Normal);
        }
        state.code_block = code_from_response(&message.content, true);
        state.error = false;
        state.messages.push(message);
        Ok(())
    }

    async fn run_tools(&self, state: &mut State) {
        let calls = state
            .last_message()
            .map(|m| m.tool_calls.clone())
            .unwrap_or_default();
        for call in calls {
            let out = self.tools.execute(&call.name, call.arguments.clone(), &self.ctx).await;
            if out.is_error {
                debug!(tool = %call.name, "tool reported an error");
            }
            state.messages.push(Message::tool(call.id, call.name, out.content));
        }
    }

    fn finalize(&self, state: &mut State, mode: Mode) -> Node {
        match mode {
            Mode::Ask => {
                state.answer = state.last_assistant_text().unwrap_or_default().to_string();
                Node::End
            }
            Mode::Interactive => {
                if !state.code_block.is_empty() {
                    self.ctx
                        .console
                        .print("Type /save [file] to save the latest code.", Style::Normal);
                }
                Node::GetUserInput
            }
        }
    }
}

/// Tools when the model asked for them, otherwise the check (or straight
/// to finalize for the autonomous agent).
pub fn route_after_agent(kind: AgentKind, state: &State) -> Node {
    if state.last_message().is_some_and(Message::has_tool_calls) {
        return Node::Tools;
    }
    match kind {
        AgentKind::Default => Node::CheckCode,
        AgentKind::Autonomous => Node::Finalize,
    }
}

pub fn route_after_check(state: &State) -> Node {
    if state.error {
        Node::Agent
    } else {
        Node::Finalize
    }
}

/// Write imports, a blank line and the code to `path` (`.jl` is appended
/// when missing). Returns false when there was nothing to write or the
/// user declined to overwrite.
pub fn save_code_to_file(block: &CodeBlock, path: &Path, reviewer: &dyn Reviewer, console: &Console) -> Result<bool> {
    if block.is_empty() {
        console.print("No code to save yet.", Style::Warning);
        return Ok(false);
    }
    let path = if path.extension().is_some_and(|e| e == "jl") {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}.jl", path.display()))
    };

    let mut content = String::new();
    if !block.imports.is_empty() {
        content.push_str(&block.imports);
        content.push_str("\n\n");
    }
    content.push_str(&block.code);

    if path.exists() {
        let existing = std::fs::read_to_string(&path)?;
        if !reviewer.confirm_overwrite(&path, &existing, &content) {
            console.print("File save cancelled", Style::Warning);
            return Ok(false);
        }
    }
    std::fs::write(&path, content)?;
    info!(path = %path.display(), "code saved");
    console.print(&format!("Code saved to '{}' successfully", path.display()), Style::Success);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, MockChatModel};
    use crate::review::AutoReviewer;
    use crate::state::{Role, ToolCall};
    use crate::tools::test_support::context;
    use mockall::Sequence;
    use serde_json::json;

    fn reply(message: Message) -> ChatResponse {
        ChatResponse {
            message,
            input_tokens: 1,
            output_tokens: 1,
            stop_reason: None,
        }
    }

    fn list_call(dir: &Path) -> Message {
        Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "toolu_1".into(),
                name: "list_files_in_directory".into(),
                arguments: json!({"directory_path": dir.to_str().unwrap(), "recursive": false}),
            }],
        )
    }

    fn agent_with(model: MockChatModel, dir: &Path, reviewer: Arc<dyn Reviewer>, limit: u32) -> Agent {
        let mut ctx = context(dir, "julia-not-installed", reviewer);
        ctx.config.recursion_limit = limit;
        Agent::new(AgentKind::Default, Arc::new(model), ctx).unwrap()
    }

    #[test]
    fn test_invalid_agent_name() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "julia", Arc::new(AutoReviewer::new()));
        let result = Agent::named("my agent", AgentKind::Default, Arc::new(MockChatModel::new()), ctx);
        assert!(matches!(result, Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_routes() {
        let mut state = State::default();
        state.messages.push(Message::assistant("done"));
        assert_eq!(route_after_agent(AgentKind::Default, &state), Node::CheckCode);
        assert_eq!(route_after_agent(AgentKind::Autonomous, &state), Node::Finalize);

        state.messages.push(list_call(Path::new("/tmp")));
        assert_eq!(route_after_agent(AgentKind::Autonomous, &state), Node::Tools);

        state.error = true;
        assert_eq!(route_after_check(&state), Node::Agent);
        state.error = false;
        assert_eq!(route_after_check(&state), Node::Finalize);
    }

    #[tokio::test]
    async fn test_ask_with_tool_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fwi.jl"), "").unwrap();

        let mut model = MockChatModel::new();
        let mut seq = Sequence::new();
        let call = list_call(dir.path());
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.messages[0].content.starts_with("**Current workspace:**") && req.tools.len() == 6)
            .returning(move |_| Ok(reply(call.clone())));
        model
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req| req.messages.last().is_some_and(|m| m.role == Role::Tool && m.content.contains("fwi.jl")))
            .returning(|_| Ok(reply(Message::assistant("The folder holds fwi.jl."))));

        let agent = agent_with(model, dir.path(), Arc::new(AutoReviewer::new()), 20);
        let input = AskInput {
            question: "What is in the folder?".into(),
            current_filepath: None,
        };
        let out = agent.ask(&input).await.unwrap();
        assert_eq!(out.answer, "The folder holds fwi.jl.");
        assert!(out.code_block.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_steps_replaces_tool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let call = list_call(dir.path());
        let mut model = MockChatModel::new();
        model.expect_complete().returning(move |_| Ok(reply(call.clone())));
        let agent = agent_with(model, dir.path(), Arc::new(AutoReviewer::new()), 20);

        let mut state = State::with_step_budget(1);
        state.messages.push(Message::user("list it"));
        agent.call_model(&mut state).await.unwrap();
        let last = state.last_message().unwrap();
        assert_eq!(last.content, MORE_STEPS_NEEDED);
        assert!(!last.has_tool_calls());
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let dir = tempfile::tempdir().unwrap();
        let call = list_call(dir.path());
        let mut model = MockChatModel::new();
        model.expect_complete().returning(move |_| Ok(reply(call.clone())));
        let agent = agent_with(model, dir.path(), Arc::new(AutoReviewer::new()), 5);

        let input = AskInput {
            question: "loop forever".into(),
            current_filepath: None,
        };
        assert!(matches!(agent.ask(&input).await, Err(Error::RecursionLimit(5))));
    }

    #[tokio::test]
    async fn test_interactive_session_ends_on_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = MockChatModel::new();
        model
            .expect_complete()
            .times(2)
            .returning(|req| {
                let question = req.messages.last().map(|m| m.content.clone()).unwrap_or_default();
                Ok(reply(Message::assistant(format!("You said: {question}"))))
            });
        let reviewer = Arc::new(AutoReviewer::with_inputs(["hello", "again"]));
        let agent = agent_with(model, dir.path(), reviewer, 5);

        let state = agent.run(State::with_step_budget(5), Node::GetUserInput, Mode::Interactive).await.unwrap();
        let texts: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["hello", "You said: hello", "again", "You said: again"]);
        assert_eq!(state.messages[1].name.as_deref(), Some("Agent"));
    }

    #[test]
    fn test_save_code_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let reviewer = AutoReviewer::new();
        let console = Console::quiet();
        let block = CodeBlock::new("using JUDI", "model = Model(n, d, o, m)");

        let target = dir.path().join("model");
        assert!(save_code_to_file(&block, &target, &reviewer, &console).unwrap());
        let written = std::fs::read_to_string(dir.path().join("model.jl")).unwrap();
        assert_eq!(written, "using JUDI\n\nmodel = Model(n, d, o, m)");

        assert!(!save_code_to_file(&CodeBlock::default(), &target, &reviewer, &console).unwrap());
    }
}
