//! Built-in system prompts.

pub const AGENT_PROMPT: &str = include_str!("prompts/agent.md");

pub const AUTONOMOUS_AGENT_PROMPT: &str = include_str!("prompts/autonomous_agent.md");

/// Question handed over by another agent in one-shot mode.
pub fn ask_prompt(question: &str, current_filepath: &str) -> String {
    let filepath = if current_filepath.is_empty() {
        "Filepath not provided"
    } else {
        current_filepath
    };
    format!(
        "You are called as a tool by another agent. Try to answer the question, and note that the other agent can only read your final ouput.\n\n\
         The current file we are working in. You should read its content before trying to respond: {filepath}\n\n\
         Here is the question asked by the other agent:\n{question}"
    )
}
