//! Tools that execute code: Julia snippets, the linter and shell commands.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{str_arg, Tool, ToolContext, ToolOutput};
use crate::check_code::{run_julia_code, run_linter};
use crate::code::{fix_imports, shorter_simulations};
use crate::console::Style;

fn code_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "code": {"type": "string", "description": description}
        },
        "required": ["code"]
    })
}

pub struct RunJuliaCode;

#[async_trait]
impl Tool for RunJuliaCode {
    fn name(&self) -> &str {
        "run_julia_code"
    }

    fn description(&self) -> &str {
        "Execute Julia code. Returns output or error message."
    }

    fn parameters(&self) -> Value {
        code_schema("The Julia code that should be executed")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let code = match str_arg(&args, "code") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let code = fix_imports(code, &ctx.config.julia.activate_project_for);
        let code = shorter_simulations(&code, &ctx.config.julia.simulation_functions);
        match run_julia_code(ctx, &code, true).await {
            Some(failure) => ToolOutput::err(failure),
            None => ToolOutput::ok("Code executed successfully!"),
        }
    }
}

pub struct RunJuliaLinter;

#[async_trait]
impl Tool for RunJuliaLinter {
    fn name(&self) -> &str {
        "run_julia_linter"
    }

    fn description(&self) -> &str {
        "Run a static analysis of Julia code using a linter. Returns output or error message."
    }

    fn parameters(&self) -> Value {
        code_schema("The Julia code that should be analyzed using the linter")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let code = match str_arg(&args, "code") {
            Ok(c) => c,
            Err(e) => return e,
        };
        match run_linter(ctx, code, true).await {
            Some(findings) => ToolOutput::ok(findings),
            None => ToolOutput::ok("Linter found no issues!"),
        }
    }
}

pub struct ExecuteTerminalCommand;

#[async_trait]
impl Tool for ExecuteTerminalCommand {
    fn name(&self) -> &str {
        "execute_terminal_command"
    }

    fn description(&self) -> &str {
        "Execute a terminal command and return the output (stdout and stderr). Remember to include the project directory in the command when running julia, i.e. write `julia --project=. my_script.jl`."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute. IMPORTANT to remember to add the project directory to the command when running Julia!"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let requested = match str_arg(&args, "command") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let Some(command) = ctx.reviewer.modify_terminal_run(requested) else {
            info!(command = %requested, "terminal command refused");
            return ToolOutput::ok("User did not allow you to run this command.");
        };
        let secs = ctx.config.julia.terminal_timeout_secs;
        let out = run_shell(&command, Duration::from_secs(secs)).await;
        let style = if out.is_error { Style::Error } else { Style::Success };
        ctx.console.panel("Run finished", &out.content, style);
        out
    }
}

/// Run `command` through `sh -c` in the working directory.
async fn run_shell(command: &str, limit: Duration) -> ToolOutput {
    info!(command = %command, "executing terminal command");
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ToolOutput::err(format!("ERROR: Failed to execute command: {e}")),
        Err(_) => {
            warn!(command = %command, secs = limit.as_secs(), "terminal command timed out");
            return ToolOutput::err(format!(
                "ERROR: Command execution timed out after {} seconds.",
                limit.as_secs()
            ));
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = String::new();
    if !stdout.is_empty() {
        text.push_str(&format!("# STDOUT:\n\n```text\n{stdout}\n```\n\n"));
    }
    if !stderr.is_empty() {
        text.push_str(&format!("# STDERR:\n\n```text\n{stderr}\n```\n\n"));
    }
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        text.push_str(&format!("EXIT CODE: {code}\n"));
    }

    let text = text.trim();
    if text.is_empty() {
        return ToolOutput::ok("Command executed successfully with no output.");
    }
    if output.status.success() {
        ToolOutput::ok(text)
    } else {
        ToolOutput::err(text)
    }
}
