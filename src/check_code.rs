//! The check-code node: lint and run the latest generated code and turn
//! any problems into feedback for the model.

use tracing::{info, warn};

use crate::code::{add_julia_context, check_for_package_install, code_from_response, fix_imports, shorter_simulations, truncate_for_display};
use crate::console::Style;
use crate::julia::{error_message, filter_stacktrace, linting_result};
use crate::review::{CheckCodeDecision, ErrorDecision};
use crate::state::{Message, State, StateUpdate};
use crate::tools::ToolContext;

const FEEDBACK_HEADER: &str = "# Code check issues found. Please use these to fix your code:\n";

fn announce(ctx: &ToolContext, title: &str, action: &str, code: &str, print_code: bool) {
    let text = if print_code {
        format!("{action}:\n{}", truncate_for_display(&add_julia_context(code), 500))
    } else {
        format!("{action}...")
    };
    ctx.console.panel(title, &text, Style::Warning);
}

/// Lint `code`. Returns the feedback section when issues were found.
pub async fn run_linter(ctx: &ToolContext, code: &str, print_code: bool) -> Option<String> {
    announce(ctx, "Linter", "Running static analysis", code, print_code);
    let findings = linting_result(&ctx.runner, code).await;
    if findings.is_empty() {
        ctx.console.panel("Linter Result", "No linting issues found!", Style::Success);
        return None;
    }
    ctx.console.panel("Linter Result", &findings, Style::Error);
    Some(format!(
        "## Linter issues found:\nLinter returned the following issues:\n{findings}"
    ))
}

/// Run `code`. Returns the feedback section when it failed.
pub async fn run_julia_code(ctx: &ToolContext, code: &str, print_code: bool) -> Option<String> {
    announce(ctx, "Code Runner", "Running code", code, print_code);
    let mut result = ctx.runner.run_code(code).await;
    if !result.error {
        ctx.console.panel(
            "Code Runner",
            &format!("Code succeded in {:.2} seconds!", result.runtime),
            Style::Success,
        );
        return None;
    }

    result.error_stacktrace = result
        .error_stacktrace
        .as_deref()
        .and_then(|s| filter_stacktrace(s, &ctx.config.julia.stacktrace_exclude));
    let message = error_message(&result);
    ctx.console
        .panel("Code Runner", &format!("Code failed!\n\n{message}"), Style::Error);
    Some(format!(
        "## Code runner error:\nRunning the code generated failed with the following error:\n{message}"
    ))
}

/// Check the state's code block and report what the model should see next.
pub async fn check_code(state: &State, ctx: &ToolContext) -> StateUpdate {
    let block = &state.code_block;
    if block.is_empty() {
        return StateUpdate::error(false);
    }
    let original = block.full_code(false, true);
    let interaction = &ctx.config.human_interaction;

    let mut messages = Vec::new();
    let mut code = original.clone();
    if interaction.code_check {
        match ctx.reviewer.on_check_code(&original) {
            CheckCodeDecision::Feedback(text) => {
                return StateUpdate::error(true).with_messages(vec![Message::user(text)]);
            }
            CheckCodeDecision::Skip => return StateUpdate::error(false),
            CheckCodeDecision::Check(edited) => code = edited,
        }
    }

    let code_updated = code != original;
    if code_updated {
        messages.push(Message::user(format!(
            "The code was manually updated to the following. This is what will be checked:\n{}",
            add_julia_context(&code)
        )));
    }

    let checked_block = code_from_response(&code, false);
    if check_for_package_install(&checked_block) {
        warn!("generated code modifies the package environment, not running it");
        ctx.console.panel(
            "Code Runner",
            "The code tries to install or update packages and was not run.",
            Style::Warning,
        );
        messages.push(Message::user(format!(
            "{FEEDBACK_HEADER}## Package management:\nThe code was not run because it installs or updates packages (`using Pkg`, `Pkg.add`, `Pkg.update` or `Pkg.instantiate`). Assume the required packages are installed and remove these lines."
        )));
        return finish(messages, code_updated.then_some(checked_block));
    }

    let prepared = fix_imports(&code, &ctx.config.julia.activate_project_for);
    let prepared = shorter_simulations(&prepared, &ctx.config.julia.simulation_functions);

    let lint = run_linter(ctx, &prepared, false).await;
    let run = run_julia_code(ctx, &prepared, false).await;

    if lint.is_none() && run.is_none() {
        info!("code check passed");
        return StateUpdate::error(false).with_messages(messages);
    }

    let mut feedback = FEEDBACK_HEADER.to_string();
    if let Some(lint) = lint {
        feedback.push_str(&lint);
        feedback.push('\n');
    }
    if let Some(run) = run {
        feedback.push_str(&run);
    }
    messages.push(Message::user(feedback));

    if interaction.fix_error {
        match ctx.reviewer.on_error() {
            ErrorDecision::Skip => {
                messages.push(Message::user(
                    "The code failed, but the user decided to skip fixing it.",
                ));
                return StateUpdate::error(false).with_messages(messages);
            }
            ErrorDecision::FixWithFeedback(text) => messages.push(Message::user(text)),
            ErrorDecision::Fix => {}
        }
    }

    finish(messages, code_updated.then_some(checked_block))
}

fn finish(messages: Vec<Message>, edited: Option<crate::state::CodeBlock>) -> StateUpdate {
    let update = StateUpdate::error(true).with_messages(messages);
    match edited {
        Some(block) => update.with_code_block(block),
        None => update,
    }
}
