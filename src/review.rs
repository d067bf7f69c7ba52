//! Human-in-the-loop decisions.
//!
//! Every point where the graph can pause for the user goes through
//! [`Reviewer`]. The console implementation asks on stdin; the automatic one
//! answers without a human and is what one-shot mode and the tests use.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;

use tracing::warn;

use crate::code::truncate_for_display;
use crate::console::{Console, Style};
use crate::rag::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckCodeDecision {
    /// Check this code (the original or a manual edit)
    Check(String),
    /// Skip the check and send this to the model instead
    Feedback(String),
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDecision {
    Fix,
    FixWithFeedback(String),
    Skip,
}

pub trait Reviewer: Send + Sync {
    fn on_check_code(&self, code: &str) -> CheckCodeDecision;

    fn on_error(&self) -> ErrorDecision;

    /// The query to run; `""` skips retrieval.
    fn modify_rag_query(&self, query: &str, retriever_name: &str) -> String;

    fn on_retrieved(&self, docs: Vec<Document>, action_name: &str, edit_julia: bool) -> Vec<Document>;

    /// The command to run, or `None` to refuse.
    fn modify_terminal_run(&self, command: &str) -> Option<String>;

    fn confirm_overwrite(&self, path: &Path, existing: &str, new: &str) -> bool;

    /// Next user prompt; `None` ends the conversation.
    fn read_user_input(&self) -> Option<String>;
}

/// Answers every question without asking: accept everything, and refuse
/// terminal commands unless built with [`AutoReviewer::allowing_terminal`].
/// User turns come from a script.
#[derive(Debug, Default)]
pub struct AutoReviewer {
    inputs: Mutex<VecDeque<String>>,
    allow_terminal: bool,
}

impl AutoReviewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: Mutex::new(inputs.into_iter().map(Into::into).collect()),
            allow_terminal: false,
        }
    }

    pub fn allowing_terminal(self) -> Self {
        Self {
            allow_terminal: true,
            ..self
        }
    }
}

impl Reviewer for AutoReviewer {
    fn on_check_code(&self, code: &str) -> CheckCodeDecision {
        CheckCodeDecision::Check(code.to_string())
    }

    fn on_error(&self) -> ErrorDecision {
        ErrorDecision::Fix
    }

    fn modify_rag_query(&self, query: &str, _retriever_name: &str) -> String {
        query.to_string()
    }

    fn on_retrieved(&self, docs: Vec<Document>, _action_name: &str, _edit_julia: bool) -> Vec<Document> {
        docs
    }

    fn modify_terminal_run(&self, command: &str) -> Option<String> {
        self.allow_terminal.then(|| command.to_string())
    }

    fn confirm_overwrite(&self, _path: &Path, _existing: &str, _new: &str) -> bool {
        true
    }

    fn read_user_input(&self) -> Option<String> {
        self.inputs.lock().ok()?.pop_front()
    }
}

/// Numbered menus on stdout, answers read from `input`.
pub struct ConsoleReviewer<R> {
    input: Mutex<R>,
    console: Console,
    editor: String,
}

impl ConsoleReviewer<std::io::BufReader<std::io::Stdin>> {
    pub fn stdin(console: Console) -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), console)
    }
}

impl<R: BufRead + Send> ConsoleReviewer<R> {
    pub fn new(input: R, console: Console) -> Self {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vim".to_string());
        Self::with_editor(input, console, editor)
    }

    pub fn with_editor(input: R, console: Console, editor: impl Into<String>) -> Self {
        Self {
            input: Mutex::new(input),
            console,
            editor: editor.into(),
        }
    }

    /// One line of input without the newline; `None` at EOF.
    fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        let mut input = self.input.lock().ok()?;
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }

    /// 1-based choice from `options`. Blank input, EOF or anything
    /// unrecognized picks `default`.
    fn choose(&self, title: &str, body: &str, options: &[&str], default: usize) -> usize {
        let mut text = String::new();
        if !body.is_empty() {
            text.push_str(body);
            text.push_str("\n\n");
        }
        for (i, option) in options.iter().enumerate() {
            let marker = if i + 1 == default { " (default)" } else { "" };
            text.push_str(&format!("{}. {option}{marker}\n", i + 1));
        }
        self.console.panel(title, &text, Style::HumanInteraction);
        match self.read_line("Your choice: ") {
            Some(s) => match s.trim().parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => n,
                _ => default,
            },
            None => default,
        }
    }

    fn edit(&self, text: &str, suffix: &str) -> String {
        match edit_in_editor(&self.editor, text, suffix) {
            Ok(edited) => edited,
            Err(e) => {
                warn!(editor = %self.editor, error = %e, "editor failed, keeping original text");
                text.to_string()
            }
        }
    }

    fn review_one_by_one(&self, docs: Vec<Document>, edit_julia: bool) -> Vec<Document> {
        let total = docs.len();
        let suffix = if edit_julia { ".jl" } else { ".md" };
        let mut kept = Vec::new();
        for (i, mut doc) in docs.into_iter().enumerate() {
            let title = format!("Document {}/{} from {}", i + 1, total, doc.source);
            loop {
                let preview = truncate_for_display(&doc.content, 500);
                match self.choose(&title, &preview, &["Keep", "Edit", "Skip", "View full"], 1) {
                    1 => {
                        kept.push(doc);
                        break;
                    }
                    2 => {
                        let edited = self.edit(&doc.content, suffix);
                        if !edited.trim().is_empty() {
                            doc.content = edited;
                        }
                        kept.push(doc);
                        break;
                    }
                    3 => break,
                    _ => self.console.panel(&doc.source, &doc.content, Style::Normal),
                }
            }
        }
        kept
    }
}

impl<R: BufRead + Send> Reviewer for ConsoleReviewer<R> {
    fn on_check_code(&self, code: &str) -> CheckCodeDecision {
        let options = [
            "Check the code",
            "Edit the code, then check it",
            "Give feedback to the agent instead",
            "Skip the check",
        ];
        match self.choose("Code check", code, &options, 1) {
            2 => {
                let edited = self.edit(code, ".jl");
                if edited.trim().is_empty() {
                    CheckCodeDecision::Check(code.to_string())
                } else {
                    CheckCodeDecision::Check(edited)
                }
            }
            3 => match self.read_line("Feedback: ") {
                Some(text) if !text.trim().is_empty() => CheckCodeDecision::Feedback(text.trim().to_string()),
                _ => CheckCodeDecision::Skip,
            },
            4 => CheckCodeDecision::Skip,
            _ => CheckCodeDecision::Check(code.to_string()),
        }
    }

    fn on_error(&self) -> ErrorDecision {
        let options = ["Let the agent fix it", "Give the agent a hint", "Skip fixing"];
        match self.choose("The code check failed", "", &options, 1) {
            2 => match self.read_line("Hint: ") {
                Some(text) if !text.trim().is_empty() => ErrorDecision::FixWithFeedback(text.trim().to_string()),
                _ => ErrorDecision::Fix,
            },
            3 => ErrorDecision::Skip,
            _ => ErrorDecision::Fix,
        }
    }

    fn modify_rag_query(&self, query: &str, retriever_name: &str) -> String {
        let title = format!("Query for {retriever_name}");
        match self.choose(&title, query, &["Use this query", "Edit the query", "Skip retrieval"], 1) {
            2 => match self.read_line("New query: ") {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => query.to_string(),
            },
            3 => String::new(),
            _ => query.to_string(),
        }
    }

    fn on_retrieved(&self, docs: Vec<Document>, action_name: &str, edit_julia: bool) -> Vec<Document> {
        if docs.is_empty() {
            return docs;
        }
        let body = format!("{} documents retrieved", docs.len());
        match self.choose(action_name, &body, &["Accept all", "Review one by one", "Reject all"], 1) {
            2 => self.review_one_by_one(docs, edit_julia),
            3 => Vec::new(),
            _ => docs,
        }
    }

    fn modify_terminal_run(&self, command: &str) -> Option<String> {
        let options = ["Run it", "Edit, then run it", "Do not run it"];
        match self.choose("The agent wants to run a terminal command", command, &options, 3) {
            1 => Some(command.to_string()),
            // an empty edit means do not run
            2 => self
                .read_line("Command: ")
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            _ => None,
        }
    }

    fn confirm_overwrite(&self, path: &Path, existing: &str, new: &str) -> bool {
        let body = format!(
            "Current content:\n{}\n\nNew content:\n{}",
            truncate_for_display(existing, 300),
            truncate_for_display(new, 300)
        );
        self.console
            .panel(&format!("Overwrite {}?", path.display()), &body, Style::Warning);
        matches!(
            self.read_line("Overwrite? [y/N]: ").map(|s| s.trim().to_lowercase()),
            Some(s) if s == "y" || s == "yes"
        )
    }

    fn read_user_input(&self) -> Option<String> {
        loop {
            let line = self.read_line("> ")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.eq_ignore_ascii_case("q") || line.eq_ignore_ascii_case("quit") {
                return None;
            }
            return Some(line.to_string());
        }
    }
}

/// Open `text` in `editor` on a temp file and return the saved content.
pub fn edit_in_editor(editor: &str, text: &str, suffix: &str) -> std::io::Result<String> {
    let mut file = tempfile::Builder::new()
        .prefix("judigpt_edit_")
        .suffix(suffix)
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;

    let mut parts = editor.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty editor command"))?;
    let status = std::process::Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()?;
    if !status.success() {
        return Err(std::io::Error::other(format!("editor exited with {status}")));
    }
    std::fs::read_to_string(file.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reviewer(input: &str) -> ConsoleReviewer<Cursor<Vec<u8>>> {
        ConsoleReviewer::with_editor(Cursor::new(input.as_bytes().to_vec()), Console::quiet(), "false")
    }

    #[test]
    fn test_auto_reviewer_accepts_and_refuses_terminal() {
        let auto = AutoReviewer::with_inputs(["first", "second"]);
        assert_eq!(auto.on_check_code("x = 1"), CheckCodeDecision::Check("x = 1".into()));
        assert_eq!(auto.on_error(), ErrorDecision::Fix);
        assert_eq!(auto.modify_rag_query("model", "judi_examples"), "model");
        assert_eq!(auto.modify_terminal_run("rm -rf /"), None);
        assert_eq!(auto.read_user_input().as_deref(), Some("first"));
        assert_eq!(auto.read_user_input().as_deref(), Some("second"));
        assert_eq!(auto.read_user_input(), None);
    }

    #[test]
    fn test_check_code_defaults_to_check() {
        assert_eq!(reviewer("\n").on_check_code("x"), CheckCodeDecision::Check("x".into()));
        assert_eq!(reviewer("").on_check_code("x"), CheckCodeDecision::Check("x".into()));
        assert_eq!(reviewer("9\n").on_check_code("x"), CheckCodeDecision::Check("x".into()));
    }

    #[test]
    fn test_check_code_feedback_and_skip() {
        assert_eq!(
            reviewer("3\nuse a smaller grid\n").on_check_code("x"),
            CheckCodeDecision::Feedback("use a smaller grid".into())
        );
        assert_eq!(reviewer("3\n\n").on_check_code("x"), CheckCodeDecision::Skip);
        assert_eq!(reviewer("4\n").on_check_code("x"), CheckCodeDecision::Skip);
    }

    #[test]
    fn test_failed_editor_keeps_code() {
        assert_eq!(reviewer("2\n").on_check_code("x = 1"), CheckCodeDecision::Check("x = 1".into()));
    }

    #[test]
    fn test_on_error() {
        assert_eq!(reviewer("\n").on_error(), ErrorDecision::Fix);
        assert_eq!(
            reviewer("2\ncheck the dt\n").on_error(),
            ErrorDecision::FixWithFeedback("check the dt".into())
        );
        assert_eq!(reviewer("2\n\n").on_error(), ErrorDecision::Fix);
        assert_eq!(reviewer("3\n").on_error(), ErrorDecision::Skip);
    }

    #[test]
    fn test_modify_rag_query() {
        assert_eq!(reviewer("\n").modify_rag_query("fwi", "r"), "fwi");
        assert_eq!(reviewer("2\nrtm imaging\n").modify_rag_query("fwi", "r"), "rtm imaging");
        assert_eq!(reviewer("2\n\n").modify_rag_query("fwi", "r"), "fwi");
        assert_eq!(reviewer("3\n").modify_rag_query("fwi", "r"), "");
    }

    #[test]
    fn test_terminal_run_defaults_to_refuse() {
        assert_eq!(reviewer("\n").modify_terminal_run("ls"), None);
        assert_eq!(reviewer("1\n").modify_terminal_run("ls").as_deref(), Some("ls"));
        assert_eq!(reviewer("2\nls -la\n").modify_terminal_run("ls").as_deref(), Some("ls -la"));
    }

    #[test]
    fn test_empty_terminal_edit_refuses() {
        assert_eq!(reviewer("2\n\n").modify_terminal_run("rm -rf build"), None);
        assert_eq!(reviewer("2\n   \n").modify_terminal_run("rm -rf build"), None);
        assert_eq!(reviewer("2\n").modify_terminal_run("rm -rf build"), None);
    }

    #[test]
    fn test_on_retrieved() {
        let docs = vec![Document::new("a", "1.jl"), Document::new("b", "2.jl")];
        assert_eq!(reviewer("\n").on_retrieved(docs.clone(), "Examples", true).len(), 2);
        assert!(reviewer("3\n").on_retrieved(docs.clone(), "Examples", true).is_empty());
        // one by one: view full, then keep; skip the second
        let kept = reviewer("2\n4\n1\n3\n").on_retrieved(docs, "Examples", true);
        assert_eq!(kept, vec![Document::new("a", "1.jl")]);
    }

    #[test]
    fn test_confirm_overwrite() {
        let path = Path::new("out.jl");
        assert!(reviewer("y\n").confirm_overwrite(path, "old", "new"));
        assert!(!reviewer("\n").confirm_overwrite(path, "old", "new"));
    }

    #[test]
    fn test_read_user_input() {
        let r = reviewer("\n  \nplot the model\nQUIT\n");
        assert_eq!(r.read_user_input().as_deref(), Some("plot the model"));
        assert_eq!(r.read_user_input(), None);
        assert_eq!(reviewer("").read_user_input(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_edit_in_editor_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ed.sh");
        std::fs::write(&script, "#!/bin/sh\necho 'y = 2' > \"$1\"\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let edited = edit_in_editor(script.to_str().unwrap(), "x = 1", ".jl").unwrap();
        assert_eq!(edited, "y = 2\n");
    }
}
