//! File tools: read, write, list and the working directory.

use std::path::Path;

use async_trait::async_trait;
use ignore::WalkBuilder;
use serde_json::{json, Value};
use tracing::warn;

use super::{str_arg, Tool, ToolContext, ToolOutput};
use crate::code::truncate_for_display;
use crate::console::Style;

pub struct ReadFromFile;

#[async_trait]
impl Tool for ReadFromFile {
    fn name(&self) -> &str {
        "read_from_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Has the option to specify the line range. Returns a string containing the specified lines or the entire file."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The absolute path of the file to read."
                },
                "read_full_file": {
                    "type": "boolean",
                    "description": "Whether to read the full file (ignoring line range)."
                },
                "start_line_number_base_zero": {
                    "type": "integer",
                    "description": "The line number to start reading from, 0-based."
                },
                "end_line_number_base_zero": {
                    "type": "integer",
                    "description": "The inclusive line number to end reading at, 0-based."
                }
            },
            "required": ["file_path", "read_full_file", "start_line_number_base_zero", "end_line_number_base_zero"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let path = match str_arg(&args, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let full = args["read_full_file"].as_bool().unwrap_or(false);
        let start = args["start_line_number_base_zero"].as_i64().unwrap_or(0);
        let end = args["end_line_number_base_zero"].as_i64().unwrap_or(i64::MAX);

        match read_lines(Path::new(path), full, start, end).await {
            Ok((numbered, header)) => {
                ctx.console.panel(
                    &format!("Read file: {path}"),
                    &truncate_for_display(&numbered, 500),
                    Style::Message,
                );
                ToolOutput::ok(format!("{header}\n{numbered}"))
            }
            Err(message) => ToolOutput::err(message),
        }
    }
}

/// Numbered lines `start..=end` (0-based) and the `File: ...` header line.
async fn read_lines(path: &Path, full: bool, start: i64, end: i64) -> Result<(String, String), String> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Error reading file: {e}"))?;
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();

    let (from, to) = if full {
        (0, total)
    } else {
        let from = start.max(0) as usize;
        let to = end.saturating_add(1).clamp(0, total as i64) as usize;
        (from, to)
    };
    if from >= total {
        return Err(format!("Start line {start} is beyond file length ({total} lines)"));
    }

    let numbered = lines[from..to.max(from)]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:4}: {}", from + i, line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n");
    let header = format!(
        "File: {} (lines {}-{} of {} total)",
        path.display(),
        from,
        to as i64 - 1,
        total
    );
    Ok((numbered, header))
}

pub struct WriteToFile;

#[async_trait]
impl Tool for WriteToFile {
    fn name(&self) -> &str {
        "write_to_file"
    }

    fn description(&self) -> &str {
        "Write a string to file."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The absolute path to the file to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutput {
        let (path, content) = match (str_arg(&args, "file_path"), str_arg(&args, "content")) {
            (Ok(p), Ok(c)) => (p, c),
            (Err(e), _) | (_, Err(e)) => return e,
        };
        let file = Path::new(path);

        if file.exists() {
            match tokio::fs::read_to_string(file).await {
                Ok(existing) => {
                    if !ctx.reviewer.confirm_overwrite(file, &existing, content) {
                        let msg = format!("File write cancelled by user: {path}");
                        ctx.console.panel("File Writer", &msg, Style::Warning);
                        return ToolOutput::ok(msg);
                    }
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "could not read existing file before overwrite");
                }
            }
        }

        match tokio::fs::write(file, content).await {
            Ok(()) => {
                let msg = format!("Successfully wrote to file: {path}");
                ctx.console.panel("File Writer Success", &msg, Style::Success);
                ToolOutput::ok(msg)
            }
            Err(e) => {
                let msg = format!("Error writing to file {path}: {e}");
                ctx.console.panel("File Writer Error", &msg, Style::Error);
                ToolOutput::err(msg)
            }
        }
    }
}

pub struct ListFilesInDirectory;

#[async_trait]
impl Tool for ListFilesInDirectory {
    fn name(&self) -> &str {
        "list_files_in_directory"
    }

    fn description(&self) -> &str {
        "Recursively list all files in a directory. Returns a string with the absolute paths of all files and directories."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory_path": {
                    "type": "string",
                    "description": "The absolute path of the directory to list files from."
                },
                "recursive": {
                    "type": "boolean",
                    "description": "True to list files recursively, False to list only top-level files."
                }
            },
            "required": ["directory_path", "recursive"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> ToolOutput {
        let dir = match str_arg(&args, "directory_path") {
            Ok(d) => d,
            Err(e) => return e,
        };
        let recursive = args["recursive"].as_bool().unwrap_or(false);
        match list_directory(Path::new(dir), recursive) {
            Ok(listing) => ToolOutput::ok(listing),
            Err(message) => ToolOutput::err(message),
        }
    }
}

fn list_directory(dir: &Path, recursive: bool) -> Result<String, String> {
    if !dir.exists() {
        return Err(format!("ERROR: Directory {} does not exist.", dir.display()));
    }
    if !dir.is_dir() {
        return Err(format!("ERROR: {} is not a directory.", dir.display()));
    }

    // symlinks are listed but never followed
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(if recursive { None } else { Some(1) })
        .build();
    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| format!("ERROR: Failed to list directory contents: {e}"))?;
        if entry.depth() == 0 {
            continue;
        }
        let path = entry.path();
        if entry.file_type().is_some_and(|t| t.is_dir()) {
            entries.push(format!("[DIR]  {}/", path.display()));
        } else {
            entries.push(format!("[FILE] {}", path.display()));
        }
    }

    if entries.is_empty() {
        return Ok(format!("No files found in directory: {}", dir.display()));
    }
    entries.sort();
    let mode = if recursive { "recursive" } else { "top-level" };
    Ok(format!(
        "Contents of {} ({mode}):\n{}",
        dir.display(),
        entries.join("\n")
    ))
}

pub struct GetWorkingDirectory;

#[async_trait]
impl Tool for GetWorkingDirectory {
    fn name(&self) -> &str {
        "get_working_directory"
    }

    fn description(&self) -> &str {
        "Get the current working directory path."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn execute(&self, _args: Value, _ctx: &ToolContext) -> ToolOutput {
        match std::env::current_dir() {
            Ok(dir) => ToolOutput::ok(dir.display().to_string()),
            Err(e) => ToolOutput::err(format!("ERROR: {e}")),
        }
    }
}
