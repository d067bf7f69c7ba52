use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::stacktrace::split_stacktrace;
use crate::config::JuliaConfig;
use crate::error::{Error, Result};

/// Raw text captured from a Julia process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of running a snippet with [`JuliaRunner::run_code`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub output: String,
    pub error: bool,
    pub error_message: String,
    pub error_stacktrace: Option<String>,
    /// Wall-clock seconds
    pub runtime: f64,
}

/// Runs Julia code in a configured project.
#[derive(Debug, Clone)]
pub struct JuliaRunner {
    julia_bin: String,
    project_dir: PathBuf,
    script_dir: PathBuf,
    lint_timeout: Duration,
    run_timeout: Duration,
}

impl JuliaRunner {
    pub fn new(
        julia_bin: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        script_dir: impl Into<PathBuf>,
        lint_timeout: Duration,
        run_timeout: Duration,
    ) -> Self {
        Self {
            julia_bin: julia_bin.into(),
            project_dir: project_dir.into(),
            script_dir: script_dir.into(),
            lint_timeout,
            run_timeout,
        }
    }

    /// Build from config; a relative `script_dir` is resolved against the working directory.
    pub fn from_config(config: &JuliaConfig) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let script_dir = if config.script_dir.is_absolute() {
            config.script_dir.clone()
        } else {
            cwd.join(&config.script_dir)
        };
        Ok(Self::new(
            config.binary.clone(),
            config.resolved_project_dir()?,
            script_dir,
            Duration::from_secs(config.lint_timeout_secs),
            Duration::from_secs(config.run_timeout_secs),
        ))
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn project_flag(&self) -> String {
        format!("--project={}", self.project_dir.display())
    }

    /// Run helper script `script_name` against `code`.
    ///
    /// The code is written to a scratch `.jl` file inside the project, which
    /// is removed once the process finishes or times out.
    pub async fn run_file(&self, code: &str, script_name: &str) -> Result<ProcessOutput> {
        if !script_name.ends_with(".jl") {
            return Err(Error::InvalidScript(script_name.to_string()));
        }

        let mut scratch = tempfile::Builder::new()
            .prefix("judigpt_")
            .suffix(".jl")
            .tempfile_in(&self.project_dir)?;
        scratch.write_all(code.as_bytes())?;
        scratch.flush()?;

        let script = self.script_dir.join(script_name);
        debug!(script = %script.display(), scratch = %scratch.path().display(), "running julia script");

        let mut cmd = Command::new(&self.julia_bin);
        cmd.arg(self.project_flag())
            .arg(&script)
            .arg(&self.project_dir)
            .arg(scratch.path())
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let out = match timeout(self.lint_timeout, cmd.output()).await {
            Ok(result) => {
                let output = result?;
                ProcessOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Err(_) => {
                warn!(script = %script_name, secs = self.lint_timeout.as_secs(), "julia script timed out");
                ProcessOutput {
                    stdout: String::new(),
                    stderr: format!(
                        "Error: Julia process timed out after {} seconds. This may happen when loading large packages like JUDI. The linter check was skipped.",
                        self.lint_timeout.as_secs()
                    ),
                }
            }
        };
        drop(scratch);
        Ok(out)
    }

    /// Evaluate `code` with `julia -e`. Failures are reported through stderr.
    pub async fn run_code_direct(&self, code: &str) -> ProcessOutput {
        let mut cmd = Command::new(&self.julia_bin);
        cmd.arg(self.project_flag())
            .arg("-e")
            .arg(code)
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match timeout(self.run_timeout, cmd.output()).await {
            Ok(Ok(output)) => ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => ProcessOutput {
                stdout: String::new(),
                stderr: format!("Error running Julia: {e}"),
            },
            Err(_) => {
                warn!(secs = self.run_timeout.as_secs(), "julia code execution timed out");
                ProcessOutput {
                    stdout: String::new(),
                    stderr: format!(
                        "Error: Julia code execution timed out after {} seconds. This may happen with complex simulations or when loading large packages.",
                        self.run_timeout.as_secs()
                    ),
                }
            }
        }
    }

    /// Run `code` and classify the result. Any stderr output counts as an error.
    pub async fn run_code(&self, code: &str) -> RunResult {
        let start = Instant::now();
        let out = self.run_code_direct(code).await;
        let runtime = start.elapsed().as_secs_f64();

        if out.stderr.is_empty() {
            return RunResult {
                output: out.stdout,
                error: false,
                error_message: String::new(),
                error_stacktrace: None,
                runtime,
            };
        }

        let (error_message, error_stacktrace) = split_stacktrace(&out.stderr);
        RunResult {
            output: out.stdout,
            error: true,
            error_message,
            error_stacktrace,
            runtime,
        }
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_support::fake_julia;
    use super::*;
    use tempfile::tempdir;

    fn runner(bin: String, dir: &Path, secs: u64) -> JuliaRunner {
        JuliaRunner::new(
            bin,
            dir,
            dir.join("scripts"),
            Duration::from_secs(secs),
            Duration::from_secs(secs),
        )
    }

    #[tokio::test]
    async fn test_run_file_rejects_non_julia_script() {
        let dir = tempdir().unwrap();
        let r = runner("julia".into(), dir.path(), 5);
        let err = r.run_file("x = 1", "lint.py").await.unwrap_err();
        assert!(matches!(err, Error::InvalidScript(_)));
    }

    #[tokio::test]
    async fn test_run_file_passes_code_file_and_cleans_up() {
        let dir = tempdir().unwrap();
        // $4 is the scratch file; echo its content back
        let bin = fake_julia(dir.path(), "cat \"$4\"; echo \"$3\" >&2");
        let r = runner(bin, dir.path(), 5);

        let out = r.run_file("println(1)", "julia_lint_script.jl").await.unwrap();
        assert_eq!(out.stdout, "println(1)");
        assert_eq!(out.stderr.trim(), dir.path().display().to_string());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("judigpt_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_run_file_timeout() {
        let dir = tempdir().unwrap();
        let bin = fake_julia(dir.path(), "sleep 5");
        let r = runner(bin, dir.path(), 1);

        let out = r.run_file("x = 1", "julia_lint_script.jl").await.unwrap();
        assert!(out.stdout.is_empty());
        assert!(out.stderr.contains("timed out after 1 seconds"));
    }

    #[tokio::test]
    async fn test_run_code_success() {
        let dir = tempdir().unwrap();
        let bin = fake_julia(dir.path(), "echo ok");
        let result = runner(bin, dir.path(), 5).run_code("x = 1").await;
        assert!(!result.error);
        assert_eq!(result.output.trim(), "ok");
        assert!(result.error_stacktrace.is_none());
    }

    #[tokio::test]
    async fn test_run_code_error_splits_stacktrace() {
        let dir = tempdir().unwrap();
        let bin = fake_julia(
            dir.path(),
            "printf 'ERROR: UndefVarError: `x` not defined\\nStacktrace:\\n [1] top-level scope\\n' >&2",
        );
        let result = runner(bin, dir.path(), 5).run_code("x").await;
        assert!(result.error);
        assert_eq!(result.error_message, "ERROR: UndefVarError: `x` not defined");
        assert_eq!(result.error_stacktrace.as_deref(), Some("[1] top-level scope"));
    }

    #[tokio::test]
    async fn test_run_code_missing_binary() {
        let dir = tempdir().unwrap();
        let r = runner("/no/such/julia".into(), dir.path(), 5);
        let result = r.run_code("x = 1").await;
        assert!(result.error);
        assert!(result.error_message.starts_with("Error running Julia:"));
    }
}
