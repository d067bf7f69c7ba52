//! Subprocess boundary to the Julia runtime.
//!
//! Code is either evaluated directly (`julia -e`) or handed to one of the
//! helper scripts under the configured script directory, which print
//! sentinel lines (`STARTING LINT:`, `FUNCTION NAMES:`, `DOCUMENTATION`)
//! that are parsed here.

pub mod docs;
pub mod lint;
pub mod runner;
pub mod stacktrace;

pub use docs::{function_documentation, function_documentation_for, parse_doc_output};
pub use lint::{linting_result, parse_lint_output};
pub use runner::{JuliaRunner, ProcessOutput, RunResult};
pub use stacktrace::{error_message, filter_stacktrace, split_stacktrace};
