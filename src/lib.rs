pub mod agent;
pub mod check_code;
pub mod code;
pub mod config;
pub mod console;
pub mod error;
pub mod julia;
pub mod llm;
pub mod prompts;
/// Example and documentation retrieval over local JUDI.jl checkouts.
pub mod rag;
pub mod review;
pub mod state;
pub mod tools;

pub use error::{Error, Result};
