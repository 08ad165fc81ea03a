//! # aish — AI-assisted shell companion
//!
//! A library that turns a failed shell command into a corrected suggestion.
//! A thin shell hook captures a failing command's exit code, stdout, and
//! stderr; this crate classifies the failure, consults a local cache, and
//! — for the failure kinds worth asking about — queries a configured LLM
//! provider through a retrying, circuit-breaking pipeline for a corrected
//! command and a one-line explanation. A second, simpler mode turns a
//! free-form natural-language prompt directly into a shell command.
//!
//! ## Two entry points
//!
//! ### 1. Captured-failure orchestration
//!
//! ```rust,no_run
//! use aish::orchestrator::Orchestrator;
//! use aish::capture::CapturedContext;
//!
//! # async fn run(orchestrator: &Orchestrator) -> aish::Result<()> {
//! let captured = CapturedContext {
//!     command: "gti status".to_string(),
//!     exit_code: 127,
//!     stdout: String::new(),
//!     stderr: "gti: command not found".to_string(),
//!     working_directory: None,
//!     shell_type: None,
//!     recent_commands: Vec::new(),
//!     directory_listing: Vec::new(),
//! };
//! if let Some(suggestion) = orchestrator.handle_capture(captured).await? {
//!     println!("{}", suggestion.corrected_command);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### 2. Prompt-to-command
//!
//! ```rust,no_run
//! use aish::orchestrator::Orchestrator;
//!
//! # async fn run(orchestrator: &Orchestrator) -> aish::Result<()> {
//! let command = orchestrator.handle_prompt("list all pdf files modified today").await?;
//! println!("{command}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **classifier**: closed error taxonomy and the rule-based cascade that maps a
//!   captured failure onto an [`classifier::ErrorKind`]
//! - **error**: the crate's single structured [`error::Error`] type
//! - **retry**: bounded exponential backoff with jitter, cancellation-aware
//! - **breaker**: per-service circuit breaker with a rolling failure window
//! - **secret**: two-tier key hierarchy for at-rest credential encryption
//! - **config**: versioned configuration store with migration and auto-repair
//! - **provider**: the uniform provider trait and its per-backend adapters
//! - **extractor**: recovers structured JSON from free-form model output
//! - **capture**: the shell hook's env-var/file delivery contract
//! - **history**: append-only JSONL record of captured failures and suggestions
//! - **cache**: in-process suggestion cache consulted before provider calls
//! - **logging**: structured logging setup gated by config and `AISH_DEBUG`
//! - **orchestrator**: composes the above into the two entry points

pub mod breaker;
pub mod cache;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod history;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod secret;

pub use error::{Error, Result};

/// Convenience re-exports for the common entry points.
pub mod prelude {
    pub use crate::capture::CapturedContext;
    pub use crate::classifier::ErrorKind;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::provider::Suggestion;
}
