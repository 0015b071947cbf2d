//! aimmit - Conventional commit messages written by a local language model.
//!
//! # Overview
//!
//! aimmit compacts a unified diff to fit a small model's context, wraps it in
//! a prompt asking for a single JSON object, runs the prompt through either a
//! local `llama-cli` process or an Ollama server, and decodes the answer into
//! a [`CommitMessage`].

pub mod commit;
pub mod config;
pub mod error;
pub mod llama;
pub mod llm;
pub mod ollama;

// Re-export commonly used types
pub use commit::{AssemblerOptions, CommitMessage, CommitMessageAssembler, DiffSummary};
pub use config::{LlamaConfig, OllamaConfig};
pub use error::{CommitError, ConfigError, ExtractError, InferenceError};
pub use llama::LlamaCppBackend;
pub use llm::{InferenceBackend, InferenceResult, RunState};
pub use ollama::OllamaBackend;
