//! Local llama.cpp process backend.

pub mod subprocess;

pub use subprocess::{LLAMA_CLI, LlamaCppBackend, resolve_executable, run_llama};
