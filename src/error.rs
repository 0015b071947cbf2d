//! Error types for aimmit modules using thiserror.

use thiserror::Error;

/// Errors from an inference backend invocation.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference executable not found: {0}")]
    NotInstalled(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to spawn inference process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Inference server is unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Inference timed out after {secs} seconds ({} bytes of partial output)", partial.len())]
    Timeout { secs: u64, partial: String },

    #[error("Inference process exited with code {code}")]
    NonZeroExit { code: i32, output: String },

    #[error("Inference backend reported an error: {0}")]
    Backend(String),

    #[error("Inference server returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Inference server returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("I/O error while reading inference output: {0}")]
    Io(#[source] std::io::Error),
}

impl InferenceError {
    /// Whether a fresh invocation could plausibly succeed.
    ///
    /// Start failures (missing executable, unreachable server) are fatal.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            InferenceError::NotInstalled(_)
                | InferenceError::ModelNotFound(_)
                | InferenceError::SpawnFailed(_)
                | InferenceError::Unreachable(_)
        )
    }
}

/// Errors from locating and decoding the JSON object in model output.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No JSON object found in model output: {excerpt}")]
    StructuredOutputMissing { excerpt: String },

    #[error("Model output contained an invalid commit message object: {reason}")]
    StructuredOutputInvalid { reason: String, excerpt: String },
}

/// Errors from commit message generation.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("No changes to describe (the diff is empty)")]
    EmptyChangeset,

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("All {attempts} attempts failed. Last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CommitError>,
    },
}

impl CommitError {
    /// Whether the orchestrator should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitError::EmptyChangeset | CommitError::RetriesExhausted { .. } => false,
            CommitError::Inference(e) => e.is_retryable(),
            CommitError::Extract(_) => true,
        }
    }
}

/// Errors from building backend configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("A model file path is required for the llama.cpp backend (use --model-path)")]
    MissingModelPath,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
