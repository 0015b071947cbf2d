//! The inference capability shared by every model backend.

use std::fmt;

use async_trait::async_trait;

use crate::commit::prompt::PromptEnvelope;
use crate::error::InferenceError;

/// Lifecycle of a single inference call.
///
/// `NotStarted -> Running -> {Completed | KilledBySentinel | KilledByTimeout | FailedToStart}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    /// The backend finished on its own.
    Completed,
    /// The model printed the stop sentinel and was stopped. This is success.
    KilledBySentinel,
    KilledByTimeout,
    FailedToStart,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not started",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::KilledBySentinel => "killed by sentinel",
            RunState::KilledByTimeout => "killed by timeout",
            RunState::FailedToStart => "failed to start",
        }
    }

    /// Whether the call was cut short rather than finishing on its own.
    pub fn terminated_early(&self) -> bool {
        matches!(self, RunState::KilledBySentinel | RunState::KilledByTimeout)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::NotStarted | RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw model output from a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResult {
    pub text: String,
    pub state: RunState,
}

impl InferenceResult {
    pub fn terminated_early(&self) -> bool {
        self.state.terminated_early()
    }
}

/// Executes a prompt against a language model and returns raw text.
///
/// Timeouts are reported as [`InferenceError::Timeout`], which still carries
/// whatever output was captured.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn invoke(&self, prompt: &PromptEnvelope) -> Result<InferenceResult, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated_early_states() {
        assert!(RunState::KilledBySentinel.terminated_early());
        assert!(RunState::KilledByTimeout.terminated_early());
        assert!(!RunState::Completed.terminated_early());
        assert!(!RunState::FailedToStart.terminated_early());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::NotStarted.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::FailedToStart.is_terminal());
    }

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::KilledBySentinel.to_string(), "killed by sentinel");
    }
}
