//! Drives one commit message generation: compaction, prompting, inference,
//! extraction and bounded retries.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::commit::compact::{DEFAULT_BUDGET, compact};
use crate::commit::diff::DiffSummary;
use crate::commit::message::{CommitMessage, extract_commit_message};
use crate::commit::prompt::{DEFAULT_LANGUAGE, PromptEnvelope, build_commit_prompt_from};
use crate::error::{CommitError, InferenceError};
use crate::llm::backend::InferenceBackend;
use crate::llm::retry::{MAX_ATTEMPTS, retry_with_backoff};

/// Tunables for a generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// Character budget for the compacted diff.
    pub budget: usize,
    /// Natural language of the generated message.
    pub language: String,
    /// Total inference attempts, including the first.
    pub max_attempts: u32,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            budget: DEFAULT_BUDGET,
            language: DEFAULT_LANGUAGE.to_string(),
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

pub struct CommitMessageAssembler<B> {
    backend: B,
    options: AssemblerOptions,
}

impl<B: InferenceBackend> CommitMessageAssembler<B> {
    pub fn new(backend: B, options: AssemblerOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &AssemblerOptions {
        &self.options
    }

    /// The prompt that [`generate`](Self::generate) would send first.
    pub fn prompt(&self, diff: &DiffSummary) -> PromptEnvelope {
        let compacted = compact(diff, self.options.budget);
        build_commit_prompt_from(diff, &compacted, &self.options.language)
    }

    /// Generate a commit message for `diff`.
    ///
    /// Structured-output failures, timeouts and backend failures are retried
    /// with exponential backoff. Start failures abort at once.
    pub async fn generate(&self, diff: &DiffSummary) -> Result<CommitMessage, CommitError> {
        if diff.is_empty() {
            return Err(CommitError::EmptyChangeset);
        }

        let compacted = compact(diff, self.options.budget);
        if compacted.truncated() {
            debug!(
                "Diff exceeds budget of {} chars, sending excerpts",
                self.options.budget
            );
        }
        if !compacted.omitted_files().is_empty() {
            info!(
                "{} file(s) left out of the prompt: {}",
                compacted.omitted_files().len(),
                compacted.omitted_files().join(", ")
            );
        }
        let base = build_commit_prompt_from(diff, &compacted, &self.options.language);

        info!(
            "Generating commit message via {} ({} file(s), +{} -{})",
            self.backend.name(),
            diff.files().len(),
            diff.additions(),
            diff.deletions()
        );

        // Set once an answer came back without usable JSON.
        let strict = AtomicBool::new(false);

        retry_with_backoff(
            self.options.max_attempts,
            |attempt| {
                let envelope = if strict.load(Ordering::Relaxed) {
                    base.with_strict_reminder()
                } else {
                    base.clone()
                };
                let strict = &strict;
                async move {
                    let outcome = self.attempt(attempt, &envelope, diff).await;
                    if let Err(CommitError::Extract(_)) = &outcome {
                        strict.store(true, Ordering::Relaxed);
                    }
                    outcome
                }
            },
            CommitError::is_retryable,
            |attempts, last| CommitError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        )
        .await
    }

    async fn attempt(
        &self,
        attempt: u32,
        envelope: &PromptEnvelope,
        diff: &DiffSummary,
    ) -> Result<CommitMessage, CommitError> {
        debug!("Inference attempt {}", attempt);

        match self.backend.invoke(envelope).await {
            Ok(result) => {
                debug!(
                    "Backend finished ({}), {} bytes of output",
                    result.state,
                    result.text.len()
                );
                Ok(extract_commit_message(&result.text, diff.raw_diff())?)
            }
            Err(InferenceError::Timeout { secs, partial }) => {
                match extract_commit_message(&partial, diff.raw_diff()) {
                    Ok(message) => {
                        warn!(
                            "Inference timed out after {}s, using the message found in partial output",
                            secs
                        );
                        Ok(message)
                    }
                    Err(_) => Err(InferenceError::Timeout { secs, partial }.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}
