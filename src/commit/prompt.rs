//! Prompt construction for AI-generated commit messages.

use std::fmt::Write as _;

use crate::commit::compact::{CompactedDiff, compact};
use crate::commit::diff::DiffSummary;

/// Token the model is told to print once its answer is complete.
pub const STOP_SENTINEL: &str = "<|end_of_text|>";

/// Default language for the generated message.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Conventional commit types offered to the model.
pub const COMMIT_TYPES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore", "revert",
];

/// A role-delimited prompt: one system segment, one user segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEnvelope {
    system: String,
    user: String,
}

impl PromptEnvelope {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Copy of this envelope with a stricter output reminder appended to the
    /// user segment. Used when a previous answer had no usable JSON.
    pub fn with_strict_reminder(&self) -> Self {
        let mut user = self.user.clone();
        user.push_str(
            "\nYour previous answer could not be parsed. Reply with exactly one JSON object \
             and nothing else: no markdown fences, no explanations, no arrays.\n",
        );
        Self {
            system: self.system.clone(),
            user,
        }
    }

    /// Render as a ChatML template for raw-completion models.
    pub fn to_chat_template(&self) -> String {
        format!(
            "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}<|im_end|>\n<|im_start|>assistant\n",
            self.system, self.user
        )
    }
}

/// System instruction shared by every backend.
pub fn system_instruction(language: &str) -> String {
    format!(
        "You are an expert at analysing Git changes and writing clear commit messages that \
         follow the Conventional Commits specification. Technical terms may stay in English, \
         but answer in {language} wherever possible. End your answer with the literal text \
         {STOP_SENTINEL} /no_think"
    )
}

/// Output-schema instructions appended after the diff.
fn schema_instructions() -> String {
    let mut text = String::new();
    text.push_str("\nReturn the result as JSON with these fields:\n");
    let _ = writeln!(text, "1. type: commit type ({})", COMMIT_TYPES.join(", "));
    text.push_str("2. scope: affected area, such as a component or file name (optional)\n");
    text.push_str("3. subject: short imperative description, at most 50 characters\n");
    text.push_str("4. body: longer explanation, at most 100 characters (optional)\n");
    text.push_str("5. breaking_changes: true only if the change breaks compatibility (optional, default false)\n");
    text.push_str(
        "\nImportant: return exactly one JSON object, never a JSON array. \
         Summarise all changes into the single most fitting commit message.\n",
    );
    text
}

/// Build the prompt for generating a commit message.
///
/// The compacted diff respects `budget`; the surrounding scaffolding does not
/// count against it.
pub fn build_commit_prompt(diff: &DiffSummary, budget: usize, language: &str) -> PromptEnvelope {
    let compacted = compact(diff, budget);
    build_commit_prompt_from(diff, &compacted, language)
}

pub(crate) fn build_commit_prompt_from(
    diff: &DiffSummary,
    compacted: &CompactedDiff,
    language: &str,
) -> PromptEnvelope {
    let scope = if diff.staged_only() {
        "staged changes"
    } else {
        "working tree changes"
    };

    let mut user = format!(
        "Write a commit message following the Conventional Commits specification for the \
         following Git {scope}.\n\n"
    );
    user.push_str(compacted.text());
    user.push_str(&schema_instructions());

    PromptEnvelope::new(system_instruction(language), user)
}
