//! AI-generated commit messages: diff compaction, prompting, extraction.

pub mod assembler;
pub mod compact;
pub mod diff;
pub mod message;
pub mod prompt;

pub use assembler::{AssemblerOptions, CommitMessageAssembler};
pub use compact::{CompactedDiff, DEFAULT_BUDGET, compact};
pub use diff::DiffSummary;
pub use message::{CommitMessage, extract_commit_message};
pub use prompt::{PromptEnvelope, STOP_SENTINEL, build_commit_prompt};
