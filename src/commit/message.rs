//! Commit message value and extraction from raw model output.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtractError;
use crate::llm::json::{balanced_objects, excerpt, outer_object_span};

const EXCERPT_CHARS: usize = 200;

/// A conventional commit message decoded from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    #[serde(rename = "type")]
    commit_type: String,
    #[serde(default)]
    scope: Option<String>,
    subject: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default, alias = "breaking")]
    breaking_changes: bool,
    /// Diff the message was generated from. Never serialized.
    #[serde(skip)]
    raw_diff: String,
}

impl CommitMessage {
    pub fn new(
        commit_type: impl Into<String>,
        scope: Option<String>,
        subject: impl Into<String>,
        body: Option<String>,
        breaking_changes: bool,
    ) -> Self {
        Self {
            commit_type: commit_type.into(),
            scope,
            subject: subject.into(),
            body,
            breaking_changes,
            raw_diff: String::new(),
        }
        .normalized()
    }

    pub fn commit_type(&self) -> &str {
        &self.commit_type
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn breaking_changes(&self) -> bool {
        self.breaking_changes
    }

    pub fn raw_diff(&self) -> &str {
        &self.raw_diff
    }

    /// The `type(scope)!: subject` line.
    pub fn header(&self) -> String {
        let mut header = self.commit_type.clone();
        if let Some(scope) = &self.scope {
            header.push('(');
            header.push_str(scope);
            header.push(')');
        }
        if self.breaking_changes {
            header.push('!');
        }
        header.push_str(": ");
        header.push_str(&self.subject);
        header
    }

    fn normalized(mut self) -> Self {
        self.commit_type = self.commit_type.trim().to_string();
        self.subject = self.subject.trim().to_string();
        self.scope = non_blank(self.scope.take());
        self.body = non_blank(self.body.take());
        self
    }

    fn check(&self) -> Result<(), String> {
        if self.commit_type.is_empty() {
            return Err("field `type` is empty".to_string());
        }
        if self.subject.is_empty() {
            return Err("field `subject` is empty".to_string());
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Renders the message in the layout git expects:
///
/// ```text
/// type(scope)!: subject
///
/// Body text.
///
/// BREAKING CHANGE: subject
/// ```
impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if let Some(body) = &self.body {
            write!(f, "\n\n{body}")?;
        }
        if self.breaking_changes {
            write!(f, "\n\nBREAKING CHANGE: {}", self.subject)?;
        }
        Ok(())
    }
}

fn decode(candidate: &str) -> Result<CommitMessage, String> {
    let message = serde_json::from_str::<CommitMessage>(candidate)
        .map_err(|e| e.to_string())?
        .normalized();
    message.check()?;
    Ok(message)
}

/// Locate and decode the commit message object in raw model output.
///
/// The span from the first `{` to the last `}` is tried first. If that span
/// is valid JSON, it is the answer and a schema mismatch is final. Only when
/// it is not JSON at all (prose with stray braces around the object) are the
/// top-level balanced objects inside the output tried in order.
pub fn extract_commit_message(
    raw: &str,
    raw_diff: impl Into<String>,
) -> Result<CommitMessage, ExtractError> {
    let Some(span) = outer_object_span(raw) else {
        return Err(ExtractError::StructuredOutputMissing {
            excerpt: excerpt(raw, EXCERPT_CHARS),
        });
    };

    let first_error = match decode(span) {
        Ok(mut message) => {
            message.raw_diff = raw_diff.into();
            return Ok(message);
        }
        Err(e) => e,
    };

    if serde_json::from_str::<serde_json::Value>(span).is_err() {
        debug!("Outer JSON span did not decode ({}), trying inner objects", first_error);
        if let Some(mut message) = top_level_objects(raw)
            .into_iter()
            .filter(|candidate| candidate.len() != span.len())
            .find_map(|candidate| decode(candidate).ok())
        {
            message.raw_diff = raw_diff.into();
            return Ok(message);
        }
    }

    Err(ExtractError::StructuredOutputInvalid {
        reason: first_error,
        excerpt: excerpt(span, EXCERPT_CHARS),
    })
}

/// Balanced objects of `raw` that are not nested inside an earlier one.
fn top_level_objects(raw: &str) -> Vec<&str> {
    let base = raw.as_ptr() as usize;
    let mut covered_until = 0;
    let mut objects = Vec::new();
    for candidate in balanced_objects(raw) {
        let start = candidate.as_ptr() as usize - base;
        if start < covered_until {
            continue;
        }
        covered_until = start + candidate.len();
        objects.push(candidate);
    }
    objects
}
