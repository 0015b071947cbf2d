//! Inference backend abstraction, JSON location, and retry.

pub mod backend;
pub mod json;
pub mod retry;

pub use backend::{InferenceBackend, InferenceResult, RunState};
pub use json::{balanced_objects, excerpt, outer_object_span};
pub use retry::retry_with_backoff;
