//! Remote Ollama HTTP backend.

pub mod client;

pub use client::OllamaBackend;
