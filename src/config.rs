//! Immutable backend configuration.
//!
//! Values are assembled once (defaults, then environment overrides, then CLI
//! flags) and handed to a backend at construction. Nothing mutates them
//! afterwards.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Default timeout for a single inference call (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default upper bound on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:3b";

/// Environment variable overriding the inference timeout (seconds).
pub const TIMEOUT_ENV_VAR: &str = "AIMMIT_TIMEOUT";

/// Environment variable overriding the sampling temperature.
pub const TEMPERATURE_ENV_VAR: &str = "AIMMIT_TEMPERATURE";

/// Environment variable overriding the maximum token count.
pub const MAX_TOKENS_ENV_VAR: &str = "AIMMIT_MAX_TOKENS";

/// Read a typed value from the environment.
///
/// Unset or empty variables yield `default`. Unparseable values log a
/// warning and also yield `default`.
fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(var) {
        Ok(v) if !v.is_empty() => match v.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid {} value '{}', using default {}", var, v, default);
                default
            }
        },
        _ => default,
    }
}

/// Timeout read from `AIMMIT_TIMEOUT`, falling back to the default.
pub fn timeout_from_env() -> Duration {
    Duration::from_secs(env_or(TIMEOUT_ENV_VAR, DEFAULT_TIMEOUT_SECS))
}

/// Configuration for the llama.cpp process backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LlamaConfig {
    pub model_path: PathBuf,
    /// Path to `llama-cli`, or a bare name resolved through `PATH`.
    pub executable_path: PathBuf,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
    pub min_p: f32,
    pub timeout: Duration,
    /// Drain stderr and echo generated lines into debug logs.
    pub verbose: bool,
}

impl LlamaConfig {
    /// Build a configuration with the tuned sampling defaults, applying
    /// environment overrides.
    pub fn new(model_path: impl Into<PathBuf>, executable_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            executable_path: executable_path.into(),
            temperature: env_or(TEMPERATURE_ENV_VAR, 0.7),
            max_tokens: env_or(MAX_TOKENS_ENV_VAR, DEFAULT_MAX_TOKENS),
            top_p: 0.8,
            top_k: 20,
            min_p: 0.0,
            timeout: timeout_from_env(),
            verbose: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check value ranges before the configuration is used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingModelPath);
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::InvalidValue {
                field: "top_p",
                reason: format!("{} is outside 0.0..=1.0", self.top_p),
            });
        }
        if !(0.0..=1.0).contains(&self.min_p) {
            return Err(ConfigError::InvalidValue {
                field: "min_p",
                reason: format!("{} is outside 0.0..=1.0", self.min_p),
            });
        }
        if self.temperature < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "temperature",
                reason: format!("{} is negative", self.temperature),
            });
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_tokens",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the Ollama HTTP backend.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout: timeout_from_env(),
        }
    }
}

impl OllamaConfig {
    /// The chat endpoint, tolerating a trailing slash on the base URL.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}
