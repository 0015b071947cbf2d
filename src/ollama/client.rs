//! Ollama chat API client.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commit::prompt::PromptEnvelope;
use crate::config::OllamaConfig;
use crate::error::{ConfigError, InferenceError};
use crate::llm::backend::{InferenceBackend, InferenceResult, RunState};
use crate::llm::json::excerpt;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// HTTP backend issuing one non-streaming chat request per call.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("aimmit/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http client",
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout {
                secs: self.config.timeout.as_secs(),
                partial: String::new(),
            }
        } else if err.is_connect() {
            InferenceError::Unreachable(err)
        } else {
            InferenceError::Transport(err)
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn invoke(&self, prompt: &PromptEnvelope) -> Result<InferenceResult, InferenceError> {
        let url = self.config.chat_url();
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: prompt.system(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.user(),
                },
            ],
            stream: false,
        };

        debug!(
            "Ollama request: url={}, model={}, prompt={} chars",
            url,
            self.config.model,
            prompt.user().len()
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;

        debug!(
            "Ollama response: status={}, {} bytes in {:.1}s",
            status,
            text.len(),
            started.elapsed().as_secs_f64()
        );

        // An error field in a well-formed body is a backend failure whatever
        // the status code.
        let parsed = serde_json::from_str::<ChatResponse>(&text);
        if let Ok(ChatResponse {
            error: Some(message),
            ..
        }) = &parsed
            && !message.trim().is_empty()
        {
            return Err(InferenceError::Backend(message.clone()));
        }

        if !status.is_success() {
            return Err(InferenceError::HttpStatus {
                status: status.as_u16(),
                body: excerpt(&text, 500),
            });
        }

        match parsed {
            Ok(ChatResponse {
                message: Some(message),
                ..
            }) => Ok(InferenceResult {
                text: message.content,
                state: RunState::Completed,
            }),
            Ok(_) => Err(InferenceError::InvalidResponse(
                "response has no message".to_string(),
            )),
            Err(e) => Err(InferenceError::InvalidResponse(format!(
                "{}: {}",
                e,
                excerpt(&text, 200)
            ))),
        }
    }
}
