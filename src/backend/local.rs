//! Local chat-completion adapter (Ollama-compatible API).
//!
//! Also implements the availability probe: a 1-token request against the
//! same chat endpoint with a short timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::LocalSettings;
use crate::error::{BackendError, ProbeError};
use crate::health::ProbeTransport;

use super::{ChatBackend, ChatCompletion, ChatRequest, estimate_tokens, extract_error_message};

const BACKEND_ID: &str = "local";

/// Adapter for an Ollama-compatible `/api/chat` endpoint.
pub struct LocalBackend {
    http: reqwest::Client,
    probe_http: reqwest::Client,
    base_url: String,
    /// Model used for probes (completions carry their own model).
    probe_model: String,
}

impl LocalBackend {
    pub fn new(settings: &LocalSettings, probe_model: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let probe_http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.probe_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            probe_http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            probe_model: probe_model.to_string(),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[derive(Deserialize)]
struct OllamaChatBody {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl ChatBackend for LocalBackend {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, BackendError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
            "options": {
                "temperature": request.params.temperature,
                "num_predict": request.params.max_tokens,
            },
        });

        let response = self
            .http
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                backend: BACKEND_ID.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: BACKEND_ID.to_string(),
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let parsed: OllamaChatBody =
            response.json().await.map_err(|source| BackendError::Transport {
                backend: BACKEND_ID.to_string(),
                source,
            })?;

        let text = parsed
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BackendError::Malformed {
                backend: BACKEND_ID.to_string(),
                detail: "response contained no message content".to_string(),
            })?;

        let tokens = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(p), Some(e)) => p + e,
            _ => estimate_tokens(&text),
        };

        Ok(ChatCompletion { text, tokens })
    }
}

#[async_trait]
impl ProbeTransport for LocalBackend {
    async fn ping(&self) -> Result<(), ProbeError> {
        let body = serde_json::json!({
            "model": self.probe_model,
            "messages": [{"role": "user", "content": "ping"}],
            "stream": false,
            "options": {"num_predict": 1},
        });

        let response = self
            .probe_http
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProbeError {
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProbeError {
                reason: format!("HTTP {}", response.status().as_u16()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_body_sums_reported_token_counts() {
        let body: OllamaChatBody = serde_json::from_str(
            r#"{"message": {"role": "assistant", "content": "done"},
                "prompt_eval_count": 12, "eval_count": 30}"#,
        )
        .unwrap();
        assert_eq!(body.prompt_eval_count, Some(12));
        assert_eq!(body.eval_count, Some(30));
    }

    #[test]
    fn ollama_body_tolerates_missing_counts() {
        let body: OllamaChatBody =
            serde_json::from_str(r#"{"message": {"content": "hi"}}"#).unwrap();
        assert!(body.eval_count.is_none());
        assert_eq!(body.message.unwrap().content, "hi");
    }

    #[test]
    fn chat_url_joins_base() {
        let backend = LocalBackend::new(
            &LocalSettings {
                base_url: "http://localhost:11434/".to_string(),
                ..Default::default()
            },
            "llama3.1:8b",
        )
        .unwrap();
        assert_eq!(backend.chat_url(), "http://localhost:11434/api/chat");
    }
}
