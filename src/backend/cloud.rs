//! Cloud chat-completion adapter (OpenAI-compatible API).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::CloudSettings;
use crate::error::BackendError;

use super::{ChatBackend, ChatCompletion, ChatRequest, estimate_tokens, extract_error_message};

const BACKEND_ID: &str = "cloud";

/// Adapter for an OpenAI-compatible `/chat/completions` endpoint.
pub struct CloudBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl CloudBackend {
    pub fn new(settings: &CloudSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl ChatBackend for CloudBackend {
    fn id(&self) -> &'static str {
        BACKEND_ID
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
            "top_p": request.params.top_p,
            "stream": false,
        });

        let mut builder = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|source| BackendError::Transport {
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

        let parsed: CompletionBody =
            response.json().await.map_err(|source| BackendError::Transport {
                backend: BACKEND_ID.to_string(),
                source,
            })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed {
                backend: BACKEND_ID.to_string(),
                detail: "response contained no choices".to_string(),
            })?;

        let tokens = match parsed.usage {
            Some(usage) if usage.total_tokens > 0 => usage.total_tokens,
            _ => estimate_tokens(&text),
        };

        Ok(ChatCompletion { text, tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let backend = CloudBackend::new(&CloudSettings {
            base_url: "https://api.deepseek.com/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn completion_body_parses_usage() {
        let body: CompletionBody = serde_json::from_str(
            r#"{
                "choices": [{"message": {"role": "assistant", "content": "42 tCO2e"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        assert_eq!(body.choices.len(), 1);
        assert_eq!(body.usage.map(|u| u.total_tokens), Some(15));
    }

    #[test]
    fn completion_body_tolerates_missing_usage() {
        let body: CompletionBody = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "ok"}}]}"#,
        )
        .unwrap();
        assert!(body.usage.is_none());
    }
}
