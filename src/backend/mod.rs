//! Chat-completion backends.
//!
//! The orchestrator depends only on [`ChatBackend`]; the cloud and local
//! adapters are interchangeable implementations, and tests substitute fakes.

pub mod cloud;
pub mod local;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BackendError;

pub use cloud::CloudBackend;
pub use local::LocalBackend;

/// One message in a chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded to a backend.
#[derive(Debug, Clone, Copy)]
pub struct ChatParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl From<&crate::config::GenerationSettings> for ChatParams {
    fn from(settings: &crate::config::GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
        }
    }
}

/// A fully specified chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub params: ChatParams,
}

/// A backend's answer.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    /// Total tokens reported by the backend, or a length-based estimate
    /// when the backend reports no usage.
    pub tokens: u32,
}

/// Capability interface: complete a chat given messages, or fail.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Stable identifier used in errors and audit records.
    fn id(&self) -> &'static str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, BackendError>;
}

/// Rough token estimate for text without reported usage: ~4 chars/token.
pub(crate) fn estimate_tokens(text: &str) -> u32 {
    ((text.len() + 3) / 4) as u32
}

/// Pull a human-readable message out of an error body.
///
/// Tries the OpenAI `{"error": {"message": ...}}` shape, then a flat
/// `{"error": ...}` string, then falls back to the truncated raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return msg.to_string();
        }
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no error body".to_string();
    }
    trimmed.chars().take(200).collect()
}
