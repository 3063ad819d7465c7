//! Request audit records.
//!
//! One immutable record per processed (or rejected) request, handed to a
//! pluggable sink. The write is fire-and-forget: a sink failure is logged
//! locally and never affects the caller's result.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Terminal state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Completed,
    Rejected,
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One row per request. Owned by the persistence collaborator; this crate
/// only defines the shape and hands records to a sink.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogRecord {
    pub id: Uuid,
    pub user_id: String,
    pub prompt: String,
    pub requested_model: Option<String>,
    pub model_used: Option<String>,
    pub manual_override: bool,
    pub status: RequestStatus,
    pub processing_time_ms: u64,
    pub tokens: Option<u32>,
    pub error_message: Option<String>,
    /// Free-form diagnostics: selection reason, complexity score, cache hit
    /// flag, context size, topics, cache key.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &RequestLogRecord) -> anyhow::Result<()>;
}

/// Default sink: emits each record as a structured tracing event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &RequestLogRecord) -> anyhow::Result<()> {
        tracing::info!(
            request_id = %record.id,
            user_id = %record.user_id,
            status = %record.status,
            model_used = record.model_used.as_deref().unwrap_or("-"),
            manual_override = record.manual_override,
            processing_time_ms = record.processing_time_ms,
            tokens = record.tokens.unwrap_or(0),
            error = record.error_message.as_deref().unwrap_or(""),
            metadata = %record.metadata,
            "Request processed"
        );
        Ok(())
    }
}

/// In-memory sink for tests and local inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<RequestLogRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RequestLogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &RequestLogRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: RequestStatus) -> RequestLogRecord {
        RequestLogRecord {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            prompt: "hello".to_string(),
            requested_model: None,
            model_used: Some("deepseek-chat".to_string()),
            manual_override: false,
            status,
            processing_time_ms: 12,
            tokens: Some(8),
            error_message: None,
            metadata: serde_json::json!({"cache_hit": false}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_sink_collects_records() {
        let sink = MemoryAuditSink::new();
        sink.record(&sample(RequestStatus::Completed)).await.unwrap();
        sink.record(&sample(RequestStatus::Rejected)).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, RequestStatus::Completed);
        assert_eq!(records[1].status, RequestStatus::Rejected);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RequestStatus::Rejected).unwrap(),
            "\"rejected\""
        );
        assert_eq!(RequestStatus::Completed.to_string(), "completed");
    }
}
