//! Request orchestration.
//!
//! The one public operation: validate → cache lookup → model selection →
//! backend dispatch → context/cache update → audit. Side effects are
//! ordered: session context and cache are only touched after a successful
//! completion, so a failed backend call never poisons either. A failed
//! cloud call gets one retry against the local backend (when reachable),
//! and vice versa, before the error surfaces.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::audit::{AuditSink, RequestLogRecord, RequestStatus, TracingAuditSink};
use crate::backend::{
    ChatBackend, ChatCompletion, ChatMessage, ChatParams, ChatRequest, CloudBackend, LocalBackend,
};
use crate::cache::ResponseCache;
use crate::config::RouterSettings;
use crate::error::{BackendError, RouterError};
use crate::health::{AvailabilityProbe, FailureTracker};
use crate::select::{ModelSelection, ModelSelector, SelectionInput};
use crate::session::{Role, SessionContext, SessionStore};
use crate::validate::PromptValidator;

/// Base system prompt; a non-empty context summary is appended beneath it.
const SYSTEM_PROMPT: &str = "You are a sustainability reporting assistant for corporate ESG teams. \
     Answer precisely, and ground figures in the provided conversation context when available.";

/// Caller-facing input for one request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub user_id: String,
    /// Defaults to the user id when absent.
    pub session_id: Option<String>,
    /// Defaults to "standard" when absent.
    pub user_role: Option<String>,
    pub requested_model: Option<String>,
    pub manual_override: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: user_id.into(),
            session_id: None,
            user_role: None,
            requested_model: None,
            manual_override: false,
        }
    }
}

/// Session snapshot returned with a completion.
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub message_count: usize,
    pub topics: Vec<String>,
}

impl From<&SessionContext> for ContextStats {
    fn from(ctx: &SessionContext) -> Self {
        Self {
            message_count: ctx.turns.len(),
            topics: ctx.topics.clone(),
        }
    }
}

/// Successful outcome of [`Orchestrator::handle`].
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub result: String,
    pub model: String,
    pub reason: String,
    pub processing_time_ms: u64,
    pub tokens: u32,
    pub from_cache: bool,
    pub context: ContextStats,
}

struct DispatchOutcome {
    completion: ChatCompletion,
    model: String,
    fell_back: bool,
}

/// Top-level request handler wiring validator, cache, session store,
/// selector, backends, and audit sink together. Stores are injected so
/// tests construct fresh ones per case.
pub struct Orchestrator {
    settings: RouterSettings,
    validator: PromptValidator,
    selector: ModelSelector,
    sessions: Arc<SessionStore>,
    cache: Arc<ResponseCache>,
    failures: Arc<FailureTracker>,
    probe: Arc<AvailabilityProbe>,
    cloud: Arc<dyn ChatBackend>,
    local: Arc<dyn ChatBackend>,
    audit: Arc<dyn AuditSink>,
}

impl Orchestrator {
    /// Production wiring: HTTP backends, probe against the local endpoint,
    /// tracing audit sink, fresh stores.
    pub fn new(settings: RouterSettings) -> anyhow::Result<Self> {
        let cloud = Arc::new(CloudBackend::new(&settings.cloud)?);
        let local = Arc::new(LocalBackend::new(&settings.local, &settings.models.local)?);
        let probe = Arc::new(AvailabilityProbe::new(
            local.clone(),
            Duration::from_secs(settings.local.probe_ttl_secs),
        ));
        let sessions = Arc::new(SessionStore::new(settings.session.clone()));
        let cache = Arc::new(ResponseCache::new(settings.cache.clone()));

        Ok(Self::with_components(
            settings,
            cloud,
            local,
            probe,
            sessions,
            cache,
            Arc::new(TracingAuditSink),
        ))
    }

    /// Explicit wiring for tests and embedders that substitute components.
    pub fn with_components(
        settings: RouterSettings,
        cloud: Arc<dyn ChatBackend>,
        local: Arc<dyn ChatBackend>,
        probe: Arc<AvailabilityProbe>,
        sessions: Arc<SessionStore>,
        cache: Arc<ResponseCache>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let failures = Arc::new(FailureTracker::new());
        let selector = ModelSelector::new(
            settings.selection.clone(),
            settings.models.clone(),
            failures.clone(),
            probe.clone(),
        );

        Self {
            validator: PromptValidator::new(&settings.validation),
            selector,
            settings,
            sessions,
            cache,
            failures,
            probe,
            cloud,
            local,
            audit,
        }
    }

    /// Consecutive cloud-failure counter (shared with the selector).
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: CompletionRequest) -> Result<Completion, RouterError> {
        let started = Instant::now();
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| request.user_id.clone());
        let user_role = request.user_role.as_deref().unwrap_or("standard").to_string();

        if let Err(err) = self.validator.validate(&request.prompt) {
            tracing::info!(user_id = %request.user_id, error = %err, "Prompt rejected");
            self.emit(self.record(
                &request,
                RequestStatus::Rejected,
                0,
                None,
                None,
                Some(err.to_string()),
                serde_json::json!({}),
            ))
            .await;
            return Err(err);
        }

        // Cache hit short-circuits selection and dispatch entirely, but the
        // session still sees the exchange and a cache-sourced record is
        // still written.
        if let Some(entry) = self.cache.get(&request.prompt, &session_id) {
            self.sessions.update(&session_id, Role::User, &request.prompt);
            let ctx = self
                .sessions
                .update(&session_id, Role::Assistant, &entry.response);

            self.emit(self.record(
                &request,
                RequestStatus::Completed,
                0,
                Some(entry.model.clone()),
                Some(entry.tokens),
                None,
                serde_json::json!({
                    "selection_reason": entry.reason.clone(),
                    "cache_hit": true,
                    "cache_key": ResponseCache::key(&request.prompt, &session_id),
                    "context_size": ctx.turns.len(),
                }),
            ))
            .await;

            return Ok(Completion {
                result: entry.response,
                model: entry.model,
                reason: entry.reason,
                processing_time_ms: 0,
                tokens: entry.tokens,
                from_cache: true,
                context: ContextStats::from(&ctx),
            });
        }

        let ctx = self.sessions.get_or_create(&session_id, &request.user_id);
        let selection = self
            .selector
            .select(SelectionInput {
                prompt: &request.prompt,
                user_role: &user_role,
                requested_model: request.requested_model.as_deref(),
                manual_override: request.manual_override,
                context: Some(&ctx),
            })
            .await;
        let complexity = self.selector.complexity(&request.prompt);
        let summary = self.sessions.summarize(&ctx);

        let chat_request = ChatRequest {
            model: selection.model.clone(),
            messages: build_messages(&summary, &request.prompt),
            params: ChatParams::from(&self.settings.generation),
        };

        match self.dispatch(&selection, chat_request).await {
            Ok(outcome) => {
                self.sessions.update(&session_id, Role::User, &request.prompt);
                let ctx = self
                    .sessions
                    .update(&session_id, Role::Assistant, &outcome.completion.text);
                self.cache.set(
                    &request.prompt,
                    &session_id,
                    &outcome.completion.text,
                    &outcome.model,
                    outcome.completion.tokens,
                    &selection.reason,
                );

                let processing_time_ms = started.elapsed().as_millis() as u64;
                self.emit(self.record(
                    &request,
                    RequestStatus::Completed,
                    processing_time_ms,
                    Some(outcome.model.clone()),
                    Some(outcome.completion.tokens),
                    None,
                    serde_json::json!({
                        "selection_reason": selection.reason.clone(),
                        "complexity": complexity,
                        "cache_hit": false,
                        "cache_key": ResponseCache::key(&request.prompt, &session_id),
                        "context_size": ctx.turns.len(),
                        "topics": ctx.topics.clone(),
                        "fell_back": outcome.fell_back,
                    }),
                ))
                .await;

                Ok(Completion {
                    result: outcome.completion.text,
                    model: outcome.model,
                    reason: selection.reason,
                    processing_time_ms,
                    tokens: outcome.completion.tokens,
                    from_cache: false,
                    context: ContextStats::from(&ctx),
                })
            }
            Err(err) => {
                let processing_time_ms = started.elapsed().as_millis() as u64;
                self.emit(self.record(
                    &request,
                    RequestStatus::Failed,
                    processing_time_ms,
                    Some(selection.model.clone()),
                    None,
                    Some(err.to_string()),
                    serde_json::json!({
                        "selection_reason": selection.reason.clone(),
                        "complexity": complexity,
                        "cache_hit": false,
                    }),
                ))
                .await;
                Err(RouterError::Backend(err))
            }
        }
    }

    /// Call the selected backend; on failure, permit one retry against the
    /// alternate backend. Only cloud outcomes touch the failure tracker.
    async fn dispatch(
        &self,
        selection: &ModelSelection,
        request: ChatRequest,
    ) -> Result<DispatchOutcome, BackendError> {
        let primary: &Arc<dyn ChatBackend> = if selection.use_local {
            &self.local
        } else {
            &self.cloud
        };

        match primary.complete(&request).await {
            Ok(completion) => {
                if !selection.use_local {
                    self.failures.record_success();
                }
                Ok(DispatchOutcome {
                    model: request.model,
                    completion,
                    fell_back: false,
                })
            }
            Err(primary_err) => {
                tracing::warn!(
                    backend = primary.id(),
                    error = %primary_err,
                    "Backend call failed"
                );
                if !selection.use_local {
                    self.failures.record_failure();
                }

                if selection.use_local {
                    // Local failed; the cloud is always a permitted retry.
                    let retry = ChatRequest {
                        model: self.settings.models.standard.clone(),
                        ..request
                    };
                    match self.cloud.complete(&retry).await {
                        Ok(completion) => {
                            self.failures.record_success();
                            tracing::info!(model = %retry.model, "Recovered via cloud backend");
                            Ok(DispatchOutcome {
                                model: retry.model,
                                completion,
                                fell_back: true,
                            })
                        }
                        Err(retry_err) => {
                            self.failures.record_failure();
                            Err(retry_err)
                        }
                    }
                } else if self.probe.refresh().await {
                    // Cloud failed; consult the prober before trying local.
                    let retry = ChatRequest {
                        model: self.settings.models.local.clone(),
                        ..request
                    };
                    match self.local.complete(&retry).await {
                        Ok(completion) => {
                            tracing::info!(model = %retry.model, "Recovered via local backend");
                            Ok(DispatchOutcome {
                                model: retry.model,
                                completion,
                                fell_back: true,
                            })
                        }
                        Err(retry_err) => Err(retry_err),
                    }
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request: &CompletionRequest,
        status: RequestStatus,
        processing_time_ms: u64,
        model_used: Option<String>,
        tokens: Option<u32>,
        error_message: Option<String>,
        metadata: serde_json::Value,
    ) -> RequestLogRecord {
        RequestLogRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            prompt: request.prompt.clone(),
            requested_model: request.requested_model.clone(),
            model_used,
            manual_override: request.manual_override,
            status,
            processing_time_ms,
            tokens,
            error_message,
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Fire-and-forget audit write: a sink failure never fails the request.
    async fn emit(&self, record: RequestLogRecord) {
        if let Err(e) = self.audit.record(&record).await {
            tracing::warn!(error = %e, "Failed to write audit record");
        }
    }
}

/// System prompt (with embedded context summary when non-empty) plus the
/// user prompt.
fn build_messages(summary: &str, prompt: &str) -> Vec<ChatMessage> {
    let system = if summary.is_empty() {
        SYSTEM_PROMPT.to_string()
    } else {
        format!("{}\n\nConversation so far:\n{}", SYSTEM_PROMPT, summary)
    };

    vec![ChatMessage::system(system), ChatMessage::user(prompt)]
}
