//! Hybrid cloud/local LLM request router.
//!
//! The router takes a prompt plus a session identifier and returns generated
//! text with routing metadata. In between it validates the prompt, consults
//! a TTL response cache, maintains a bounded per-session context window,
//! scores prompt complexity, and picks among an advanced cloud model, a
//! standard cloud model, and a local (self-hosted) model — falling back
//! between backends when one fails.
//!
//! The [`orchestrator::Orchestrator`] is the entry point; everything it
//! depends on (backends, stores, audit sink, availability probe) is injected
//! so embedders and tests can substitute their own implementations.
//!
//! ```no_run
//! use canopy_router::{CompletionRequest, Orchestrator, RouterSettings};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let router = Orchestrator::new(RouterSettings::load())?;
//! let completion = router
//!     .handle(CompletionRequest::new("summarize our scope 2 emissions", "user-17"))
//!     .await?;
//! println!("{} (via {})", completion.result, completion.model);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod backend;
pub mod cache;
pub mod clock;
pub mod complexity;
pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod select;
pub mod session;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use audit::{AuditSink, MemoryAuditSink, RequestLogRecord, RequestStatus, TracingAuditSink};
pub use backend::{ChatBackend, ChatCompletion, ChatMessage, ChatParams, ChatRequest};
pub use cache::{CacheEntry, ResponseCache};
pub use complexity::ComplexityScorer;
pub use config::{Estimator, RouterSettings};
pub use error::{BackendError, ProbeError, RouterError};
pub use health::{AvailabilityProbe, FailureTracker, ProbeTransport};
pub use orchestrator::{Completion, CompletionRequest, ContextStats, Orchestrator};
pub use select::{ModelSelection, ModelSelector, SelectionInput};
pub use session::{Role, SessionContext, SessionStore, Turn};
pub use validate::PromptValidator;
