//! Per-session conversational context.
//!
//! A process-wide map from session id to a bounded rolling window of turns
//! plus a small set of recently-seen topics. Expired sessions are evicted
//! opportunistically on access, never by a background sweeper, so an entry
//! just written is never evicted by the access that wrote it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;

/// Words ignored during topic extraction.
static STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "is", "are", "was", "were", "what", "which", "about",
    "with", "from", "this", "that", "these", "those", "have", "has", "their", "there", "would",
    "could", "should", "please",
];

/// Most-recently-seen topics retained per session.
const MAX_TOPICS: usize = 10;

/// Topics pulled from a single user turn.
const TOPICS_PER_TURN: usize = 3;

/// Characters of turn content rendered into a summary line.
const SUMMARY_CONTENT_CHARS: usize = 100;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a session.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Rolling conversational context for one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub turns: Vec<Turn>,
    pub topics: Vec<String>,
    pub created: DateTime<Utc>,
    last_accessed: Instant,
}

impl SessionContext {
    fn new(session_id: &str, user_id: &str, now: Instant) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            turns: Vec::new(),
            topics: Vec::new(),
            created: Utc::now(),
            last_accessed: now,
        }
    }

    /// Render the last `max_messages` turns as a numbered transcript plus a
    /// trailing topics line. Empty string when the session has no turns.
    pub fn summarize(&self, max_messages: usize) -> String {
        if self.turns.is_empty() {
            return String::new();
        }

        let start = self.turns.len().saturating_sub(max_messages);
        let mut lines: Vec<String> = self.turns[start..]
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                let truncated: String = turn.content.chars().take(SUMMARY_CONTENT_CHARS).collect();
                let ellipsis = if turn.content.chars().count() > SUMMARY_CONTENT_CHARS {
                    "..."
                } else {
                    ""
                };
                format!("{}. {}: {}{}", i + 1, turn.role, truncated, ellipsis)
            })
            .collect();

        if !self.topics.is_empty() {
            lines.push(format!("Topics: {}", self.topics.join(", ")));
        }

        lines.join("\n")
    }
}

/// Process-wide session context store.
///
/// The map is guarded by a `Mutex` so the evict-lookup-insert sequence in
/// [`SessionStore::get_or_create`] is atomic under multi-threaded tokio.
pub struct SessionStore {
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<String, SessionContext>>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Return the context for `session_id`, creating it when absent.
    ///
    /// Evicts every context idle longer than the expiration window before
    /// looking up, then bumps the entry's access time.
    pub fn get_or_create(&self, session_id: &str, user_id: &str) -> SessionContext {
        let now = self.clock.now();
        let expiration = Duration::from_secs(self.settings.expiration_secs);

        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let before = map.len();
        map.retain(|_, ctx| now.duration_since(ctx.last_accessed) < expiration);
        let evicted = before - map.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired session contexts");
        }

        let ctx = map
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, user_id, now));
        ctx.last_accessed = now;
        ctx.clone()
    }

    /// Append a turn, re-derive topics from user content, trim the window,
    /// and bump the access time. Returns the updated context.
    pub fn update(&self, session_id: &str, role: Role, content: &str) -> SessionContext {
        let now = self.clock.now();
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let ctx = map
            .entry(session_id.to_string())
            .or_insert_with(|| SessionContext::new(session_id, session_id, now));

        ctx.turns.push(Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });

        // Topics come from what the user asks, not what the model answers.
        if role == Role::User {
            for topic in extract_topics(content) {
                if let Some(pos) = ctx.topics.iter().position(|t| *t == topic) {
                    ctx.topics.remove(pos);
                }
                ctx.topics.push(topic);
            }
            if ctx.topics.len() > MAX_TOPICS {
                let excess = ctx.topics.len() - MAX_TOPICS;
                ctx.topics.drain(..excess);
            }
        }

        let max_turns = 2 * self.settings.max_context_messages;
        if ctx.turns.len() > max_turns {
            let excess = ctx.turns.len() - max_turns;
            ctx.turns.drain(..excess);
        }

        ctx.last_accessed = now;
        ctx.clone()
    }

    /// Render a context summary using this store's configured window.
    pub fn summarize(&self, ctx: &SessionContext) -> String {
        ctx.summarize(self.settings.max_context_messages)
    }

    /// Number of live (possibly expired-but-unswept) contexts.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all contexts.
    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Topic heuristic: lowercase, whitespace-split, drop stop words, keep words
/// longer than 4 chars, take the first 3.
fn extract_topics(content: &str) -> Vec<String> {
    content
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .filter(|w| w.chars().count() > 4)
        .take(TOPICS_PER_TURN)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use pretty_assertions::assert_eq;

    fn store() -> SessionStore {
        SessionStore::new(SessionSettings::default())
    }

    #[test]
    fn creates_context_lazily() {
        let store = store();
        assert!(store.is_empty());
        let ctx = store.get_or_create("s1", "u1");
        assert_eq!(ctx.session_id, "s1");
        assert_eq!(ctx.user_id, "u1");
        assert!(ctx.turns.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn turn_window_keeps_most_recent_in_order() {
        let store = store();
        store.get_or_create("s1", "u1");

        // 2 * max_context_messages = 10; append 13.
        for i in 0..13 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.update("s1", role, &format!("turn {}", i));
        }

        let ctx = store.get_or_create("s1", "u1");
        assert_eq!(ctx.turns.len(), 10);
        assert_eq!(ctx.turns.first().unwrap().content, "turn 3");
        assert_eq!(ctx.turns.last().unwrap().content, "turn 12");
    }

    #[test]
    fn topics_come_from_user_turns_only() {
        let store = store();
        store.update("s1", Role::User, "benchmark renewable electricity targets");
        store.update("s1", Role::Assistant, "emissions decarbonization materiality");

        let ctx = store.get_or_create("s1", "u1");
        assert_eq!(
            ctx.topics,
            vec!["benchmark", "renewable", "electricity"]
        );
    }

    #[test]
    fn topic_extraction_drops_stop_words_and_short_words() {
        let topics = extract_topics("what about the scope emissions from their fleet");
        // "what", "about", "the", "from", "their" are stop words; "scope" and
        // "fleet" both qualify (> 4 chars).
        assert_eq!(topics, vec!["scope", "emissions", "fleet"]);
    }

    #[test]
    fn topics_bounded_to_most_recent_ten() {
        let store = store();
        for i in 0..6 {
            store.update(
                "s1",
                Role::User,
                &format!("topicword{}a topicword{}b question", i, i),
            );
        }
        let ctx = store.get_or_create("s1", "u1");
        assert_eq!(ctx.topics.len(), MAX_TOPICS);
        // Oldest extracted topics fell off the front.
        assert!(!ctx.topics.contains(&"topicword0a".to_string()));
        assert_eq!(ctx.topics.last().unwrap(), "question");
    }

    #[test]
    fn summarize_renders_numbered_transcript_with_topics() {
        let store = store();
        store.update("s1", Role::User, "compare renewable targets");
        store.update("s1", Role::Assistant, "Targets are on track.");

        let ctx = store.get_or_create("s1", "u1");
        let summary = store.summarize(&ctx);
        assert_eq!(
            summary,
            "1. user: compare renewable targets\n\
             2. assistant: Targets are on track.\n\
             Topics: compare, renewable, targets"
        );
    }

    #[test]
    fn summarize_truncates_long_content() {
        let store = store();
        let long = "x".repeat(150);
        store.update("s1", Role::User, &long);

        let ctx = store.get_or_create("s1", "u1");
        let summary = store.summarize(&ctx);
        let first_line = summary.lines().next().unwrap();
        assert!(first_line.ends_with("..."));
        assert!(first_line.contains(&"x".repeat(100)));
        assert!(!first_line.contains(&"x".repeat(101)));
    }

    #[test]
    fn summarize_empty_context_is_empty_string() {
        let store = store();
        let ctx = store.get_or_create("s1", "u1");
        assert_eq!(store.summarize(&ctx), "");
    }

    #[test]
    fn idle_sessions_evicted_on_access() {
        let clock = ManualClock::new();
        let store = SessionStore::with_clock(
            SessionSettings {
                expiration_secs: 1800,
                ..Default::default()
            },
            Arc::new(clock.clone()),
        );

        store.get_or_create("stale", "u1");
        store.update("stale", Role::User, "old question");

        clock.advance(Duration::from_secs(1801));
        let ctx = store.get_or_create("stale", "u1");
        // Evicted and recreated fresh.
        assert!(ctx.turns.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn recent_sessions_survive_eviction_pass() {
        let clock = ManualClock::new();
        let store = SessionStore::with_clock(
            SessionSettings::default(),
            Arc::new(clock.clone()),
        );

        store.update("fresh", Role::User, "recent question");
        clock.advance(Duration::from_secs(60));
        let ctx = store.get_or_create("fresh", "u1");
        assert_eq!(ctx.turns.len(), 1);
    }
}
