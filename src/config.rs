//! Router configuration.
//!
//! Settings load with env var > router.json > default priority. The file
//! lives at ~/.canopy/router.json; every field has a serde default so a
//! partial (or absent) file still yields a working configuration. The cloud
//! API key is only ever read from the environment or the file, never
//! written back out.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

/// Complete router configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RouterSettings {
    /// Model identifiers per routing target.
    #[serde(default)]
    pub models: ModelSettings,

    /// Generation parameters forwarded to backends.
    #[serde(default)]
    pub generation: GenerationSettings,

    /// Prompt validation policy.
    #[serde(default)]
    pub validation: ValidationSettings,

    /// Model-selection thresholds and rule knobs.
    #[serde(default)]
    pub selection: SelectionSettings,

    /// Session context window and expiry.
    #[serde(default)]
    pub session: SessionSettings,

    /// Response cache TTL.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Cloud chat-completion endpoint.
    #[serde(default)]
    pub cloud: CloudSettings,

    /// Local (self-hosted) chat-completion endpoint.
    #[serde(default)]
    pub local: LocalSettings,
}

/// Model identifiers for the three routing targets.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Advanced cloud model for complex or priority traffic.
    #[serde(default = "default_advanced_model")]
    pub advanced: String,

    /// Standard cloud model for everyday traffic.
    #[serde(default = "default_standard_model")]
    pub standard: String,

    /// Local model served by the self-hosted endpoint.
    #[serde(default = "default_local_model")]
    pub local: String,
}

fn default_advanced_model() -> String {
    "deepseek-reasoner".to_string()
}

fn default_standard_model() -> String {
    "deepseek-chat".to_string()
}

fn default_local_model() -> String {
    "llama3.1:8b".to_string()
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            advanced: default_advanced_model(),
            standard: default_standard_model(),
            local: default_local_model(),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSettings {
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_top_p() -> f64 {
    0.95
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

/// Prompt validation policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSettings {
    /// Case-insensitive substrings that reject a prompt outright.
    #[serde(default = "default_restricted_terms")]
    pub restricted_terms: Vec<String>,
}

fn default_restricted_terms() -> Vec<String> {
    ["password", "credit card", "social security"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            restricted_terms: default_restricted_terms(),
        }
    }
}

/// Which complexity estimator a router instance uses.
///
/// One estimator per instance; the two are never mixed within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimator {
    /// Lexical diversity + word length + prompt length.
    #[default]
    Lexical,
    /// Lexical base plus domain-keyword and question-density increments.
    Keyword,
}

impl std::str::FromStr for Estimator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "keyword" | "rich" => Ok(Self::Keyword),
            _ => Err(format!(
                "invalid estimator '{}', expected: lexical, keyword",
                s
            )),
        }
    }
}

/// Model-selection thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionSettings {
    /// Roles that always receive the advanced cloud model.
    #[serde(default = "default_priority_roles")]
    pub priority_roles: Vec<String>,

    /// Consecutive cloud failures before routing prefers the local backend.
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: u32,

    /// Whether low-complexity prompts may be served locally at all.
    #[serde(default = "default_true")]
    pub hybrid_local: bool,

    /// Complexity at or below which a prompt qualifies for local serving.
    #[serde(default = "default_local_complexity_threshold")]
    pub local_complexity_threshold: f64,

    /// Prompt length (chars) above which the advanced model is used.
    #[serde(default = "default_long_prompt_threshold")]
    pub long_prompt_threshold: usize,

    /// Complexity above which the advanced model is used.
    #[serde(default = "default_high_complexity_threshold")]
    pub high_complexity_threshold: f64,

    /// Prior turns beyond which a session counts as multi-turn.
    #[serde(default = "default_multi_turn_threshold")]
    pub multi_turn_threshold: usize,

    /// Complexity estimator for this instance.
    #[serde(default)]
    pub estimator: Estimator,
}

fn default_priority_roles() -> Vec<String> {
    vec!["admin".to_string(), "manager".to_string()]
}

fn default_fallback_threshold() -> u32 {
    3
}

fn default_local_complexity_threshold() -> f64 {
    0.5
}

fn default_long_prompt_threshold() -> usize {
    150
}

fn default_high_complexity_threshold() -> f64 {
    0.7
}

fn default_multi_turn_threshold() -> usize {
    3
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            priority_roles: default_priority_roles(),
            fallback_threshold: default_fallback_threshold(),
            hybrid_local: true,
            local_complexity_threshold: default_local_complexity_threshold(),
            long_prompt_threshold: default_long_prompt_threshold(),
            high_complexity_threshold: default_high_complexity_threshold(),
            multi_turn_threshold: default_multi_turn_threshold(),
            estimator: Estimator::default(),
        }
    }
}

/// Session context window and idle expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Turns rendered into the context summary. The store retains twice
    /// this many turns.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,

    /// Idle seconds after which a session context is evicted.
    #[serde(default = "default_session_expiration_secs")]
    pub expiration_secs: u64,
}

fn default_max_context_messages() -> usize {
    5
}

fn default_session_expiration_secs() -> u64 {
    1800 // 30 minutes
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_context_messages: default_max_context_messages(),
            expiration_secs: default_session_expiration_secs(),
        }
    }
}

/// Response cache TTL.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// Seconds a cached response stays servable.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Cloud chat-completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudSettings {
    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,

    /// Bearer token. Usually supplied via CANOPY_CLOUD_API_KEY.
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// Request timeout in seconds.
    #[serde(default = "default_cloud_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_cloud_base_url() -> String {
    "https://api.deepseek.com/v1".to_string()
}

fn default_cloud_timeout_secs() -> u64 {
    60
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            base_url: default_cloud_base_url(),
            api_key: None,
            timeout_secs: default_cloud_timeout_secs(),
        }
    }
}

/// Local (self-hosted) chat-completion endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSettings {
    /// Base URL of the Ollama-compatible API.
    #[serde(default = "default_local_base_url")]
    pub base_url: String,

    /// Request timeout in seconds for completions.
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for the 1-token availability probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Seconds a probe result is reused before re-probing.
    #[serde(default = "default_probe_ttl_secs")]
    pub probe_ttl_secs: u64,
}

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_timeout_secs() -> u64 {
    120
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_probe_ttl_secs() -> u64 {
    300 // 5 minutes
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            timeout_secs: default_local_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_ttl_secs: default_probe_ttl_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl RouterSettings {
    /// Default settings file path (~/.canopy/router.json).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".canopy")
            .join("router.json")
    }

    /// Load settings from the default path with env overrides applied.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from a specific path, falling back to defaults when the
    /// file is missing or malformed, then apply env overrides.
    pub fn load_from(path: &Path) -> Self {
        dotenvy::dotenv().ok();

        let mut settings = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Malformed router settings, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        settings.apply_env();
        settings
    }

    /// Overlay CANOPY_* environment variables onto the loaded settings.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("CANOPY_CLOUD_API_KEY") {
            if !key.is_empty() {
                self.cloud.api_key = Some(SecretString::from(key));
            }
        }
        if let Ok(url) = std::env::var("CANOPY_CLOUD_BASE_URL") {
            if !url.is_empty() {
                self.cloud.base_url = url;
            }
        }
        if let Ok(url) = std::env::var("CANOPY_LOCAL_BASE_URL") {
            if !url.is_empty() {
                self.local.base_url = url;
            }
        }
        if let Ok(est) = std::env::var("CANOPY_ESTIMATOR") {
            match est.parse() {
                Ok(parsed) => self.selection.estimator = parsed,
                Err(e) => tracing::warn!("Ignoring CANOPY_ESTIMATOR: {}", e),
            }
        }
    }
}
