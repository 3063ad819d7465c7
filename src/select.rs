//! Model selection.
//!
//! A fixed-precedence rule table decides which backend serves a prompt.
//! Each rule is a typed predicate + outcome pair; the first rule that
//! matches wins, and the final rule always matches, so every request gets a
//! decision. Selection is async only because two rules consult the cached
//! local-availability probe.

use std::sync::Arc;

use crate::complexity::ComplexityScorer;
use crate::config::{ModelSettings, SelectionSettings};
use crate::health::{AvailabilityProbe, FailureTracker};
use crate::session::SessionContext;

/// The decision's audit trail. Embedded in logs, never persisted alone.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub model: String,
    pub reason: String,
    pub use_local: bool,
}

/// Everything a selection depends on for one request.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    pub prompt: &'a str,
    pub user_role: &'a str,
    pub requested_model: Option<&'a str>,
    pub manual_override: bool,
    pub context: Option<&'a SessionContext>,
}

/// The routing rules in precedence order. Order is load-bearing: a manual
/// override beats the failure fallback, which beats priority roles, and so
/// on down to the standard-model default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionRule {
    ManualOverride,
    FailureFallback,
    PriorityRole,
    LocalHybrid,
    MultiTurn,
    LongOrComplex,
    Standard,
}

const PRECEDENCE: [SelectionRule; 7] = [
    SelectionRule::ManualOverride,
    SelectionRule::FailureFallback,
    SelectionRule::PriorityRole,
    SelectionRule::LocalHybrid,
    SelectionRule::MultiTurn,
    SelectionRule::LongOrComplex,
    SelectionRule::Standard,
];

/// Decision engine mapping a prompt + caller context to a backend model.
pub struct ModelSelector {
    settings: SelectionSettings,
    models: ModelSettings,
    scorer: ComplexityScorer,
    failures: Arc<FailureTracker>,
    probe: Arc<AvailabilityProbe>,
}

impl ModelSelector {
    pub fn new(
        settings: SelectionSettings,
        models: ModelSettings,
        failures: Arc<FailureTracker>,
        probe: Arc<AvailabilityProbe>,
    ) -> Self {
        let scorer = ComplexityScorer::new(settings.estimator);
        Self {
            settings,
            models,
            scorer,
            failures,
            probe,
        }
    }

    /// Complexity of a prompt under this instance's estimator.
    pub fn complexity(&self, prompt: &str) -> f64 {
        self.scorer.score(prompt)
    }

    /// Pick a model for this request. First matching rule wins.
    pub async fn select(&self, input: SelectionInput<'_>) -> ModelSelection {
        let complexity = self.scorer.score(input.prompt);

        for rule in PRECEDENCE {
            if let Some(selection) = self.apply(rule, &input, complexity).await {
                tracing::debug!(
                    rule = ?rule,
                    model = %selection.model,
                    use_local = selection.use_local,
                    complexity,
                    reason = %selection.reason,
                    "Model selected"
                );
                return selection;
            }
        }

        // PRECEDENCE ends with Standard, which always matches.
        unreachable!("selection rule table must produce a decision")
    }

    async fn apply(
        &self,
        rule: SelectionRule,
        input: &SelectionInput<'_>,
        complexity: f64,
    ) -> Option<ModelSelection> {
        match rule {
            SelectionRule::ManualOverride => {
                let requested = input.requested_model.filter(|_| input.manual_override)?;
                Some(ModelSelection {
                    model: requested.to_string(),
                    reason: "Manual override".to_string(),
                    use_local: requested == self.models.local,
                })
            }

            SelectionRule::FailureFallback => {
                if self.failures.count() < self.settings.fallback_threshold {
                    return None;
                }
                if !self.probe.is_available().await {
                    return None;
                }
                Some(ModelSelection {
                    model: self.models.local.clone(),
                    reason: "API fallback threshold reached".to_string(),
                    use_local: true,
                })
            }

            SelectionRule::PriorityRole => {
                if !self
                    .settings
                    .priority_roles
                    .iter()
                    .any(|r| r == input.user_role)
                {
                    return None;
                }
                Some(ModelSelection {
                    model: self.models.advanced.clone(),
                    reason: "Priority user".to_string(),
                    use_local: false,
                })
            }

            SelectionRule::LocalHybrid => {
                if !self.settings.hybrid_local
                    || complexity > self.settings.local_complexity_threshold
                {
                    return None;
                }
                if !self.probe.is_available().await {
                    return None;
                }
                Some(ModelSelection {
                    model: self.models.local.clone(),
                    reason: format!("Low complexity ({:.2}) handled locally", complexity),
                    use_local: true,
                })
            }

            SelectionRule::MultiTurn => {
                let turns = input.context.map(|c| c.turns.len()).unwrap_or(0);
                if turns <= self.settings.multi_turn_threshold {
                    return None;
                }
                Some(ModelSelection {
                    model: self.models.advanced.clone(),
                    reason: "Multi-turn conversation with significant context".to_string(),
                    use_local: false,
                })
            }

            SelectionRule::LongOrComplex => {
                let long = input.prompt.chars().count() > self.settings.long_prompt_threshold;
                let complex = complexity > self.settings.high_complexity_threshold;
                if !long && !complex {
                    return None;
                }
                Some(ModelSelection {
                    model: self.models.advanced.clone(),
                    reason: format!(
                        "High complexity ({:.2}) or long prompt routed to advanced model",
                        complexity
                    ),
                    use_local: false,
                })
            }

            SelectionRule::Standard => Some(ModelSelection {
                model: self.models.standard.clone(),
                reason: "Standard query".to_string(),
                use_local: false,
            }),
        }
    }
}
