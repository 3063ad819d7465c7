//! Prompt validation.
//!
//! Runs before any cache lookup or model invocation, so rejected prompts
//! never consume a completion call and never populate the cache. Matching
//! is case-insensitive substring over a configured restricted-term list.

use crate::config::ValidationSettings;
use crate::error::RouterError;

/// Validates prompts against the configured content policy.
#[derive(Debug, Clone)]
pub struct PromptValidator {
    /// Lowercased at construction so each check is a plain substring scan.
    restricted_terms: Vec<String>,
}

impl PromptValidator {
    pub fn new(settings: &ValidationSettings) -> Self {
        Self {
            restricted_terms: settings
                .restricted_terms
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// Check a prompt. `Ok(())` means the prompt may proceed to routing.
    ///
    /// No side effects; the caller is responsible for audit-logging
    /// rejections.
    pub fn validate(&self, prompt: &str) -> Result<(), RouterError> {
        if prompt.trim().is_empty() {
            return Err(RouterError::EmptyPrompt);
        }

        let lowered = prompt.to_lowercase();
        for term in &self.restricted_terms {
            if lowered.contains(term.as_str()) {
                return Err(RouterError::RestrictedContent { term: term.clone() });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PromptValidator {
        PromptValidator::new(&ValidationSettings::default())
    }

    #[test]
    fn empty_prompt_rejected() {
        assert!(matches!(
            validator().validate(""),
            Err(RouterError::EmptyPrompt)
        ));
    }

    #[test]
    fn whitespace_only_prompt_rejected() {
        assert!(matches!(
            validator().validate("   \n\t  "),
            Err(RouterError::EmptyPrompt)
        ));
    }

    #[test]
    fn restricted_term_rejected_case_insensitive() {
        let err = validator()
            .validate("what is my PassWord for the portal")
            .unwrap_err();
        match err {
            RouterError::RestrictedContent { term } => assert_eq!(term, "password"),
            other => panic!("expected RestrictedContent, got {:?}", other),
        }
    }

    #[test]
    fn restricted_term_matches_as_substring() {
        let settings = ValidationSettings {
            restricted_terms: vec!["ssn".to_string()],
        };
        let validator = PromptValidator::new(&settings);
        assert!(validator.validate("look up the SSNs on file").is_err());
    }

    #[test]
    fn clean_prompt_allowed() {
        assert!(
            validator()
                .validate("summarize our scope 2 emissions for Q3")
                .is_ok()
        );
    }
}
