//! Prompt complexity estimation.
//!
//! Two estimators, both returning a score in [0, 1]:
//!
//! - **Lexical**: weighted blend of lexical diversity, average word length,
//!   and prompt length. Pure arithmetic, no keyword tables.
//! - **Keyword**: the lexical blend plus bounded increments for reasoning
//!   verbs, technical ESG vocabulary, multi-step request phrasing, and
//!   question density, capped at 1.0.
//!
//! A router instance picks one estimator at construction and uses it for
//! every request; scores from the two estimators are not comparable.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Estimator;

/// Verbs that ask the model to reason rather than recall.
static REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "evaluate",
    "explain why",
    "justify",
    "derive",
    "assess",
    "recommend",
    "forecast",
    "step by step",
];

/// Technical ESG reporting vocabulary.
static ESG_KEYWORDS: &[&str] = &[
    "emissions",
    "scope 1",
    "scope 2",
    "scope 3",
    "ghg",
    "decarbonization",
    "materiality",
    "biodiversity",
    "governance",
    "csrd",
    "esrs",
    "gri",
    "taxonomy",
    "net zero",
    "renewable",
];

/// Phrasings that signal a multi-step request.
static MULTI_STEP_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)first.*then").unwrap(),
        Regex::new(r"(?i)step \d").unwrap(),
        Regex::new(r"\d\.\s").unwrap(),
    ]
});

/// Count keyword matches in lowercased text.
fn count_matches(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

/// Complexity scorer for one router instance.
#[derive(Debug, Clone, Copy)]
pub struct ComplexityScorer {
    estimator: Estimator,
}

impl ComplexityScorer {
    pub fn new(estimator: Estimator) -> Self {
        Self { estimator }
    }

    /// Estimate prompt complexity in [0, 1]. Empty prompts score 0 even
    /// though the validator rejects them upstream.
    pub fn score(&self, prompt: &str) -> f64 {
        match self.estimator {
            Estimator::Lexical => lexical_score(prompt),
            Estimator::Keyword => keyword_score(prompt),
        }
    }
}

/// Lexical blend: 0.4·diversity + 0.3·word-length factor + 0.3·length factor.
fn lexical_score(prompt: &str) -> f64 {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let unique: HashSet<String> = words.iter().map(|w| w.to_lowercase()).collect();
    let lexical_diversity = unique.len() as f64 / words.len() as f64;

    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_length = total_chars as f64 / words.len() as f64;

    let length_factor = (prompt.chars().count() as f64 / 500.0).min(1.0);
    let word_length_factor = (avg_word_length / 8.0).min(1.0);

    0.4 * lexical_diversity + 0.3 * word_length_factor + 0.3 * length_factor
}

/// Lexical base plus bounded keyword/question increments, capped at 1.0.
fn keyword_score(prompt: &str) -> f64 {
    let base = lexical_score(prompt);
    if base == 0.0 {
        return 0.0;
    }

    let lowered = prompt.to_lowercase();

    let reasoning = (count_matches(&lowered, REASONING_KEYWORDS) as f64 * 0.05).min(0.15);
    let technical = (count_matches(&lowered, ESG_KEYWORDS) as f64 * 0.05).min(0.15);

    let multi_step = if MULTI_STEP_RE.iter().any(|re| re.is_match(&lowered)) {
        0.1
    } else {
        0.0
    };

    let questions = (lowered.matches('?').count() as f64 * 0.05).min(0.1);

    (base + reasoning + technical + multi_step + questions).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical() -> ComplexityScorer {
        ComplexityScorer::new(Estimator::Lexical)
    }

    fn keyword() -> ComplexityScorer {
        ComplexityScorer::new(Estimator::Keyword)
    }

    #[test]
    fn empty_prompt_scores_zero() {
        assert_eq!(lexical().score(""), 0.0);
        assert_eq!(keyword().score(""), 0.0);
        assert_eq!(lexical().score("   \t "), 0.0);
    }

    #[test]
    fn lexical_formula_is_exact() {
        // "hi": diversity 1.0, avg word length 2, prompt length 2.
        // 0.4*1.0 + 0.3*(2/8) + 0.3*(2/500) = 0.4762
        let score = lexical().score("hi");
        assert!((score - 0.4762).abs() < 1e-6, "got {}", score);
    }

    #[test]
    fn lexical_is_deterministic() {
        let prompt = "compare our scope 2 emissions against last year and explain the variance";
        let a = lexical().score(prompt);
        let b = lexical().score(prompt);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn repeated_words_lower_diversity() {
        let varied = lexical().score("alpha beta gamma delta");
        let repeated = lexical().score("alpha alpha alpha alpha");
        assert!(varied > repeated);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let long = "decarbonization ".repeat(100);
        for scorer in [lexical(), keyword()] {
            let score = scorer.score(&long);
            assert!((0.0..=1.0).contains(&score), "got {}", score);
        }
    }

    #[test]
    fn keyword_estimator_rewards_esg_vocabulary() {
        let prompt = "analyze scope 3 emissions and evaluate our decarbonization roadmap";
        assert!(keyword().score(prompt) > lexical().score(prompt));
    }

    #[test]
    fn keyword_increments_are_bounded() {
        // Saturate every keyword list; the score must still cap at 1.0.
        let prompt = "analyze compare evaluate justify derive assess recommend forecast \
                      emissions ghg decarbonization materiality biodiversity governance \
                      first do this then that step 1 step 2 ? ? ? ? ?";
        assert!(keyword().score(prompt) <= 1.0);
    }

    #[test]
    fn question_density_adds_increment() {
        let flat = keyword().score("summarize the governance report");
        let curious = keyword().score("summarize the governance report? why? how?");
        assert!(curious > flat);
    }
}
