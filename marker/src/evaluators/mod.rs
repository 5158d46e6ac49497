//! # Evaluators
//!
//! One [`RuleEvaluator`](crate::traits::evaluator::RuleEvaluator) per rule type. Leaf evaluators
//! compare a single answer; [`composite`], [`conditional`] and [`assumption_set`] dispatch their
//! sub-rules back through the registry and fold the results.

pub mod assumption_set;
pub mod composite;
pub mod conditional;
pub mod exact_match;
pub mod keyword;
pub mod length;
pub mod multiple_choice;
pub mod numeric_range;
pub mod programmable;
pub mod regex;
pub mod similarity;

pub use assumption_set::AssumptionSetEvaluator;
pub use composite::CompositeEvaluator;
pub use conditional::ConditionalEvaluator;
pub use exact_match::ExactMatchEvaluator;
pub use keyword::KeywordEvaluator;
pub use length::LengthEvaluator;
pub use multiple_choice::MultipleChoiceEvaluator;
pub use numeric_range::NumericRangeEvaluator;
pub use programmable::ProgrammableEvaluator;
pub use regex::RegexEvaluator;
pub use similarity::SimilarityEvaluator;

use crate::error::MarkerError;
use crate::rules::{Rule, RuleKind};

pub(crate) fn mismatch(expected: RuleKind, rule: &Rule) -> MarkerError {
    MarkerError::RuleMismatch {
        expected: expected.to_string(),
        found: rule.tag().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use script_runner::{ExecutionConfig, HostEnvironment, ScriptRunner};

    use crate::registry::RuleRegistry;
    use crate::rules::{ExactMatchRule, Rule};

    /// Script runner for unit tests. The process-wide ceiling stays off so
    /// concurrently running tests are unaffected.
    pub fn runner() -> ScriptRunner {
        ScriptRunner::new(
            ExecutionConfig {
                address_space_limit: false,
                ..ExecutionConfig::default()
            },
            HostEnvironment::bare_metal(),
        )
    }

    pub fn registry() -> RuleRegistry {
        RuleRegistry::standard(runner())
    }

    pub fn exact(question_id: &str, answer: &str, max_points: f64) -> Rule {
        Rule::ExactMatch(ExactMatchRule {
            question_id: question_id.into(),
            correct_answer: answer.into(),
            max_points,
            case_sensitive: false,
            trim_whitespace: true,
            description: None,
        })
    }
}
