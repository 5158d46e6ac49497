//! # Rule Registry
//!
//! Maps rule type tags to the evaluator that grades them. A registry is filled once before
//! grading starts and only read afterwards; registration mistakes surface as
//! [`MarkerError::Config`] at that point rather than while grading.

use std::collections::HashMap;
use std::sync::Arc;

use script_runner::ScriptRunner;

use crate::error::MarkerError;
use crate::evaluators::{
    AssumptionSetEvaluator, CompositeEvaluator, ConditionalEvaluator, ExactMatchEvaluator,
    KeywordEvaluator, LengthEvaluator, MultipleChoiceEvaluator, NumericRangeEvaluator,
    ProgrammableEvaluator, RegexEvaluator, SimilarityEvaluator,
};
use crate::rules::{Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

struct Registration {
    kind: RuleKind,
    evaluator: Arc<dyn RuleEvaluator>,
}

#[derive(Default)]
pub struct RuleRegistry {
    entries: HashMap<String, Registration>,
}

impl RuleRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with an evaluator for every built-in rule type.
    ///
    /// # Arguments
    ///
    /// * `runner` - Executes the scripts of programmable rules.
    pub fn standard(runner: ScriptRunner) -> Self {
        let evaluators: [Arc<dyn RuleEvaluator>; 11] = [
            Arc::new(ExactMatchEvaluator),
            Arc::new(NumericRangeEvaluator),
            Arc::new(MultipleChoiceEvaluator),
            Arc::new(LengthEvaluator),
            Arc::new(SimilarityEvaluator),
            Arc::new(KeywordEvaluator),
            Arc::new(RegexEvaluator),
            Arc::new(ProgrammableEvaluator::new(runner)),
            Arc::new(CompositeEvaluator),
            Arc::new(ConditionalEvaluator),
            Arc::new(AssumptionSetEvaluator),
        ];
        let mut registry = Self::empty();
        for evaluator in evaluators {
            let kind = evaluator.kind();
            registry
                .entries
                .insert(kind.tag().to_string(), Registration { kind, evaluator });
        }
        registry
    }

    /// Registers `evaluator` under `tag` for rules of type `kind`.
    ///
    /// # Errors
    ///
    /// [`MarkerError::Config`] when `tag` is already taken, when `tag` is not the tag of `kind`,
    /// or when the evaluator grades a different rule type than `kind`.
    pub fn register(
        &mut self,
        tag: &str,
        evaluator: Arc<dyn RuleEvaluator>,
        kind: RuleKind,
    ) -> Result<(), MarkerError> {
        if self.entries.contains_key(tag) {
            return Err(MarkerError::Config(format!(
                "Rule type '{tag}' is already registered"
            )));
        }
        if tag != kind.tag() {
            return Err(MarkerError::Config(format!(
                "Rule type '{tag}' cannot be registered for {kind} rules"
            )));
        }
        if evaluator.kind() != kind {
            return Err(MarkerError::Config(format!(
                "Evaluator for '{tag}' grades {} rules",
                evaluator.kind()
            )));
        }
        tracing::debug!(tag, "Registered rule evaluator");
        self.entries
            .insert(tag.to_string(), Registration { kind, evaluator });
        Ok(())
    }

    /// Removes the evaluator for `tag`, returning whether one was registered.
    pub fn unregister(&mut self, tag: &str) -> bool {
        self.entries.remove(tag).is_some()
    }

    /// Looks up the evaluator for `tag`.
    ///
    /// # Errors
    ///
    /// [`MarkerError::UnknownRuleType`] when nothing is registered under `tag`.
    pub fn dispatch(&self, tag: &str) -> Result<&dyn RuleEvaluator, MarkerError> {
        self.entries
            .get(tag)
            .map(|entry| entry.evaluator.as_ref())
            .ok_or_else(|| MarkerError::UnknownRuleType(tag.to_string()))
    }

    /// The rule type registered under `tag`.
    pub fn kind_of(&self, tag: &str) -> Option<RuleKind> {
        self.entries.get(tag).map(|entry| entry.kind)
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Dispatches `rule` to its evaluator. Points in the result are never negative.
    pub fn evaluate(&self, rule: &Rule, submission: &Submission) -> Result<Evaluation, MarkerError> {
        let evaluation = self
            .dispatch(rule.tag())?
            .evaluate(rule, submission, self)?;
        Ok(evaluation.map_details(GradeDetail::clamped))
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::test_support::registry as standard;
    use strum::IntoEnumIterator;

    struct NegativeEvaluator;

    impl RuleEvaluator for NegativeEvaluator {
        fn kind(&self) -> RuleKind {
            RuleKind::ExactMatch
        }

        fn evaluate(
            &self,
            _rule: &Rule,
            _submission: &Submission,
            _registry: &RuleRegistry,
        ) -> Result<Evaluation, MarkerError> {
            Ok(Evaluation::Single(GradeDetail {
                question_id: "q1".into(),
                points_awarded: -4.0,
                max_points: 1.0,
                ..GradeDetail::default()
            }))
        }
    }

    fn exact_rule() -> Rule {
        serde_json::from_str(
            r#"{"type": "EXACT_MATCH", "question_id": "q1", "correct_answer": "a", "max_points": 1}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_standard_registers_every_kind() {
        let registry = standard();
        for kind in RuleKind::iter() {
            assert!(registry.is_registered(kind.tag()), "{kind} missing");
            assert_eq!(registry.kind_of(kind.tag()), Some(kind));
            assert_eq!(registry.dispatch(kind.tag()).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_duplicate_registration_is_config_error() {
        let mut registry = standard();
        let err = registry
            .register("EXACT_MATCH", Arc::new(NegativeEvaluator), RuleKind::ExactMatch)
            .unwrap_err();
        assert!(matches!(err, MarkerError::Config(_)));
    }

    #[test]
    fn test_mismatched_registration_is_config_error() {
        let mut registry = RuleRegistry::empty();
        let err = registry
            .register("REGEX", Arc::new(NegativeEvaluator), RuleKind::ExactMatch)
            .unwrap_err();
        assert!(matches!(err, MarkerError::Config(_)));
        let err = registry
            .register("REGEX", Arc::new(NegativeEvaluator), RuleKind::Regex)
            .unwrap_err();
        assert!(matches!(err, MarkerError::Config(_)));
        assert!(registry.tags().is_empty());
    }

    #[test]
    fn test_unknown_tag() {
        let registry = RuleRegistry::empty();
        assert_eq!(
            registry.dispatch("EXACT_MATCH").err(),
            Some(MarkerError::UnknownRuleType("EXACT_MATCH".into()))
        );
    }

    #[test]
    fn test_evaluate_clamps_negative_points() {
        let mut registry = RuleRegistry::empty();
        registry
            .register("EXACT_MATCH", Arc::new(NegativeEvaluator), RuleKind::ExactMatch)
            .unwrap();
        let submission = Submission::new("s1", [("q1", "a")]);
        let detail = registry
            .evaluate(&exact_rule(), &submission)
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(detail.points_awarded, 0.0);
    }

    #[test]
    fn test_unregister() {
        let mut registry = standard();
        assert!(registry.unregister("REGEX"));
        assert!(!registry.unregister("REGEX"));
        assert!(!registry.is_registered("REGEX"));
    }
}
