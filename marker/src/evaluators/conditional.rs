use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{ConditionMode, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::Submission;

use super::mismatch;

pub struct ConditionalEvaluator;

impl RuleEvaluator for ConditionalEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Conditional
    }

    /// Grades the consequence rules only when the guards hold. A failed guard makes the whole
    /// rule [`Evaluation::NotApplicable`], so it adds neither points nor max points.
    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Conditional(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        // Rules can reach the registry without going through rubric validation.
        rule.validate().map_err(MarkerError::Validation)?;

        let mut guards = Vec::with_capacity(rule.if_rules.len());
        for guard in &rule.if_rules {
            guards.push(registry.evaluate(guard, submission)?.passed());
        }
        let condition_met = match rule.if_aggregation {
            ConditionMode::And => !guards.is_empty() && guards.iter().all(|g| *g),
            ConditionMode::Or => guards.iter().any(|g| *g),
        };

        if !condition_met {
            tracing::debug!(
                student_id = %submission.student_id,
                mode = %rule.if_aggregation,
                ?guards,
                "Condition not met, skipping consequences"
            );
            return Ok(Evaluation::NotApplicable);
        }

        let mut details = Vec::new();
        for consequence in &rule.then_rules {
            details.extend(registry.evaluate(consequence, submission)?.into_details());
        }
        Ok(Evaluation::from_details(details))
    }
}
