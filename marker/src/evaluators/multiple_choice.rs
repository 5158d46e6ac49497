//! Compares the set of selected options with the expected set.

use std::collections::BTreeSet;

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{ChoiceMode, MultipleChoiceRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};
use crate::utilities::text::preprocess;

use super::mismatch;

pub struct MultipleChoiceEvaluator;

impl RuleEvaluator for MultipleChoiceEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::MultipleChoice
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::MultipleChoice(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_multiple_choice(rule, submission)))
    }
}

pub fn grade_multiple_choice(rule: &MultipleChoiceRule, submission: &Submission) -> GradeDetail {
    let text = rule.config.text();
    let raw = submission.answer(&rule.question_id);

    let selected: BTreeSet<String> = raw
        .split(rule.config.delimiter.as_str())
        .map(|choice| preprocess(choice, &text))
        .filter(|choice| !choice.trim().is_empty())
        .collect();
    let expected: BTreeSet<String> = rule
        .answers
        .iter()
        .map(|answer| preprocess(answer, &text))
        .collect();

    let matched = selected.intersection(&expected).count();
    let exact = selected == expected;
    let expected_display = rule.answers.join(", ");

    let (points_awarded, feedback) = match rule.mode {
        ChoiceMode::All if exact => (rule.max_points, "✓ Correct".to_string()),
        ChoiceMode::All => (0.0, format!("✗ Expected: {expected_display}")),
        ChoiceMode::Partial => (
            matched as f64 / expected.len().max(1) as f64 * rule.max_points,
            format!("Matched {matched}/{} correct choices", expected.len()),
        ),
    };

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(raw.trim().to_string()),
        correct_answer: Some(expected_display),
        points_awarded,
        max_points: rule.max_points,
        is_correct: exact,
        rule_applied: Some(RuleKind::MultipleChoice.tag().to_string()),
        feedback: Some(feedback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ChoiceConfig;

    fn rule(mode: ChoiceMode) -> MultipleChoiceRule {
        MultipleChoiceRule {
            question_id: "q1".into(),
            max_points: 3.0,
            answers: vec!["A".into(), "C".into(), "D".into()],
            mode,
            config: ChoiceConfig::default(),
        }
    }

    fn grade(mode: ChoiceMode, answer: &str) -> GradeDetail {
        grade_multiple_choice(&rule(mode), &Submission::new("s", [("q1", answer)]))
    }

    #[test]
    fn test_all_mode_needs_exact_set() {
        let detail = grade(ChoiceMode::All, "d, a,c");
        assert!(detail.is_correct);
        assert_eq!(detail.points_awarded, 3.0);

        let detail = grade(ChoiceMode::All, "A,C");
        assert!(!detail.is_correct);
        assert_eq!(detail.points_awarded, 0.0);
        assert_eq!(detail.feedback.as_deref(), Some("✗ Expected: A, C, D"));
    }

    #[test]
    fn test_partial_mode_is_proportional() {
        let detail = grade(ChoiceMode::Partial, "A, C");
        assert_eq!(detail.points_awarded, 2.0);
        assert!(!detail.is_correct);
        assert_eq!(
            detail.feedback.as_deref(),
            Some("Matched 2/3 correct choices")
        );
    }

    #[test]
    fn test_empty_choices_are_dropped() {
        let detail = grade(ChoiceMode::Partial, ",,A,, ");
        assert_eq!(detail.points_awarded, 1.0);
    }

    #[test]
    fn test_custom_delimiter() {
        let mut rule = rule(ChoiceMode::All);
        rule.config.delimiter = ";".into();
        let detail = grade_multiple_choice(&rule, &Submission::new("s", [("q1", "A;C;D")]));
        assert!(detail.is_correct);
    }
}
