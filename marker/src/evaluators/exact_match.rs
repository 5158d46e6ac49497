//! Full points when the answer equals the expected answer after trimming and case folding.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{ExactMatchRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

pub struct ExactMatchEvaluator;

impl RuleEvaluator for ExactMatchEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::ExactMatch
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::ExactMatch(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_exact_match(rule, submission)))
    }
}

pub fn grade_exact_match(rule: &ExactMatchRule, submission: &Submission) -> GradeDetail {
    let raw = submission.answer(&rule.question_id);
    let (student, correct) = if rule.trim_whitespace {
        (raw.trim(), rule.correct_answer.trim())
    } else {
        (raw, rule.correct_answer.as_str())
    };
    let is_correct = if rule.case_sensitive {
        student == correct
    } else {
        student.to_lowercase() == correct.to_lowercase()
    };

    tracing::debug!(
        question_id = %rule.question_id,
        is_correct,
        "Exact match evaluated"
    );

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(student.to_string()),
        correct_answer: Some(rule.correct_answer.clone()),
        points_awarded: if is_correct { rule.max_points } else { 0.0 },
        max_points: rule.max_points,
        is_correct,
        rule_applied: Some(RuleKind::ExactMatch.tag().to_string()),
        feedback: Some(if is_correct {
            "✓ Correct".to_string()
        } else {
            format!("✗ Expected: {}", rule.correct_answer)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(case_sensitive: bool, trim_whitespace: bool) -> ExactMatchRule {
        ExactMatchRule {
            question_id: "q1".into(),
            correct_answer: "Paris".into(),
            max_points: 10.0,
            case_sensitive,
            trim_whitespace,
            description: None,
        }
    }

    #[test]
    fn test_match_ignores_case_and_padding_by_default() {
        let submission = Submission::new("alice", [("q1", "  paris ")]);
        let detail = grade_exact_match(&rule(false, true), &submission);
        assert!(detail.is_correct);
        assert_eq!(detail.points_awarded, 10.0);
        assert_eq!(detail.student_answer.as_deref(), Some("paris"));
        assert_eq!(detail.feedback.as_deref(), Some("✓ Correct"));
        assert_eq!(detail.rule_applied.as_deref(), Some("EXACT_MATCH"));
    }

    #[test]
    fn test_strict_comparison() {
        let submission = Submission::new("bob", [("q1", "paris")]);
        let detail = grade_exact_match(&rule(true, true), &submission);
        assert!(!detail.is_correct);
        assert_eq!(detail.points_awarded, 0.0);
        assert_eq!(detail.feedback.as_deref(), Some("✗ Expected: Paris"));

        let submission = Submission::new("bob", [("q1", "Paris ")]);
        assert!(!grade_exact_match(&rule(true, false), &submission).is_correct);
    }

    #[test]
    fn test_missing_answer_scores_zero() {
        let detail = grade_exact_match(&rule(false, true), &Submission::new("eve", [("q2", "x")]));
        assert_eq!(detail.points_awarded, 0.0);
        assert_eq!(detail.student_answer.as_deref(), Some(""));
    }
}
