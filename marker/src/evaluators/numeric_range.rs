//! Full points when a numeric answer lies inside an inclusive range.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{NumericRangeRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

pub struct NumericRangeEvaluator;

impl RuleEvaluator for NumericRangeEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::NumericRange
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::NumericRange(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_numeric_range(rule, submission)))
    }
}

/// Parses a numeric answer, accepting `,` thousands separators.
fn parse_number(answer: &str) -> Option<f64> {
    answer
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
}

pub fn grade_numeric_range(rule: &NumericRangeRule, submission: &Submission) -> GradeDetail {
    let raw = submission.answer(&rule.question_id);
    let answer = raw.trim();
    let range = format!("[{}, {}]", rule.min_value, rule.max_value);

    let (is_correct, feedback) = if answer.is_empty() {
        (false, "✗ No answer provided".to_string())
    } else {
        match parse_number(answer) {
            None => (false, "✗ Invalid numeric value".to_string()),
            Some(value) if value < rule.min_value => (
                false,
                format!("✗ Below minimum (difference: {:.2})", rule.min_value - value),
            ),
            Some(value) if value > rule.max_value => (
                false,
                format!("✗ Above maximum (difference: {:.2})", value - rule.max_value),
            ),
            Some(_) => (true, format!("✓ Within acceptable range {range}")),
        }
    };

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(if answer.is_empty() { raw } else { answer }.to_string()),
        correct_answer: Some(range),
        points_awarded: if is_correct { rule.max_points } else { 0.0 },
        max_points: rule.max_points,
        is_correct,
        rule_applied: Some(RuleKind::NumericRange.tag().to_string()),
        feedback: Some(feedback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> NumericRangeRule {
        NumericRangeRule {
            question_id: "q1".into(),
            max_points: 4.0,
            min_value: 9.5,
            max_value: 10.5,
        }
    }

    fn grade(answer: &str) -> GradeDetail {
        grade_numeric_range(&rule(), &Submission::new("s", [("q1", answer)]))
    }

    #[test]
    fn test_inclusive_bounds() {
        assert!(grade("9.5").is_correct);
        assert!(grade(" 10.5 ").is_correct);
        let detail = grade("10");
        assert_eq!(detail.points_awarded, 4.0);
        assert_eq!(
            detail.feedback.as_deref(),
            Some("✓ Within acceptable range [9.5, 10.5]")
        );
    }

    #[test]
    fn test_outside_range_reports_difference() {
        assert_eq!(
            grade("9").feedback.as_deref(),
            Some("✗ Below minimum (difference: 0.50)")
        );
        assert_eq!(
            grade("12").feedback.as_deref(),
            Some("✗ Above maximum (difference: 1.50)")
        );
    }

    #[test]
    fn test_unparseable_and_missing() {
        assert_eq!(grade("ten").feedback.as_deref(), Some("✗ Invalid numeric value"));
        assert_eq!(grade("NaN").feedback.as_deref(), Some("✗ Invalid numeric value"));
        assert_eq!(grade("   ").feedback.as_deref(), Some("✗ No answer provided"));
    }

    #[test]
    fn test_thousands_separators() {
        let rule = NumericRangeRule {
            question_id: "q1".into(),
            max_points: 1.0,
            min_value: 1000.0,
            max_value: 2000.0,
        };
        let detail = grade_numeric_range(&rule, &Submission::new("s", [("q1", "1,500")]));
        assert!(detail.is_correct);
    }
}
