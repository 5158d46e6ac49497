use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{LengthMode, LengthRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};
use crate::utilities::text::format_feedback;

use super::mismatch;

pub struct LengthEvaluator;

impl RuleEvaluator for LengthEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Length
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Length(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_length(rule, submission)))
    }
}

pub fn count(answer: &str, mode: LengthMode) -> usize {
    match mode {
        LengthMode::Characters => answer.chars().count(),
        LengthMode::Words => answer.split_whitespace().count(),
    }
}

fn violations(count: usize, min: Option<usize>, max: Option<usize>) -> Vec<String> {
    let mut found = Vec::new();
    if let Some(min) = min.filter(|min| count < *min) {
        found.push(format!("Too short ({count} < {min})"));
    }
    if let Some(max) = max.filter(|max| count > *max) {
        found.push(format!("Too long ({count} > {max})"));
    }
    found
}

fn bound(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// All-or-nothing length check in characters or words.
pub fn grade_length(rule: &LengthRule, submission: &Submission) -> GradeDetail {
    let answer = submission.answer(&rule.question_id);
    let actual = count(answer, rule.mode);
    let expected = format!(
        "{}..{} {}",
        bound(rule.min_length),
        bound(rule.max_length),
        rule.mode
    );
    let problems = violations(actual, rule.min_length, rule.max_length);
    let is_correct = problems.is_empty();

    let feedback = if is_correct {
        format_feedback(
            true,
            None,
            Some(&format!("Length constraints met (actual: {actual})")),
        )
    } else {
        format_feedback(
            false,
            Some(&expected),
            Some(&format!(
                "Length constraints violated: {} (actual: {actual})",
                problems.join("; ")
            )),
        )
    };

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(answer.to_string()),
        correct_answer: Some(format!("Length within {expected}")),
        points_awarded: if is_correct { rule.max_points } else { 0.0 },
        max_points: rule.max_points,
        is_correct,
        rule_applied: Some(RuleKind::Length.tag().to_string()),
        feedback: Some(feedback),
    }
}
