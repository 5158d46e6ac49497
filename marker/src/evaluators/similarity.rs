//! Fuzzy matching against reference answers.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{Rule, RuleKind, SimilarityRule, TextConfig};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};
use crate::utilities::similarity::similarity;
use crate::utilities::text::{percent, preprocess};

use super::mismatch;

/// Similarity at or above which a passing answer also counts as correct.
pub const CORRECT_SIMILARITY: f64 = 0.95;

pub struct SimilarityEvaluator;

impl RuleEvaluator for SimilarityEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Similarity
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Similarity(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_similarity(rule, submission)))
    }
}

pub fn grade_similarity(rule: &SimilarityRule, submission: &Submission) -> GradeDetail {
    let config = TextConfig {
        ignore_case: !rule.case_sensitive,
        trim_whitespace: true,
    };
    let raw = submission.answer(&rule.question_id);
    let answer = preprocess(raw, &config);

    let mut best: Option<(f64, &String)> = None;
    for reference in &rule.reference_answers {
        let score = similarity(&answer, &preprocess(reference, &config), rule.algorithm);
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, reference));
        }
    }
    let (score, reference) = match best {
        Some((score, reference)) => (score, Some(reference.clone())),
        None => (0.0, None),
    };

    let passed = score >= rule.threshold;
    tracing::debug!(
        question_id = %rule.question_id,
        algorithm = %rule.algorithm,
        score,
        threshold = rule.threshold,
        "Similarity evaluated"
    );

    let feedback = if passed {
        format!(
            "✓ Match: {} (threshold: {})",
            percent(score),
            percent(rule.threshold)
        )
    } else {
        format!(
            "✗ Insufficient similarity: {} < {}",
            percent(score),
            percent(rule.threshold)
        )
    };

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(raw.to_string()),
        correct_answer: reference,
        points_awarded: if passed { rule.max_points } else { 0.0 },
        max_points: rule.max_points,
        is_correct: passed && score >= CORRECT_SIMILARITY,
        rule_applied: Some(RuleKind::Similarity.tag().to_string()),
        feedback: Some(feedback),
    }
}
