//! Several rules applied to one question and folded into a single detail.
//!
//! Every sub-rule is retargeted at the composite's question before dispatch, so a sub-rule
//! authored against another id still grades the composite's answer. Sub-rules that do not
//! apply are skipped rather than counted as zero.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{CompositeMode, CompositeRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

pub struct CompositeEvaluator;

impl RuleEvaluator for CompositeEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Composite
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Composite(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };

        let mut results: Vec<(f64, GradeDetail)> = Vec::new();
        for (i, sub) in rule.rules.iter().enumerate() {
            let sub = sub.with_question_id(&rule.question_id);
            let weight = rule.weight(i);
            results.extend(
                registry
                    .evaluate(&sub, submission)?
                    .into_details()
                    .into_iter()
                    .map(|detail| (weight, detail)),
            );
        }
        if results.is_empty() {
            return Err(MarkerError::Evaluation(
                "No valid sub-rule results for CompositeRule".to_string(),
            ));
        }

        Ok(Evaluation::Single(combine(rule, submission, &results)))
    }
}

/// Folds weighted sub-results into `(points, max_points, is_correct)`.
fn aggregate(mode: CompositeMode, results: &[(f64, GradeDetail)]) -> (f64, f64, bool) {
    let details = results.iter().map(|(_, d)| d);
    let all_correct = results.iter().all(|(_, d)| d.is_correct);
    match mode {
        CompositeMode::Max | CompositeMode::Min => {
            let pick = details
                .reduce(|chosen, d| {
                    let better = match mode {
                        CompositeMode::Max => d.points_awarded > chosen.points_awarded,
                        _ => d.points_awarded < chosen.points_awarded,
                    };
                    if better { d } else { chosen }
                });
            match pick {
                Some(d) => (d.points_awarded, d.max_points, d.is_correct),
                None => (0.0, 0.0, false),
            }
        }
        CompositeMode::Sum => (
            details.clone().map(|d| d.points_awarded).sum(),
            details.map(|d| d.max_points).sum(),
            all_correct,
        ),
        CompositeMode::Average => {
            let n = results.len() as f64;
            (
                details.clone().map(|d| d.points_awarded).sum::<f64>() / n,
                details.map(|d| d.max_points).sum::<f64>() / n,
                all_correct,
            )
        }
        CompositeMode::Multiply => (
            details.clone().map(|d| d.points_awarded).product(),
            details.map(|d| d.max_points).product(),
            all_correct,
        ),
        CompositeMode::Weighted => (
            results.iter().map(|(w, d)| w * d.points_awarded).sum(),
            results.iter().map(|(w, d)| w * d.max_points).sum(),
            all_correct,
        ),
    }
}

fn combine(rule: &CompositeRule, submission: &Submission, results: &[(f64, GradeDetail)]) -> GradeDetail {
    let (points_awarded, max_points, is_correct) = aggregate(rule.mode, results);

    let passed = results.iter().filter(|(_, d)| d.is_correct).count();
    let feedback = format!(
        "Composite ({}) of {} sub-rules - {passed}/{} sub-rules passed",
        rule.mode.to_string().to_uppercase(),
        results.len(),
        results.len()
    );

    let correct_answers: Vec<&str> = results
        .iter()
        .filter_map(|(_, d)| d.correct_answer.as_deref())
        .collect();
    let tags: Vec<&str> = results
        .iter()
        .filter_map(|(_, d)| d.rule_applied.as_deref())
        .collect();

    tracing::debug!(
        question_id = %rule.question_id,
        mode = %rule.mode,
        points_awarded,
        max_points,
        "Composite rule aggregated"
    );

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(submission.answer(&rule.question_id).to_string()),
        correct_answer: (!correct_answers.is_empty()).then(|| correct_answers.join(", ")),
        points_awarded,
        max_points,
        is_correct,
        rule_applied: (!tags.is_empty()).then(|| format!("{}: {}", rule.mode, tags.join(", "))),
        feedback: Some(feedback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::test_support::{exact, registry};
    use crate::rules::{KeywordMode, KeywordRule, TextConfig};

    fn keyword(max_points: f64) -> Rule {
        Rule::Keyword(KeywordRule {
            question_id: "other".into(),
            max_points,
            keywords: vec!["paris".into(), "france".into()],
            mode: KeywordMode::Partial,
            config: TextConfig::default(),
        })
    }

    fn composite(mode: CompositeMode, weights: Option<Vec<f64>>) -> Rule {
        Rule::Composite(CompositeRule {
            question_id: "q1".into(),
            rules: vec![exact("elsewhere", "Paris", 5.0), keyword(4.0)],
            mode,
            weights,
        })
    }

    fn grade(rule: &Rule, answer: &str) -> GradeDetail {
        registry()
            .evaluate(rule, &Submission::new("s1", [("q1", answer)]))
            .unwrap()
            .into_first()
            .unwrap()
    }

    #[test]
    fn test_sum_retargets_sub_rules() {
        let detail = grade(&composite(CompositeMode::Sum, None), "Paris");
        assert_eq!(detail.points_awarded, 7.0);
        assert_eq!(detail.max_points, 9.0);
        assert!(!detail.is_correct);
        assert_eq!(detail.question_id, "q1");
        assert_eq!(
            detail.feedback.as_deref(),
            Some("Composite (SUM) of 2 sub-rules - 1/2 sub-rules passed")
        );
        assert_eq!(
            detail.rule_applied.as_deref(),
            Some("sum: EXACT_MATCH, KEYWORD")
        );
        assert_eq!(
            detail.correct_answer.as_deref(),
            Some("Paris, Keywords: paris, france")
        );
    }

    #[test]
    fn test_max_and_min_pick_extremes() {
        let detail = grade(&composite(CompositeMode::Max, None), "Paris");
        assert_eq!((detail.points_awarded, detail.max_points), (5.0, 5.0));
        assert!(detail.is_correct);

        let detail = grade(&composite(CompositeMode::Min, None), "Paris");
        assert_eq!((detail.points_awarded, detail.max_points), (2.0, 4.0));
        assert!(!detail.is_correct);
    }

    #[test]
    fn test_max_tie_keeps_first() {
        let rule = Rule::Composite(CompositeRule {
            question_id: "q1".into(),
            rules: vec![exact("q1", "a", 2.0), exact("q1", "b", 3.0)],
            mode: CompositeMode::Max,
            weights: None,
        });
        let detail = grade(&rule, "c");
        assert_eq!(detail.points_awarded, 0.0);
        assert_eq!(detail.max_points, 2.0);
    }

    #[test]
    fn test_average_multiply_weighted() {
        let detail = grade(&composite(CompositeMode::Average, None), "Paris");
        assert_eq!((detail.points_awarded, detail.max_points), (3.5, 4.5));
        assert!(!detail.is_correct);

        let detail = grade(&composite(CompositeMode::Multiply, None), "Paris");
        assert_eq!((detail.points_awarded, detail.max_points), (10.0, 20.0));

        let detail = grade(
            &composite(CompositeMode::Weighted, Some(vec![0.5, 0.5])),
            "Paris",
        );
        assert_eq!((detail.points_awarded, detail.max_points), (3.5, 4.5));
    }
}
