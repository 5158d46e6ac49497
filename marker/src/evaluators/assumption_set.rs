//! # Assumption Sets
//!
//! An ambiguous question may be read several ways. Each [`Assumption`] is one reading, graded
//! independently; the rule's mode then keeps the best or worst reading, or averages every
//! reading per question.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{Assumption, AssumptionMode, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

/// Points within this distance of the maximum count as correct when averaging.
const AVERAGE_EPSILON: f64 = 1e-9;

/// One assumption's graded details and their total.
#[derive(Debug, Clone, PartialEq)]
pub struct AssumptionResult {
    pub name: String,
    pub total: f64,
    pub details: Vec<GradeDetail>,
}

pub struct AssumptionSetEvaluator;

impl RuleEvaluator for AssumptionSetEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::AssumptionSet
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::AssumptionSet(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };

        let mut results = Vec::with_capacity(rule.assumptions.len());
        for assumption in &rule.assumptions {
            results.push(grade_assumption(assumption, submission, registry)?);
        }

        let details = match rule.mode {
            AssumptionMode::Best => pick(results, |candidate, chosen| candidate > chosen),
            AssumptionMode::Worst => pick(results, |candidate, chosen| candidate < chosen),
            AssumptionMode::Average => average(&results),
        };
        Ok(Evaluation::from_details(details))
    }
}

/// Grades every rule of one assumption, annotating each detail with the assumption's name.
///
/// # Errors
///
/// Any failure except an unregistered rule type, which is skipped.
pub fn grade_assumption(
    assumption: &Assumption,
    submission: &Submission,
    registry: &RuleRegistry,
) -> Result<AssumptionResult, MarkerError> {
    let note = format!("Graded using assumption: {}", assumption.name);
    let mut details = Vec::with_capacity(assumption.rules.len());

    for rule in &assumption.rules {
        let evaluation = match registry.evaluate(rule, submission) {
            Ok(evaluation) => evaluation,
            Err(MarkerError::UnknownRuleType(tag)) => {
                tracing::warn!(
                    assumption = %assumption.name,
                    tag = %tag,
                    "Skipping rule with no registered evaluator"
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        let detail = match evaluation.into_first() {
            Some(detail) => detail.with_feedback_note(&note),
            None => {
                let question_id = rule.question_id().unwrap_or_default();
                GradeDetail {
                    question_id: question_id.to_string(),
                    student_answer: Some(submission.answer(question_id).trim().to_string()),
                    correct_answer: None,
                    points_awarded: 0.0,
                    max_points: rule.max_points(),
                    is_correct: false,
                    rule_applied: Some(RuleKind::AssumptionSet.tag().to_string()),
                    feedback: Some(note.clone()),
                }
            }
        };
        details.push(detail);
    }

    let total = details.iter().map(|d| d.points_awarded).sum();
    tracing::debug!(assumption = %assumption.name, total, "Assumption graded");
    Ok(AssumptionResult {
        name: assumption.name.clone(),
        total,
        details,
    })
}

/// Keeps the first assumption that no later one `beats`.
fn pick(results: Vec<AssumptionResult>, beats: impl Fn(f64, f64) -> bool) -> Vec<GradeDetail> {
    results
        .into_iter()
        .reduce(|chosen, candidate| {
            if beats(candidate.total, chosen.total) {
                candidate
            } else {
                chosen
            }
        })
        .map(|chosen| chosen.details)
        .unwrap_or_default()
}

fn average(results: &[AssumptionResult]) -> Vec<GradeDetail> {
    let mut groups: Vec<(&str, Vec<&GradeDetail>)> = Vec::new();
    for detail in results.iter().flat_map(|r| &r.details) {
        match groups.iter_mut().find(|(qid, _)| *qid == detail.question_id) {
            Some((_, group)) => group.push(detail),
            None => groups.push((detail.question_id.as_str(), vec![detail])),
        }
    }

    groups
        .into_iter()
        .map(|(question_id, group)| {
            let mean = group.iter().map(|d| d.points_awarded).sum::<f64>() / group.len() as f64;
            let max_points = group.iter().map(|d| d.max_points).fold(0.0, f64::max);

            let mut lines: Vec<&str> = Vec::new();
            for line in group.iter().filter_map(|d| d.feedback.as_deref()).flat_map(str::lines) {
                if !lines.contains(&line) {
                    lines.push(line);
                }
            }
            let feedback = if lines.is_empty() {
                "Averaged across assumptions".to_string()
            } else {
                format!("Averaged across assumptions:\n{}", lines.join("\n"))
            };

            GradeDetail {
                question_id: question_id.to_string(),
                student_answer: group[0].student_answer.clone(),
                correct_answer: group[0].correct_answer.clone(),
                points_awarded: mean,
                max_points,
                is_correct: mean >= max_points - AVERAGE_EPSILON,
                rule_applied: Some(RuleKind::AssumptionSet.tag().to_string()),
                feedback: Some(feedback),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::test_support::{exact, registry};
    use crate::rules::AssumptionSetRule;

    fn assumption_set(mode: AssumptionMode) -> Rule {
        Rule::AssumptionSet(AssumptionSetRule {
            assumptions: vec![
                Assumption {
                    name: "metric".into(),
                    rules: vec![exact("q1", "100", 4.0), exact("q2", "cm", 1.0)],
                },
                Assumption {
                    name: "imperial".into(),
                    rules: vec![exact("q1", "39.37", 4.0), exact("q2", "in", 1.0)],
                },
            ],
            mode,
        })
    }

    fn grade(mode: AssumptionMode, answers: [(&str, &str); 2]) -> Vec<GradeDetail> {
        registry()
            .evaluate(&assumption_set(mode), &Submission::new("s1", answers))
            .unwrap()
            .into_details()
    }

    fn total(details: &[GradeDetail]) -> f64 {
        details.iter().map(|d| d.points_awarded).sum()
    }

    #[test]
    fn test_best_and_worst() {
        let answers = [("q1", "100"), ("q2", "in")];
        let best = grade(AssumptionMode::Best, answers);
        assert_eq!(total(&best), 4.0);
        assert!(best[0]
            .feedback
            .as_deref()
            .unwrap()
            .ends_with("\nGraded using assumption: metric"));

        let worst = grade(AssumptionMode::Worst, answers);
        assert_eq!(total(&worst), 1.0);
        assert!(worst[1]
            .feedback
            .as_deref()
            .unwrap()
            .ends_with("Graded using assumption: imperial"));
    }

    #[test]
    fn test_tie_keeps_first_assumption() {
        let best = grade(AssumptionMode::Best, [("q1", "x"), ("q2", "y")]);
        assert!(best[0].feedback.as_deref().unwrap().contains("metric"));
        let worst = grade(AssumptionMode::Worst, [("q1", "x"), ("q2", "y")]);
        assert!(worst[0].feedback.as_deref().unwrap().contains("metric"));
    }

    #[test]
    fn test_average_per_question() {
        let details = grade(AssumptionMode::Average, [("q1", "100"), ("q2", "cm")]);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].question_id, "q1");
        assert_eq!(details[0].points_awarded, 2.0);
        assert_eq!(details[0].max_points, 4.0);
        assert!(!details[0].is_correct);
        assert_eq!(details[0].rule_applied.as_deref(), Some("ASSUMPTION_SET"));
        let feedback = details[0].feedback.as_deref().unwrap();
        assert!(feedback.starts_with("Averaged across assumptions:\n"));
        assert!(feedback.contains("Graded using assumption: metric"));
        assert!(feedback.contains("Graded using assumption: imperial"));
    }

    #[test]
    fn test_unregistered_rule_is_skipped() {
        let mut registry = registry();
        registry.unregister("EXACT_MATCH");
        let details = registry
            .evaluate(
                &assumption_set(AssumptionMode::Best),
                &Submission::new("s1", [("q1", "100")]),
            )
            .unwrap();
        assert_eq!(details, Evaluation::NotApplicable);
    }
}
