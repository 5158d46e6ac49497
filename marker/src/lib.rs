//! # Marker Library
//!
//! This crate grades structured submissions against a rubric of typed rules.
//!
//! ## Key Concepts
//! - **Rubric**: A named, ordered list of [`Rule`]s.
//! - **Registry**: Maps each rule type to the [`RuleEvaluator`](traits::evaluator::RuleEvaluator)
//!   that grades it. Rules that own sub-rules dispatch them back through the same registry.
//! - **Grader**: Applies every rubric rule to every submission, turning per-rule failures into
//!   zero-point details so one broken rule never stops a run.
//! - **Results**: One [`StudentResult`] per submission with its [`GradeDetail`]s and totals.
//!
//! # Example
//!
//! ```
//! use marker::{Grader, Rubric, Submission};
//!
//! let rubric: Rubric = serde_json::from_str(
//!     r#"{"name": "Capitals", "rules": [
//!         {"type": "EXACT_MATCH", "question_id": "q1", "correct_answer": "Paris", "max_points": 2}
//!     ]}"#,
//! ).unwrap();
//! let submissions = vec![Submission::new("alice", [("q1", " paris ")])];
//!
//! let output = Grader::new().grade(&rubric, &submissions, None).unwrap();
//! assert_eq!(output.results[0].total_points, 2.0);
//! ```

pub mod error;
pub mod evaluators;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod scorer;
pub mod traits;
pub mod types;
pub mod utilities;

use std::panic::{AssertUnwindSafe, catch_unwind};

use common::AppConfig;
use script_runner::ScriptRunner;
use serde::{Deserialize, Serialize};

pub use error::MarkerError;
pub use registry::RuleRegistry;
pub use rules::{Rule, RuleKind};
pub use types::{GradeDetail, GradeOutput, Metadata, QuestionType, StudentResult, Submission};

use crate::traits::evaluator::Evaluation;
use crate::utilities::text::sanitize;

/// Longest failure message kept in a synthetic grade detail, in characters.
const MAX_ERROR_FEEDBACK_CHARS: usize = 100;

/// Called after each submission with `(processed, total)`. An `Err` is logged and ignored.
pub type ProgressCallback<'a> = dyn FnMut(usize, usize) -> Result<(), String> + 'a;

/// A named set of grading rules applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Rubric {
    /// Every rule's validation failure, prefixed with its position and type.
    pub fn validation_errors(&self) -> Vec<String> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| {
                rule.check()
                    .err()
                    .map(|e| format!("Rule {} ({}): {e}", i + 1, rule.tag()))
            })
            .collect()
    }

    /// # Errors
    ///
    /// [`MarkerError::Validation`] joining every rule's failure.
    pub fn validate(&self) -> Result<(), MarkerError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MarkerError::Validation(errors.join("\n")))
        }
    }
}

/// Applies rubrics to submissions through a [`RuleRegistry`].
#[derive(Debug)]
pub struct Grader {
    registry: RuleRegistry,
}

impl Default for Grader {
    fn default() -> Self {
        Self::new()
    }
}

impl Grader {
    /// A grader with every built-in evaluator and default sandbox limits.
    pub fn new() -> Self {
        Self::with_registry(RuleRegistry::standard(ScriptRunner::default()))
    }

    /// A grader whose sandbox limits come from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_registry(RuleRegistry::standard(ScriptRunner::from_config(config)))
    }

    pub fn with_registry(registry: RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Grades every submission against `rubric`.
    ///
    /// Submissions are graded one at a time in input order and rules in rubric order, so the
    /// same inputs always produce the same output.
    ///
    /// # Arguments
    ///
    /// * `rubric` - Rules to apply.
    /// * `submissions` - Answers to grade.
    /// * `on_progress` - Optional callback invoked after each submission.
    ///
    /// # Errors
    ///
    /// Only fatal errors are returned, such as a sandbox that could not restore its memory
    /// limit. Every other failure is recorded as a zero-point [`GradeDetail`] for the rule that
    /// raised it.
    pub fn grade(
        &self,
        rubric: &Rubric,
        submissions: &[Submission],
        mut on_progress: Option<&mut ProgressCallback<'_>>,
    ) -> Result<GradeOutput, MarkerError> {
        tracing::info!(
            rubric = %rubric.name,
            "Grading {} submissions using rubric '{}'",
            submissions.len(),
            rubric.name
        );

        let checks: Vec<Result<(), MarkerError>> =
            rubric.rules.iter().map(Rule::validate).collect();
        for (rule, check) in rubric.rules.iter().zip(&checks) {
            if let Err(e) = check {
                tracing::warn!(rule_type = rule.tag(), error = %e, "Rule failed validation");
            }
        }

        let total = submissions.len();
        let mut results = Vec::with_capacity(total);
        for (index, submission) in submissions.iter().enumerate() {
            tracing::debug!(student_id = %submission.student_id, "Grading submission");

            let mut details = Vec::new();
            for (rule, check) in rubric.rules.iter().zip(&checks) {
                let outcome = match check {
                    Ok(()) => self.apply(rule, submission),
                    Err(e) => Err(e.clone()),
                };
                match outcome {
                    Ok(evaluation) => details.extend(evaluation.into_details()),
                    Err(e) if e.is_fatal() => {
                        tracing::error!(
                            student_id = %submission.student_id,
                            rule_type = rule.tag(),
                            error = %e,
                            "Fatal error, aborting grading run"
                        );
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::error!(
                            student_id = %submission.student_id,
                            rule_type = rule.tag(),
                            question_id = rule.question_id().unwrap_or("unknown"),
                            error = %e,
                            "Rule failed, recording zero points"
                        );
                        details.push(failure_detail(rule, &e));
                    }
                }
            }

            let result = scorer::summarize(
                &submission.student_id,
                details,
                submission.metadata.clone(),
            );
            tracing::debug!(
                student_id = %result.student_id,
                total_points = result.total_points,
                max_points = result.max_points,
                "Submission graded"
            );
            results.push(result);

            if let Some(callback) = on_progress.as_deref_mut() {
                report_progress(callback, index + 1, total);
            }
        }

        tracing::info!(rubric = %rubric.name, "Grading complete: {} results", results.len());

        let mut metadata = Metadata::new();
        metadata.insert("rubric_name".to_string(), rubric.name.clone().into());
        metadata.insert("total_submissions".to_string(), total.into());
        Ok(GradeOutput { results, metadata })
    }

    /// Evaluates one rule, turning a panic inside the evaluator into an error.
    fn apply(&self, rule: &Rule, submission: &Submission) -> Result<Evaluation, MarkerError> {
        tracing::debug!(rule_type = rule.tag(), "Applying rule");
        catch_unwind(AssertUnwindSafe(|| self.registry.evaluate(rule, submission)))
            .unwrap_or_else(|panic| Err(MarkerError::Unexpected(panic_message(&*panic))))
    }
}

/// Grades with a [`Grader`] built from the global configuration.
///
/// # Errors
///
/// See [`Grader::grade`].
pub fn grade(
    rubric: &Rubric,
    submissions: &[Submission],
    on_progress: Option<&mut ProgressCallback<'_>>,
) -> Result<GradeOutput, MarkerError> {
    Grader::from_config(&AppConfig::snapshot()).grade(rubric, submissions, on_progress)
}

fn report_progress(callback: &mut ProgressCallback<'_>, processed: usize, total: usize) {
    match catch_unwind(AssertUnwindSafe(|| callback(processed, total))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(processed, total, error = %e, "Progress callback failed"),
        Err(panic) => tracing::warn!(
            processed,
            total,
            error = %panic_message(&*panic),
            "Progress callback panicked"
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Zero-point detail standing in for a rule that failed.
fn failure_detail(rule: &Rule, error: &MarkerError) -> GradeDetail {
    let prefix = match error {
        MarkerError::Validation(_) => "✗ Validation error",
        MarkerError::Sandbox(_) => "✗ Script error",
        MarkerError::Unexpected(_) => "✗ Unexpected error",
        _ => "✗ Error",
    };
    GradeDetail {
        question_id: rule.question_id().unwrap_or("unknown").to_string(),
        student_answer: None,
        correct_answer: None,
        points_awarded: 0.0,
        max_points: rule.max_points(),
        is_correct: false,
        rule_applied: Some(rule.tag().to_string()),
        feedback: Some(format!(
            "{prefix}: {}",
            sanitize(&error.to_string(), MAX_ERROR_FEEDBACK_CHARS)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_detail_prefixes() {
        let rule: Rule = serde_json::from_str(
            r#"{"type": "EXACT_MATCH", "question_id": "q1", "correct_answer": "a", "max_points": 3}"#,
        )
        .unwrap();
        let detail = failure_detail(&rule, &MarkerError::Validation("bad".into()));
        assert_eq!(detail.feedback.as_deref(), Some("✗ Validation error: bad"));
        assert_eq!(detail.max_points, 3.0);
        assert_eq!(detail.points_awarded, 0.0);

        let detail = failure_detail(&rule, &MarkerError::UnknownRuleType("EXACT_MATCH".into()));
        assert_eq!(
            detail.feedback.as_deref(),
            Some("✗ Error: Unknown rule type: EXACT_MATCH")
        );
    }

    #[test]
    fn test_failure_feedback_truncated() {
        let rule: Rule = serde_json::from_str(
            r#"{"type": "REGEX", "question_id": "q1", "pattern": "x"}"#,
        )
        .unwrap();
        let detail = failure_detail(&rule, &MarkerError::Unexpected("é".repeat(300)));
        let feedback = detail.feedback.unwrap();
        assert!(feedback.starts_with("✗ Unexpected error: éé"));
        assert!(feedback.chars().count() <= "✗ Unexpected error: ".chars().count() + 100);
    }

    #[test]
    fn test_rubric_validation_errors() {
        let rubric: Rubric = serde_json::from_str(
            r#"{"name": "r", "rules": [
                {"type": "EXACT_MATCH", "question_id": " ", "correct_answer": "a", "max_points": 1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            rubric.validation_errors(),
            vec!["Rule 1 (EXACT_MATCH): question_id cannot be empty or whitespace"]
        );
        assert!(matches!(rubric.validate(), Err(MarkerError::Validation(_))));
    }
}
