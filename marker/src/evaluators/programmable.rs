//! Grading with user-supplied scripts run in the sandbox.

use script_runner::{ScriptRequest, ScriptRunner};

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{ProgrammableRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

pub struct ProgrammableEvaluator {
    runner: ScriptRunner,
}

impl ProgrammableEvaluator {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    /// Runs the rule's script against `submission`.
    ///
    /// # Errors
    ///
    /// Only a fatal sandbox failure is returned. Every other script failure becomes a
    /// zero-point detail carrying the error as feedback.
    pub fn grade(
        &self,
        rule: &ProgrammableRule,
        submission: &Submission,
    ) -> Result<GradeDetail, MarkerError> {
        let answer = submission.answer(&rule.question_id).trim().to_string();
        let request = ScriptRequest {
            script: rule.script.clone(),
            student_answers: submission.answers.clone(),
            question_id: rule.question_id.clone(),
            answer: answer.clone(),
            timeout_ms: rule.timeout_ms,
            memory_mb: rule.memory_mb,
        };

        let detail = GradeDetail {
            question_id: rule.question_id.clone(),
            student_answer: Some(answer),
            max_points: rule.max_points,
            rule_applied: Some(RuleKind::Programmable.tag().to_string()),
            ..GradeDetail::default()
        };

        match self.runner.run(&request) {
            Ok(outcome) => {
                let points = outcome.points.clamp(0.0, rule.max_points);
                Ok(GradeDetail {
                    points_awarded: points,
                    is_correct: points >= rule.max_points,
                    feedback: (!outcome.feedback.is_empty()).then_some(outcome.feedback),
                    ..detail
                })
            }
            Err(e) if e.is_fatal() => Err(MarkerError::Sandbox(e)),
            Err(e) => {
                tracing::warn!(
                    question_id = %rule.question_id,
                    student_id = %submission.student_id,
                    error = %e,
                    "Grading script failed"
                );
                Ok(GradeDetail {
                    feedback: Some(format!("Grading script error: {e}")),
                    ..detail
                })
            }
        }
    }
}

impl RuleEvaluator for ProgrammableEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Programmable
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Programmable(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        self.grade(rule, submission).map(Evaluation::Single)
    }
}
