//! Rule Evaluator Trait
//!
//! This module defines the [`RuleEvaluator`] trait and the [`Evaluation`] it produces. Each rule
//! type has exactly one evaluator; the registry looks it up by the rule's type tag.
//!
//! Evaluators for rules that own sub-rules do not call each other directly. They dispatch every
//! sub-rule back through the registry they are given, so a custom registry changes behaviour
//! all the way down the rule tree.

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{Rule, RuleKind};
use crate::types::{GradeDetail, Submission};

/// What applying one rule to one submission produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The rule does not apply to this submission and contributes nothing.
    NotApplicable,
    Single(GradeDetail),
    Many(Vec<GradeDetail>),
}

impl Evaluation {
    /// Flattens into grade details in production order.
    pub fn into_details(self) -> Vec<GradeDetail> {
        match self {
            Evaluation::NotApplicable => Vec::new(),
            Evaluation::Single(detail) => vec![detail],
            Evaluation::Many(details) => details,
        }
    }

    /// The first detail, if any.
    pub fn into_first(self) -> Option<GradeDetail> {
        self.into_details().into_iter().next()
    }

    /// Guard outcome: `false` when not applicable, `true` when any detail is correct.
    pub fn passed(&self) -> bool {
        match self {
            Evaluation::NotApplicable => false,
            Evaluation::Single(detail) => detail.is_correct,
            Evaluation::Many(details) => details.iter().any(|d| d.is_correct),
        }
    }

    /// `Many` with nothing in it collapses to `NotApplicable`.
    pub fn from_details(details: Vec<GradeDetail>) -> Self {
        if details.is_empty() {
            Evaluation::NotApplicable
        } else {
            Evaluation::Many(details)
        }
    }

    pub(crate) fn map_details(self, f: impl Fn(GradeDetail) -> GradeDetail) -> Self {
        match self {
            Evaluation::NotApplicable => Evaluation::NotApplicable,
            Evaluation::Single(detail) => Evaluation::Single(f(detail)),
            Evaluation::Many(details) => Evaluation::Many(details.into_iter().map(f).collect()),
        }
    }
}

/// Strategy trait for grading one rule type.
pub trait RuleEvaluator: Send + Sync {
    /// The rule type this evaluator grades.
    fn kind(&self) -> RuleKind;

    /// Applies `rule` to `submission`.
    ///
    /// - `rule`: a rule of type [`RuleEvaluator::kind`]; anything else is a
    ///   [`MarkerError::RuleMismatch`].
    /// - `registry`: used to dispatch sub-rules.
    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(correct: bool) -> GradeDetail {
        GradeDetail {
            is_correct: correct,
            ..GradeDetail::default()
        }
    }

    #[test]
    fn test_passed() {
        assert!(!Evaluation::NotApplicable.passed());
        assert!(Evaluation::Single(detail(true)).passed());
        assert!(!Evaluation::Single(detail(false)).passed());
        assert!(Evaluation::Many(vec![detail(false), detail(true)]).passed());
        assert!(!Evaluation::Many(vec![]).passed());
    }

    #[test]
    fn test_from_details_collapses_empty() {
        assert_eq!(Evaluation::from_details(vec![]), Evaluation::NotApplicable);
        assert_eq!(
            Evaluation::from_details(vec![detail(true)]).into_details().len(),
            1
        );
    }
}
