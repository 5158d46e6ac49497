//! # Rules
//!
//! The rubric rule model. [`Rule`] is a tagged union over every supported rule type, serialised
//! with a `"type"` discriminator (`"EXACT_MATCH"`, `"COMPOSITE"`, ...). Composite, conditional and
//! assumption-set rules own nested rule trees; rules are never shared and never mutated once built.
//!
//! - [`single`]: the leaf rule types, each grading one question.
//! - [`composite`]: several rules folded onto one question.
//! - [`conditional`]: rules applied only when guard rules pass.
//! - [`assumption_set`]: competing named groups of rules.

pub mod assumption_set;
pub mod composite;
pub mod conditional;
pub mod single;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::MarkerError;
use crate::types::QuestionType;

pub use assumption_set::{Assumption, AssumptionMode, AssumptionSetRule};
pub use composite::{CompositeMode, CompositeRule};
pub use conditional::{ConditionMode, ConditionalRule};
pub use single::{
    ChoiceConfig, ChoiceMode, ExactMatchRule, KeywordMode, KeywordRule, LengthMode, LengthRule,
    MultipleChoiceRule, NumericRangeRule, ProgrammableRule, RegexConfig, RegexRule,
    SimilarityAlgorithm, SimilarityRule,
};

const ALL_TYPES: &[QuestionType] = &[
    QuestionType::Choice,
    QuestionType::Numeric,
    QuestionType::Text,
];
const CHOICE_ONLY: &[QuestionType] = &[QuestionType::Choice];
const NUMERIC_ONLY: &[QuestionType] = &[QuestionType::Numeric];
const TEXT_ONLY: &[QuestionType] = &[QuestionType::Text];

/// Type tag of a [`Rule`]. Its string form is the registry key and the serde discriminator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    ExactMatch,
    NumericRange,
    MultipleChoice,
    Length,
    Similarity,
    Keyword,
    Regex,
    Programmable,
    Composite,
    Conditional,
    AssumptionSet,
}

impl RuleKind {
    pub fn tag(self) -> &'static str {
        self.into()
    }

    /// Question types a rule of this kind can grade.
    pub fn compatible_types(self) -> &'static [QuestionType] {
        match self {
            RuleKind::NumericRange => NUMERIC_ONLY,
            RuleKind::MultipleChoice => CHOICE_ONLY,
            RuleKind::Length | RuleKind::Similarity | RuleKind::Keyword | RuleKind::Regex => {
                TEXT_ONLY
            }
            RuleKind::ExactMatch
            | RuleKind::Programmable
            | RuleKind::Composite
            | RuleKind::Conditional
            | RuleKind::AssumptionSet => ALL_TYPES,
        }
    }

    /// Whether rules of this kind grade exactly one question.
    pub fn is_single_question(self) -> bool {
        !matches!(self, RuleKind::Conditional | RuleKind::AssumptionSet)
    }
}

/// Text normalisation applied before comparing answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextConfig {
    #[serde(default = "enabled")]
    pub ignore_case: bool,
    #[serde(default = "enabled")]
    pub trim_whitespace: bool,
}

fn enabled() -> bool {
    true
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            ignore_case: true,
            trim_whitespace: true,
        }
    }
}

/// One rubric entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    ExactMatch(ExactMatchRule),
    NumericRange(NumericRangeRule),
    MultipleChoice(MultipleChoiceRule),
    Length(LengthRule),
    Similarity(SimilarityRule),
    Keyword(KeywordRule),
    Regex(RegexRule),
    Programmable(ProgrammableRule),
    Composite(CompositeRule),
    Conditional(ConditionalRule),
    AssumptionSet(AssumptionSetRule),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::ExactMatch(_) => RuleKind::ExactMatch,
            Rule::NumericRange(_) => RuleKind::NumericRange,
            Rule::MultipleChoice(_) => RuleKind::MultipleChoice,
            Rule::Length(_) => RuleKind::Length,
            Rule::Similarity(_) => RuleKind::Similarity,
            Rule::Keyword(_) => RuleKind::Keyword,
            Rule::Regex(_) => RuleKind::Regex,
            Rule::Programmable(_) => RuleKind::Programmable,
            Rule::Composite(_) => RuleKind::Composite,
            Rule::Conditional(_) => RuleKind::Conditional,
            Rule::AssumptionSet(_) => RuleKind::AssumptionSet,
        }
    }

    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }

    pub fn compatible_types(&self) -> &'static [QuestionType] {
        self.kind().compatible_types()
    }

    pub fn is_single_question(&self) -> bool {
        self.kind().is_single_question()
    }

    /// The graded question for single-question rules.
    pub fn question_id(&self) -> Option<&str> {
        let id = match self {
            Rule::ExactMatch(r) => &r.question_id,
            Rule::NumericRange(r) => &r.question_id,
            Rule::MultipleChoice(r) => &r.question_id,
            Rule::Length(r) => &r.question_id,
            Rule::Similarity(r) => &r.question_id,
            Rule::Keyword(r) => &r.question_id,
            Rule::Regex(r) => &r.question_id,
            Rule::Programmable(r) => &r.question_id,
            Rule::Composite(r) => &r.question_id,
            Rule::Conditional(_) | Rule::AssumptionSet(_) => return None,
        };
        Some(id)
    }

    /// Points available from this rule. Computed for the rule types that own sub-rules.
    pub fn max_points(&self) -> f64 {
        match self {
            Rule::ExactMatch(r) => r.max_points,
            Rule::NumericRange(r) => r.max_points,
            Rule::MultipleChoice(r) => r.max_points,
            Rule::Length(r) => r.max_points,
            Rule::Similarity(r) => r.max_points,
            Rule::Keyword(r) => r.max_points,
            Rule::Regex(r) => r.max_points,
            Rule::Programmable(r) => r.max_points,
            Rule::Composite(r) => r.max_points(),
            Rule::Conditional(r) => r.max_points(),
            Rule::AssumptionSet(r) => r.max_points(),
        }
    }

    /// Every question this rule reads.
    pub fn question_ids(&self) -> BTreeSet<String> {
        match self {
            Rule::Conditional(r) => {
                let mut ids = r.guard_question_ids();
                ids.extend(r.consequence_question_ids());
                ids
            }
            Rule::AssumptionSet(r) => r.question_ids(),
            single => single.question_id().map(str::to_string).into_iter().collect(),
        }
    }

    /// Questions this rule produces grade details for.
    pub fn target_question_ids(&self) -> BTreeSet<String> {
        match self {
            Rule::Conditional(r) => r.consequence_question_ids(),
            Rule::AssumptionSet(r) => r.question_ids(),
            single => single.question_id().map(str::to_string).into_iter().collect(),
        }
    }

    /// Copy of this rule aimed at `question_id`. Multi-question rules are returned unchanged.
    pub fn with_question_id(&self, question_id: &str) -> Rule {
        let mut rule = self.clone();
        if let Some(slot) = rule.question_id_mut() {
            *slot = question_id.to_string();
        }
        rule
    }

    fn question_id_mut(&mut self) -> Option<&mut String> {
        match self {
            Rule::ExactMatch(r) => Some(&mut r.question_id),
            Rule::NumericRange(r) => Some(&mut r.question_id),
            Rule::MultipleChoice(r) => Some(&mut r.question_id),
            Rule::Length(r) => Some(&mut r.question_id),
            Rule::Similarity(r) => Some(&mut r.question_id),
            Rule::Keyword(r) => Some(&mut r.question_id),
            Rule::Regex(r) => Some(&mut r.question_id),
            Rule::Programmable(r) => Some(&mut r.question_id),
            Rule::Composite(r) => Some(&mut r.question_id),
            Rule::Conditional(_) | Rule::AssumptionSet(_) => None,
        }
    }

    /// Checks the rule and all of its sub-rules.
    ///
    /// # Returns
    ///
    /// [`MarkerError::Validation`] naming the first problem found.
    pub fn validate(&self) -> Result<(), MarkerError> {
        self.check().map_err(MarkerError::Validation)
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Rule::ExactMatch(r) => r.validate(),
            Rule::NumericRange(r) => r.validate(),
            Rule::MultipleChoice(r) => r.validate(),
            Rule::Length(r) => r.validate(),
            Rule::Similarity(r) => r.validate(),
            Rule::Keyword(r) => r.validate(),
            Rule::Regex(r) => r.validate(),
            Rule::Programmable(r) => r.validate(),
            Rule::Composite(r) => r.validate(),
            Rule::Conditional(r) => r.validate(),
            Rule::AssumptionSet(r) => r.validate(),
        }
    }
}

pub(crate) fn check_question_id(question_id: &str) -> Result<(), String> {
    if question_id.trim().is_empty() {
        return Err("question_id cannot be empty or whitespace".to_string());
    }
    Ok(())
}

pub(crate) fn check_max_points(max_points: f64) -> Result<(), String> {
    if !max_points.is_finite() || max_points < 0.0 {
        return Err(format!(
            "max_points must be a non-negative number, got {max_points}"
        ));
    }
    Ok(())
}
