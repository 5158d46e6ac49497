//! # Types Module
//!
//! Core data structures shared by the evaluators and the grading loop: submissions going in,
//! grade details and per-student results coming out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// Free-form, JSON-serialisable metadata. Ordered so output is deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// The kinds of question a rule can be checked against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum QuestionType {
    Choice,
    Numeric,
    Text,
}

/// One student's answers, keyed by question id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Submission {
    pub student_id: String,
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Submission {
    pub fn new<I, K, V>(student_id: impl Into<String>, answers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            student_id: student_id.into(),
            answers: answers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            metadata: Metadata::new(),
        }
    }

    /// The raw answer for `question_id`, or `""` when the student left it out.
    pub fn answer(&self, question_id: &str) -> &str {
        self.answers.get(question_id).map(String::as_str).unwrap_or("")
    }
}

/// The scored outcome for one question produced by one rule application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GradeDetail {
    pub question_id: String,
    pub student_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub points_awarded: f64,
    pub max_points: f64,
    pub is_correct: bool,
    /// Type tag of the rule that produced this detail.
    pub rule_applied: Option<String>,
    pub feedback: Option<String>,
}

impl GradeDetail {
    /// Copy of this detail with `note` appended to the feedback on its own line.
    pub fn with_feedback_note(&self, note: &str) -> Self {
        let feedback = match self.feedback.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        };
        Self {
            feedback: Some(feedback),
            ..self.clone()
        }
    }

    /// Copy of this detail with negative or non-finite points replaced by zero.
    pub fn clamped(self) -> Self {
        if self.points_awarded.is_finite() && self.points_awarded >= 0.0 {
            return self;
        }
        tracing::warn!(
            question_id = %self.question_id,
            points = self.points_awarded,
            "Clamping invalid points to 0"
        );
        Self {
            points_awarded: 0.0,
            ..self
        }
    }
}

/// Aggregated grade details and totals for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    pub student_id: String,
    pub total_points: f64,
    pub max_points: f64,
    /// `total_points / max_points * 100`, or `0` when nothing was gradable.
    pub percentage: f64,
    pub grade_details: Vec<GradeDetail>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Output of a grading run: one result per submission, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeOutput {
    pub results: Vec<StudentResult>,
    #[serde(default)]
    pub metadata: Metadata,
}
