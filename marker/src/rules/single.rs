//! Single-question rule models.
//!
//! Each struct holds the configuration for one leaf rule type. Validation here covers only the
//! rule's own fields; evaluation lives in [`crate::evaluators`].

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{TextConfig, check_max_points, check_question_id};

fn default_true() -> bool {
    true
}

fn default_max_points() -> f64 {
    1.0
}

fn default_threshold() -> f64 {
    0.8
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Student answer must equal the expected answer after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactMatchRule {
    pub question_id: String,
    pub correct_answer: String,
    pub max_points: f64,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ExactMatchRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)
    }
}

/// Numeric answer must fall inside an inclusive range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericRangeRule {
    pub question_id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl NumericRangeRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            return Err("min_value and max_value must be finite".to_string());
        }
        if self.max_value < self.min_value {
            return Err(format!(
                "max_value ({}) must be greater than or equal to min_value ({})",
                self.max_value, self.min_value
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChoiceMode {
    /// Full points only for exactly the expected selection.
    #[default]
    All,
    /// Points in proportion to the expected options selected.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceConfig {
    #[serde(default = "default_true")]
    pub ignore_case: bool,
    #[serde(default = "default_true")]
    pub trim_whitespace: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self {
            ignore_case: true,
            trim_whitespace: true,
            delimiter: default_delimiter(),
        }
    }
}

impl ChoiceConfig {
    pub fn text(&self) -> TextConfig {
        TextConfig {
            ignore_case: self.ignore_case,
            trim_whitespace: self.trim_whitespace,
        }
    }
}

/// One or more options must be selected from a fixed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleChoiceRule {
    pub question_id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    pub answers: Vec<String>,
    #[serde(default)]
    pub mode: ChoiceMode,
    #[serde(default)]
    pub config: ChoiceConfig,
}

impl MultipleChoiceRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        if self.answers.is_empty() {
            return Err("answers must contain at least one option".to_string());
        }
        if self.config.delimiter.is_empty() {
            return Err("delimiter cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LengthMode {
    #[default]
    Characters,
    Words,
}

/// Answer length must respect a lower and/or upper bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthRule {
    pub question_id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub mode: LengthMode,
}

impl LengthRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        match (self.min_length, self.max_length) {
            (None, None) => {
                Err("At least one of min_length or max_length must be specified".to_string())
            }
            (Some(min), Some(max)) if max < min => {
                Err("max_length must be greater than or equal to min_length".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SimilarityAlgorithm {
    #[default]
    Levenshtein,
    JaroWinkler,
    TokenSort,
}

/// Fuzzy match against one or more reference answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRule {
    pub question_id: String,
    pub max_points: f64,
    pub reference_answers: Vec<String>,
    #[serde(default)]
    pub algorithm: SimilarityAlgorithm,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl SimilarityRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        if self.reference_answers.is_empty() {
            return Err("At least one reference answer is required".to_string());
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                self.threshold
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeywordMode {
    #[default]
    All,
    Partial,
    Any,
}

/// Points for keywords present in the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub question_id: String,
    pub max_points: f64,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mode: KeywordMode,
    #[serde(default)]
    pub config: TextConfig,
}

impl KeywordRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        if self.keywords.is_empty() {
            return Err("keywords must contain at least one entry".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RegexConfig {
    /// Let `.` match newlines.
    #[serde(default)]
    pub dotall: bool,
    #[serde(default)]
    pub ignore_case: bool,
    /// `^` and `$` match at line boundaries.
    #[serde(default)]
    pub multi_line: bool,
}

/// Full points when the pattern is found anywhere in the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    pub question_id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    pub pattern: String,
    #[serde(default)]
    pub config: RegexConfig,
}

impl RegexRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        RegexBuilder::new(&self.pattern)
            .case_insensitive(self.config.ignore_case)
            .multi_line(self.config.multi_line)
            .dot_matches_new_line(self.config.dotall)
            .build()
            .map(|_| ())
            .map_err(|e| format!("Invalid regex pattern: {e}"))
    }
}

/// Scored by a user-supplied grading script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammableRule {
    pub question_id: String,
    #[serde(default = "default_max_points")]
    pub max_points: f64,
    #[serde(alias = "code")]
    pub script: String,
    /// Overrides the configured script timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,
    /// Overrides the configured script memory budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
}

impl ProgrammableRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        check_max_points(self.max_points)?;
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be positive".to_string());
        }
        if self.memory_mb == Some(0) {
            return Err("memory_mb must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_range_bounds() {
        let rule = NumericRangeRule {
            question_id: "q1".into(),
            max_points: 1.0,
            min_value: 5.0,
            max_value: 1.0,
        };
        assert_eq!(
            rule.validate().unwrap_err(),
            "max_value (1) must be greater than or equal to min_value (5)"
        );
    }

    #[test]
    fn test_length_requires_a_bound() {
        let mut rule = LengthRule {
            question_id: "q1".into(),
            max_points: 1.0,
            min_length: None,
            max_length: None,
            mode: LengthMode::Words,
        };
        assert!(rule.validate().is_err());
        rule.max_length = Some(10);
        assert!(rule.validate().is_ok());
        rule.min_length = Some(11);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_regex_pattern_must_compile() {
        let rule = RegexRule {
            question_id: "q1".into(),
            max_points: 1.0,
            pattern: "(unclosed".into(),
            config: RegexConfig::default(),
        };
        assert!(rule.validate().unwrap_err().starts_with("Invalid regex pattern"));
    }

    #[test]
    fn test_similarity_threshold_range() {
        let rule = SimilarityRule {
            question_id: "q1".into(),
            max_points: 2.0,
            reference_answers: vec!["photosynthesis".into()],
            algorithm: SimilarityAlgorithm::JaroWinkler,
            threshold: 1.5,
            case_sensitive: false,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_programmable_accepts_code_alias() {
        let rule: ProgrammableRule = serde_json::from_str(
            r#"{"question_id": "q1", "code": "points_awarded = 1"}"#,
        )
        .unwrap();
        assert_eq!(rule.script, "points_awarded = 1");
        assert_eq!(rule.max_points, 1.0);
        assert!(rule.validate().is_ok());
    }
}
