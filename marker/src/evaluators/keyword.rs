use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{KeywordMode, KeywordRule, Rule, RuleKind, TextConfig};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};
use crate::utilities::text::preprocess;

use super::mismatch;

pub struct KeywordEvaluator;

impl RuleEvaluator for KeywordEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Keyword
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Keyword(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        Ok(Evaluation::Single(grade_keyword(rule, submission)))
    }
}

/// Splits `keywords` into those present in `answer` and those missing, keeping the original
/// spelling of each keyword.
pub fn match_keywords<'a>(
    answer: &str,
    keywords: &'a [String],
    config: &TextConfig,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let answer = preprocess(answer, config);
    keywords.iter().map(String::as_str).partition(|keyword| {
        let keyword = preprocess(keyword, config);
        !keyword.is_empty() && answer.contains(&keyword)
    })
}

fn points(mode: KeywordMode, max_points: f64, total: usize, found: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    match mode {
        KeywordMode::All if found == total => max_points,
        KeywordMode::Any if found >= 1 => max_points,
        KeywordMode::All | KeywordMode::Any => 0.0,
        KeywordMode::Partial => max_points / total as f64 * found as f64,
    }
}

fn feedback(mode: KeywordMode, found: &[&str], missing: &[&str]) -> String {
    let mut parts = Vec::new();
    match mode {
        KeywordMode::All => {
            if !missing.is_empty() {
                parts.push(format!("✗ Missing keywords: {}", missing.join(", ")));
            } else if !found.is_empty() {
                parts.push("✓ Found all keywords".to_string());
            }
        }
        KeywordMode::Partial => {
            if !found.is_empty() {
                parts.push(format!("✓ Found keywords: {}", found.join(", ")));
            }
            if !missing.is_empty() {
                parts.push(format!("✗ Missing keywords: {}", missing.join(", ")));
            }
        }
        KeywordMode::Any => {
            if found.is_empty() {
                parts.push("✗ No required keywords found".to_string());
            } else {
                parts.push(format!("✓ Found keyword(s): {}", found.join(", ")));
            }
        }
    }
    if parts.is_empty() {
        "No keywords found".to_string()
    } else {
        parts.join("; ")
    }
}

pub fn grade_keyword(rule: &KeywordRule, submission: &Submission) -> GradeDetail {
    let answer = submission.answer(&rule.question_id);
    let (found, missing) = match_keywords(answer, &rule.keywords, &rule.config);
    let points_awarded = points(rule.mode, rule.max_points, rule.keywords.len(), found.len());
    let is_correct = match rule.mode {
        KeywordMode::All => found.len() == rule.keywords.len(),
        KeywordMode::Partial | KeywordMode::Any => points_awarded >= rule.max_points,
    };

    GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(answer.to_string()),
        correct_answer: Some(format!("Keywords: {}", rule.keywords.join(", "))),
        points_awarded,
        max_points: rule.max_points,
        is_correct,
        rule_applied: Some(RuleKind::Keyword.tag().to_string()),
        feedback: Some(feedback(rule.mode, &found, &missing)),
    }
}
