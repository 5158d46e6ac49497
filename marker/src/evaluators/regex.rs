//! Pattern search with a process-wide cache of compiled patterns.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use ::regex::{Regex, RegexBuilder};

use crate::error::MarkerError;
use crate::registry::RuleRegistry;
use crate::rules::{RegexConfig, RegexRule, Rule, RuleKind};
use crate::traits::evaluator::{Evaluation, RuleEvaluator};
use crate::types::{GradeDetail, Submission};

use super::mismatch;

const CACHE_CAPACITY: usize = 256;

type PatternCache = HashMap<(String, RegexConfig), Regex>;

static PATTERNS: OnceLock<Mutex<PatternCache>> = OnceLock::new();

/// Compiles `pattern` with `config`'s flags, reusing earlier compilations.
pub fn compile(pattern: &str, config: RegexConfig) -> Result<Regex, ::regex::Error> {
    let cache = PATTERNS.get_or_init(|| Mutex::new(HashMap::new()));
    let key = (pattern.to_string(), config);
    if let Some(regex) = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Ok(regex.clone());
    }

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(config.ignore_case)
        .multi_line(config.multi_line)
        .dot_matches_new_line(config.dotall)
        .build()?;

    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if cache.len() >= CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(key, regex.clone());
    Ok(regex)
}

pub struct RegexEvaluator;

impl RuleEvaluator for RegexEvaluator {
    fn kind(&self) -> RuleKind {
        RuleKind::Regex
    }

    fn evaluate(
        &self,
        rule: &Rule,
        submission: &Submission,
        _registry: &RuleRegistry,
    ) -> Result<Evaluation, MarkerError> {
        let Rule::Regex(rule) = rule else {
            return Err(mismatch(self.kind(), rule));
        };
        grade_regex(rule, submission).map(Evaluation::Single)
    }
}

/// Full points when the pattern is found anywhere in the untrimmed answer.
pub fn grade_regex(rule: &RegexRule, submission: &Submission) -> Result<GradeDetail, MarkerError> {
    let regex = compile(&rule.pattern, rule.config)
        .map_err(|e| MarkerError::Validation(format!("Invalid regex pattern: {e}")))?;
    let answer = submission.answer(&rule.question_id);
    let is_correct = regex.is_match(answer);

    Ok(GradeDetail {
        question_id: rule.question_id.clone(),
        student_answer: Some(answer.to_string()),
        correct_answer: Some(rule.pattern.clone()),
        points_awarded: if is_correct { rule.max_points } else { 0.0 },
        max_points: rule.max_points,
        is_correct,
        rule_applied: Some(RuleKind::Regex.tag().to_string()),
        feedback: Some(if is_correct {
            "✓ Pattern matched".to_string()
        } else {
            "✗ Pattern not matched".to_string()
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, config: RegexConfig) -> RegexRule {
        RegexRule {
            question_id: "q1".into(),
            max_points: 2.0,
            pattern: pattern.into(),
            config,
        }
    }

    fn grade(rule: &RegexRule, answer: &str) -> GradeDetail {
        grade_regex(rule, &Submission::new("s", [("q1", answer)])).unwrap()
    }

    #[test]
    fn test_search_anywhere() {
        let rule = rule(r"\d{3}-\d{4}", RegexConfig::default());
        assert!(grade(&rule, "call 555-1234 today").is_correct);
        assert!(!grade(&rule, "call me").is_correct);
    }

    #[test]
    fn test_flags() {
        let insensitive = RegexConfig {
            ignore_case: true,
            ..RegexConfig::default()
        };
        assert!(grade(&rule("^hello$", insensitive), "HELLO").is_correct);

        let multi_line = RegexConfig {
            multi_line: true,
            ..RegexConfig::default()
        };
        assert!(grade(&rule("^second$", multi_line), "first\nsecond").is_correct);
        assert!(!grade(&rule("^second$", RegexConfig::default()), "first\nsecond").is_correct);

        let dotall = RegexConfig {
            dotall: true,
            ..RegexConfig::default()
        };
        assert!(grade(&rule("a.b", dotall), "a\nb").is_correct);
    }

    #[test]
    fn test_cache_returns_equivalent_pattern() {
        let first = compile("ab+c", RegexConfig::default()).unwrap();
        let second = compile("ab+c", RegexConfig::default()).unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn test_invalid_pattern_is_validation_error() {
        let err = grade_regex(
            &rule("(", RegexConfig::default()),
            &Submission::new("s", [("q1", "x")]),
        )
        .unwrap_err();
        assert!(matches!(err, MarkerError::Validation(_)));
    }
}
