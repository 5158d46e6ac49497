//! # Schema Compatibility
//!
//! Checks a rubric against the shape of an assessment before any grading happens: every
//! targeted question must exist, must be of a type the rule can grade, and must be targeted by
//! only one top-level rule. Multiple-choice answers must also be among the question's options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MarkerError;
use crate::rules::{MultipleChoiceRule, Rule};
use crate::types::QuestionType;
use crate::utilities::text::preprocess;
use crate::Rubric;

/// Shape of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSchema {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Valid options for choice questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Named collection of question shapes, keyed by question id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSchema {
    #[serde(default)]
    pub name: String,
    pub questions: BTreeMap<String, QuestionSchema>,
}

/// Validates `rubric` against `questions`.
///
/// # Returns
///
/// Every problem found, or an empty list when the rubric fits the schema.
pub fn validate_rubric(rubric: &Rubric, questions: &BTreeMap<String, QuestionSchema>) -> Vec<String> {
    let mut errors = Vec::new();

    let mut targets: Vec<(String, Vec<&str>)> = Vec::new();
    for rule in &rubric.rules {
        for qid in rule.target_question_ids() {
            match targets.iter_mut().find(|(id, _)| *id == qid) {
                Some((_, tags)) => tags.push(rule.tag()),
                None => targets.push((qid, vec![rule.tag()])),
            }
        }
    }
    for (qid, tags) in targets.iter().filter(|(_, tags)| tags.len() > 1) {
        errors.push(format!(
            "Question '{qid}' is targeted by multiple rules: {}. Each question can only be targeted by one rule.",
            tags.join(", ")
        ));
    }

    for (i, rule) in rubric.rules.iter().enumerate() {
        let desc = format!("Rule {} ({})", i + 1, rule.tag());
        check_rule(rule, questions, &desc, &mut errors);
    }
    errors
}

/// Like [`validate_rubric`] but fails on the first report.
///
/// # Errors
///
/// [`MarkerError::Validation`] listing every problem found.
pub fn validate_rubric_strict(
    rubric: &Rubric,
    questions: &BTreeMap<String, QuestionSchema>,
) -> Result<(), MarkerError> {
    let errors = validate_rubric(rubric, questions);
    if errors.is_empty() {
        return Ok(());
    }
    Err(MarkerError::Validation(format!(
        "Schema validation failed with {} error(s):\n  - {}",
        errors.len(),
        errors.join("\n  - ")
    )))
}

fn check_rule(
    rule: &Rule,
    questions: &BTreeMap<String, QuestionSchema>,
    desc: &str,
    errors: &mut Vec<String>,
) {
    match rule {
        Rule::Composite(composite) => {
            for (i, sub) in composite.rules.iter().enumerate() {
                let sub = sub.with_question_id(&composite.question_id);
                let sub_desc = format!("{desc} > Sub-rule {} ({})", i + 1, sub.tag());
                check_rule(&sub, questions, &sub_desc, errors);
            }
        }
        Rule::Conditional(conditional) => {
            for (label, rules) in [
                ("If-rule", &conditional.if_rules),
                ("Then-rule", &conditional.then_rules),
            ] {
                for (i, sub) in rules.iter().enumerate() {
                    let sub_desc = format!("{desc} > {label} {} ({})", i + 1, sub.tag());
                    check_rule(sub, questions, &sub_desc, errors);
                }
            }
        }
        Rule::AssumptionSet(set) => {
            for assumption in &set.assumptions {
                for (i, sub) in assumption.rules.iter().enumerate() {
                    let sub_desc = format!(
                        "{desc} > Assumption '{}' > Rule {} ({})",
                        assumption.name,
                        i + 1,
                        sub.tag()
                    );
                    check_rule(sub, questions, &sub_desc, errors);
                }
            }
        }
        single => {
            let Some(qid) = single.question_id() else {
                return;
            };
            let Some(schema) = questions.get(qid) else {
                errors.push(format!("{desc}: question '{qid}' not found in schema"));
                return;
            };
            let compatible = single.compatible_types();
            if !compatible.contains(&schema.question_type) {
                let names: Vec<String> = compatible.iter().map(ToString::to_string).collect();
                errors.push(format!(
                    "{desc}: {:?}Rule is only compatible with {} questions, but {qid} is {}",
                    single.kind(),
                    names.join(", "),
                    schema.question_type
                ));
                return;
            }
            if let Rule::MultipleChoice(choice) = single {
                check_options(choice, schema, desc, errors);
            }
        }
    }
}

fn check_options(
    rule: &MultipleChoiceRule,
    schema: &QuestionSchema,
    desc: &str,
    errors: &mut Vec<String>,
) {
    let Some(options) = &schema.options else {
        return;
    };
    let config = rule.config.text();
    let normalized: Vec<String> = options.iter().map(|o| preprocess(o, &config)).collect();
    for answer in &rule.answers {
        if !normalized.contains(&preprocess(answer, &config)) {
            errors.push(format!(
                "{desc}: Answer '{answer}' not in schema options: {}",
                options.join(", ")
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions() -> BTreeMap<String, QuestionSchema> {
        serde_json::from_str(
            r#"{
                "q1": {"type": "CHOICE", "options": ["A", "B", "C"]},
                "q2": {"type": "NUMERIC"},
                "q3": {"type": "TEXT"}
            }"#,
        )
        .unwrap()
    }

    fn rubric(rules: &str) -> Rubric {
        serde_json::from_str(&format!(r#"{{"name": "Quiz", "rules": {rules}}}"#)).unwrap()
    }

    #[test]
    fn test_compatible_rubric_has_no_errors() {
        let rubric = rubric(
            r#"[
                {"type": "MULTIPLE_CHOICE", "question_id": "q1", "answers": ["a", "c"]},
                {"type": "NUMERIC_RANGE", "question_id": "q2", "min_value": 1, "max_value": 2},
                {"type": "KEYWORD", "question_id": "q3", "max_points": 2, "keywords": ["x"]}
            ]"#,
        );
        assert!(validate_rubric(&rubric, &questions()).is_empty());
        assert!(validate_rubric_strict(&rubric, &questions()).is_ok());
    }

    #[test]
    fn test_incompatible_type() {
        let rubric = rubric(
            r#"[{"type": "REGEX", "question_id": "q2", "pattern": "\\d+"}]"#,
        );
        assert_eq!(
            validate_rubric(&rubric, &questions()),
            vec!["Rule 1 (REGEX): RegexRule is only compatible with TEXT questions, but q2 is NUMERIC"]
        );
    }

    #[test]
    fn test_missing_question_and_bad_option() {
        let rubric = rubric(
            r#"[
                {"type": "MULTIPLE_CHOICE", "question_id": "q1", "answers": ["A", "D"]},
                {"type": "EXACT_MATCH", "question_id": "q9", "correct_answer": "x", "max_points": 1}
            ]"#,
        );
        assert_eq!(
            validate_rubric(&rubric, &questions()),
            vec![
                "Rule 1 (MULTIPLE_CHOICE): Answer 'D' not in schema options: A, B, C",
                "Rule 2 (EXACT_MATCH): question 'q9' not found in schema",
            ]
        );
    }

    #[test]
    fn test_nested_descriptions_and_duplicates() {
        let rubric = rubric(
            r#"[
                {"type": "COMPOSITE", "question_id": "q2", "rules": [
                    {"type": "LENGTH", "question_id": "q2", "max_length": 4}
                ]},
                {"type": "EXACT_MATCH", "question_id": "q2", "correct_answer": "1", "max_points": 1}
            ]"#,
        );
        let errors = validate_rubric(&rubric, &questions());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with(
            "Question 'q2' is targeted by multiple rules: COMPOSITE, EXACT_MATCH."
        ));
        assert!(errors[1].starts_with("Rule 1 (COMPOSITE) > Sub-rule 1 (LENGTH): LengthRule"));

        let err = validate_rubric_strict(&rubric, &questions()).unwrap_err();
        assert!(err.to_string().starts_with("Schema validation failed with 2 error(s):\n  - "));
    }
}
