use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::Rule;

/// How guard outcomes are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConditionMode {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

/// Grades `then_rules` only when the guards in `if_rules` pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub if_rules: Vec<Rule>,
    #[serde(default)]
    pub if_aggregation: ConditionMode,
    pub then_rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConditionalRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.if_rules.is_empty() {
            return Err("Conditional rule requires at least one if-rule".to_string());
        }
        if self.then_rules.is_empty() {
            return Err("Conditional rule requires at least one then-rule".to_string());
        }
        for (label, rules) in [("If-rule", &self.if_rules), ("Then-rule", &self.then_rules)] {
            for (i, rule) in rules.iter().enumerate() {
                if !rule.is_single_question() {
                    return Err(format!(
                        "{label} {} ({}): conditional rules only accept single-question rules",
                        i + 1,
                        rule.tag()
                    ));
                }
                rule.check()
                    .map_err(|e| format!("{label} {} ({}): {e}", i + 1, rule.tag()))?;
            }
        }

        let guarded = self.guard_question_ids();
        let overlap: Vec<String> = self
            .consequence_question_ids()
            .intersection(&guarded)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(format!(
                "Conditional rule cannot grade questions it also tests: {}",
                overlap.join(", ")
            ));
        }
        Ok(())
    }

    pub fn guard_question_ids(&self) -> BTreeSet<String> {
        self.if_rules.iter().flat_map(Rule::question_ids).collect()
    }

    pub fn consequence_question_ids(&self) -> BTreeSet<String> {
        self.then_rules
            .iter()
            .flat_map(Rule::target_question_ids)
            .collect()
    }

    pub fn max_points(&self) -> f64 {
        self.then_rules.iter().map(Rule::max_points).sum()
    }
}
