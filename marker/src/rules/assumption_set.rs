use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssumptionMode {
    /// The assumption with the highest total.
    #[default]
    Best,
    /// The assumption with the lowest total.
    Worst,
    /// Per-question mean across assumptions.
    Average,
}

/// One named interpretation of a multi-part answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Assumption {
    pub fn max_points(&self) -> f64 {
        self.rules.iter().map(Rule::max_points).sum()
    }
}

/// Grades every assumption independently and keeps one outcome per `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSetRule {
    pub assumptions: Vec<Assumption>,
    #[serde(default)]
    pub mode: AssumptionMode,
}

impl AssumptionSetRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.assumptions.is_empty() {
            return Err("AssumptionSet rule requires at least one assumption".to_string());
        }

        let mut seen = BTreeSet::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for assumption in &self.assumptions {
            if !seen.insert(assumption.name.as_str()) && !duplicates.contains(&assumption.name.as_str()) {
                duplicates.push(&assumption.name);
            }
        }
        if !duplicates.is_empty() {
            return Err(format!(
                "Assumption names must be unique; duplicates: {}",
                duplicates.join(", ")
            ));
        }

        for assumption in &self.assumptions {
            for (i, rule) in assumption.rules.iter().enumerate() {
                if !rule.is_single_question() {
                    return Err(format!(
                        "Assumption '{}' > Rule {} ({}): assumptions only accept single-question rules",
                        assumption.name,
                        i + 1,
                        rule.tag()
                    ));
                }
                rule.check().map_err(|e| {
                    format!(
                        "Assumption '{}' > Rule {} ({}): {e}",
                        assumption.name,
                        i + 1,
                        rule.tag()
                    )
                })?;
            }
        }
        Ok(())
    }

    /// The largest assumption total a submission could reach.
    pub fn max_points(&self) -> f64 {
        self.assumptions
            .iter()
            .map(Assumption::max_points)
            .fold(0.0, f64::max)
    }

    pub fn question_ids(&self) -> BTreeSet<String> {
        self.assumptions
            .iter()
            .flat_map(|a| a.rules.iter())
            .flat_map(Rule::question_ids)
            .collect()
    }
}
