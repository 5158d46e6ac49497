use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Rule, check_question_id};

/// Tolerance for weights summing to one.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// How sub-rule results are folded into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompositeMode {
    Max,
    Min,
    #[default]
    Sum,
    Average,
    /// Multiplies points and max points independently.
    Multiply,
    /// Weighted sum using `weights`, which must sum to one.
    Weighted,
}

/// Several single-question rules applied to the same question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRule {
    pub question_id: String,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub mode: CompositeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

impl CompositeRule {
    pub fn validate(&self) -> Result<(), String> {
        check_question_id(&self.question_id)?;
        if self.rules.is_empty() {
            return Err("Composite rule requires at least one sub-rule".to_string());
        }
        for (i, sub) in self.rules.iter().enumerate() {
            if !sub.is_single_question() {
                return Err(format!(
                    "Sub-rule {} ({}): composite sub-rules must be single-question rules",
                    i + 1,
                    sub.tag()
                ));
            }
            sub.check()
                .map_err(|e| format!("Sub-rule {} ({}): {e}", i + 1, sub.tag()))?;
        }

        match (&self.weights, self.mode) {
            (None, CompositeMode::Weighted) => {
                Err("weighted mode requires weights".to_string())
            }
            (Some(weights), _) if weights.len() != self.rules.len() => Err(format!(
                "weights length ({}) must match rules length ({})",
                weights.len(),
                self.rules.len()
            )),
            (Some(weights), CompositeMode::Weighted) => {
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err("weights must be non-negative".to_string());
                }
                let total: f64 = weights.iter().sum();
                if (total - 1.0).abs() > WEIGHT_SUM_EPSILON {
                    return Err(format!("weights must sum to 1.0 (got {total})"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Maximum points folded over the sub-rules with this rule's mode.
    pub fn max_points(&self) -> f64 {
        let maxima = self.rules.iter().map(Rule::max_points);
        match self.mode {
            CompositeMode::Max => maxima.fold(0.0, f64::max),
            CompositeMode::Min => maxima.reduce(f64::min).unwrap_or(0.0),
            CompositeMode::Sum => maxima.sum(),
            CompositeMode::Average => {
                if self.rules.is_empty() {
                    0.0
                } else {
                    maxima.sum::<f64>() / self.rules.len() as f64
                }
            }
            CompositeMode::Multiply => maxima.product(),
            CompositeMode::Weighted => match &self.weights {
                Some(weights) => maxima.zip(weights).map(|(m, w)| m * w).sum(),
                None => 0.0,
            },
        }
    }

    /// Weight applied to sub-rule `index`, `1.0` outside weighted mode.
    pub fn weight(&self, index: usize) -> f64 {
        match (&self.weights, self.mode) {
            (Some(weights), CompositeMode::Weighted) => weights.get(index).copied().unwrap_or(0.0),
            _ => 1.0,
        }
    }
}
