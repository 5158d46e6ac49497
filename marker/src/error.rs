//! Marker Error Types
//!
//! This module defines the [`MarkerError`] enum, which covers everything that can go wrong while
//! registering evaluators, validating rubric rules and applying them to submissions.
//!
//! # Usage
//!
//! Evaluators return [`MarkerError`] from `evaluate`. The grading loop turns every non-fatal
//! variant into a zero-point grade detail for the affected rule and keeps going; only errors for
//! which [`MarkerError::is_fatal`] returns `true` stop a grading run.
//!
//! # Example
//!
//! ```rust
//! use marker::error::MarkerError;
//!
//! fn check_points(max_points: f64) -> Result<(), MarkerError> {
//!     if max_points < 0.0 {
//!         return Err(MarkerError::Validation("max_points must be non-negative".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_points(-1.0).is_err());
//! ```

use script_runner::SandboxError;
use thiserror::Error;

/// Represents all error types that can occur in the marker system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkerError {
    /// Evaluator registration is inconsistent. Raised while building a registry, never while grading.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No evaluator is registered for a rule's type tag.
    #[error("Unknown rule type: {0}")]
    UnknownRuleType(String),

    /// An evaluator was handed a rule of a different type.
    #[error("Evaluator for {expected} rules cannot grade a {found} rule")]
    RuleMismatch { expected: String, found: String },

    /// A rule instance is malformed.
    #[error("{0}")]
    Validation(String),

    /// A rule is well-formed but could not produce a result for this submission.
    #[error("{0}")]
    Evaluation(String),

    /// A grading script failed outside the programmable rule's own boundary.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Anything else, including panics raised by an evaluator.
    #[error("{0}")]
    Unexpected(String),

    /// The process is in a state where grading cannot safely continue.
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl MarkerError {
    /// Whether this error must abort the whole grading run.
    pub fn is_fatal(&self) -> bool {
        match self {
            MarkerError::Fatal(_) => true,
            MarkerError::Sandbox(e) => e.is_fatal(),
            _ => false,
        }
    }
}
