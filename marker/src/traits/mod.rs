//!
//! Traits Module
//!
//! Core extension points of the marker.
//!
//! - [`evaluator`]: the [`evaluator::RuleEvaluator`] trait implemented once per rule type and
//!   registered into a [`crate::registry::RuleRegistry`].

pub mod evaluator;
