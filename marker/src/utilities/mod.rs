//! # Utilities
//!
//! Helpers shared by the leaf evaluators.
//!
//! - [`text`]: answer normalisation and feedback formatting.
//! - [`similarity`]: normalised string-similarity measures.

pub mod similarity;
pub mod text;
