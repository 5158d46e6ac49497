//! Shared runtime plumbing for the grading workspace: environment-backed
//! configuration and logging initialisation.

pub mod config;
pub mod logger;

pub use config::AppConfig;
