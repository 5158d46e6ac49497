use thiserror::Error;

use crate::language::LanguageError;

/// Longest runtime diagnostic passed back to callers, in characters.
pub const MAX_DIAGNOSTIC_CHARS: usize = 200;

/// Rejections raised before a script is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptValidationError {
    #[error("Script cannot be empty")]
    Empty,

    #[error("Script exceeds maximum size of {}KB (got {size} bytes)", .limit / 1024)]
    TooLarge { size: usize, limit: usize },

    #[error("Script exceeds maximum line count of {limit} (got {lines} lines)")]
    TooManyLines { lines: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    #[error("Invalid sandbox limits: {0}")]
    InvalidLimits(String),

    #[error(transparent)]
    Validation(#[from] ScriptValidationError),

    #[error("Script compilation failed: {0}")]
    Compile(String),

    #[error("Script execution failed: {0}")]
    Runtime(String),

    #[error("Script execution timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u32 },

    #[error("Sandbox configuration error: {0}")]
    Config(String),

    #[error("Failed to restore memory limit after script execution: {0}")]
    LimitRestore(String),
}

impl SandboxError {
    /// A failed limit restore leaves the whole process constrained, so
    /// grading must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SandboxError::LimitRestore(_))
    }

    pub(crate) fn from_language(err: LanguageError, timeout_ms: u32) -> Self {
        match err {
            LanguageError::Syntax { .. } | LanguageError::Capability { .. } => {
                SandboxError::Compile(err.to_string())
            }
            LanguageError::Runtime { .. } | LanguageError::MemoryExhausted { .. } => {
                SandboxError::Runtime(truncate(&err.to_string(), MAX_DIAGNOSTIC_CHARS))
            }
            LanguageError::Interrupted => SandboxError::Timeout { timeout_ms },
        }
    }
}

/// Cuts `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Position;

    #[test]
    fn test_validation_messages() {
        let err = SandboxError::from(ScriptValidationError::TooLarge {
            size: 60_000,
            limit: 50_000,
        });
        assert_eq!(
            err.to_string(),
            "Script exceeds maximum size of 48KB (got 60000 bytes)"
        );
    }

    #[test]
    fn test_language_errors_map_to_sandbox_kinds() {
        let compile = SandboxError::from_language(
            LanguageError::Capability {
                message: "'open' is not an available function".into(),
                position: Position::new(1, 5),
            },
            100,
        );
        assert!(matches!(compile, SandboxError::Compile(_)));

        let long = LanguageError::Runtime {
            message: "x".repeat(500),
            line: 3,
        };
        let SandboxError::Runtime(msg) = SandboxError::from_language(long, 100) else {
            panic!("expected runtime error");
        };
        assert_eq!(msg.chars().count(), MAX_DIAGNOSTIC_CHARS);
        assert!(msg.ends_with("..."));

        assert_eq!(
            SandboxError::from_language(LanguageError::Interrupted, 100),
            SandboxError::Timeout { timeout_ms: 100 }
        );
    }

    #[test]
    fn test_only_restore_failure_is_fatal() {
        assert!(SandboxError::LimitRestore("EPERM".into()).is_fatal());
        assert!(!SandboxError::Timeout { timeout_ms: 1 }.is_fatal());
    }
}
