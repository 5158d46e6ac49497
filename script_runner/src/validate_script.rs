use crate::error::ScriptValidationError;
use crate::execution_config::ExecutionConfig;

/// Checks a script's shape before it is compiled.
///
/// # Arguments
///
/// * `script` - The raw script source.
/// * `config` - Supplies the byte and line ceilings.
///
/// # Errors
///
/// Returns the first violated rule: empty or whitespace-only, more bytes
/// than `max_script_bytes`, or more lines than `max_script_lines`.
pub fn validate_script(script: &str, config: &ExecutionConfig) -> Result<(), ScriptValidationError> {
    if script.trim().is_empty() {
        return Err(ScriptValidationError::Empty);
    }
    if script.len() > config.max_script_bytes {
        return Err(ScriptValidationError::TooLarge {
            size: script.len(),
            limit: config.max_script_bytes,
        });
    }
    let lines = script.matches('\n').count() + 1;
    if lines > config.max_script_lines {
        return Err(ScriptValidationError::TooManyLines {
            lines,
            limit: config.max_script_lines,
        });
    }
    Ok(())
}
