//! Sandboxed execution of grading scripts.
//!
//! A run moves through validation, compilation and execution. Compilation
//! rejects anything outside the script language's capability surface, and
//! execution happens on a dedicated worker thread under a wall-clock deadline
//! and a memory budget. Only one script executes at a time per process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use common::AppConfig;

pub mod environment;
pub mod error;
pub mod execution_config;
pub mod language;
pub mod memory_limit;
pub mod validate_script;

pub use environment::HostEnvironment;
pub use error::{ScriptValidationError, SandboxError};
pub use execution_config::ExecutionConfig;

use language::value::format_float;
use language::{Budget, Inputs, Outputs, Program, Value};
use memory_limit::AddressSpaceGuard;
use validate_script::validate_script;

/// Serialises script runs. The deadline and address-space ceiling are
/// process-wide resources.
static EXECUTION_LOCK: Mutex<()> = Mutex::new(());

/// Stack for the worker thread. Parsing caps nesting depth, so evaluation
/// recursion stays well inside this.
const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;

/// Everything one script run needs.
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub script: String,
    pub student_answers: BTreeMap<String, String>,
    pub question_id: String,
    pub answer: String,
    /// Overrides the runner's configured timeout.
    pub timeout_ms: Option<u32>,
    /// Overrides the runner's configured memory budget.
    pub memory_mb: Option<u32>,
}

/// Result of a successful run. `notes` records every correction applied to
/// the script's raw output; they are also appended to `feedback`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutcome {
    pub points: f64,
    pub feedback: String,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    config: ExecutionConfig,
    host: HostEnvironment,
}

impl ScriptRunner {
    pub fn new(config: ExecutionConfig, host: HostEnvironment) -> Self {
        Self { config, host }
    }

    /// Runner using the application configuration and the probed host.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ExecutionConfig::from_app_config(config),
            HostEnvironment::detect(),
        )
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Validates, compiles and executes one script.
    ///
    /// # Arguments
    ///
    /// * `request` - The script, its input bindings and optional per-run limits.
    ///
    /// # Returns
    ///
    /// The coerced points and feedback, or the typed failure. Only
    /// [`SandboxError::LimitRestore`] should stop the caller.
    pub fn run(&self, request: &ScriptRequest) -> Result<ScriptOutcome, SandboxError> {
        let limits = self
            .config
            .with_limits(request.timeout_ms, request.memory_mb);
        limits.validate()?;
        validate_script(&request.script, &limits)?;

        tracing::debug!(question_id = %request.question_id, "Executing programmable rule");

        let program = language::compile(&request.script).map_err(|e| {
            let err = SandboxError::from_language(e, limits.timeout_ms);
            tracing::debug!(error = %err, "Script rejected at compile time");
            err
        })?;
        let inputs = Inputs {
            student_answers: request.student_answers.clone(),
            question_id: request.question_id.clone(),
            answer: request.answer.clone(),
        };

        let _serial = EXECUTION_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let guard = self.address_space_guard(&limits)?;
        let result = execute_on_worker(program, inputs, &limits);
        if let Some(guard) = guard {
            guard.release().inspect_err(|e| {
                tracing::error!(error = %e, "CRITICAL: address-space limit not restored");
            })?;
        }

        match result {
            Ok(outputs) => {
                let outcome = coerce_outputs(outputs);
                tracing::debug!(points = outcome.points, "Script completed");
                Ok(outcome)
            }
            Err(err) => {
                match &err {
                    SandboxError::Timeout { timeout_ms } => {
                        tracing::error!(timeout_ms, "Script execution timed out")
                    }
                    other => tracing::debug!(error = %other, "Script execution failed"),
                }
                Err(err)
            }
        }
    }

    fn address_space_guard(
        &self,
        limits: &ExecutionConfig,
    ) -> Result<Option<AddressSpaceGuard>, SandboxError> {
        if self.host.in_container {
            tracing::debug!("Running in container, skipping address-space limit");
            return Ok(None);
        }
        if !limits.wants_address_space_limit() {
            return Ok(None);
        }
        let installed = if self.host.address_space_limits {
            AddressSpaceGuard::install(limits.memory_mb)
        } else {
            Err("address-space limits are not available on this host".to_string())
        };
        match installed {
            Ok(guard) => Ok(Some(guard)),
            Err(reason) if limits.strict_limits => Err(SandboxError::Config(format!(
                "Cannot enforce memory limit of {}MB: {reason}",
                limits.memory_mb
            ))),
            Err(reason) => {
                tracing::warn!(
                    memory_mb = limits.memory_mb,
                    %reason,
                    "Failed to set address-space limit, continuing without it"
                );
                Ok(None)
            }
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new(ExecutionConfig::default(), HostEnvironment::detect())
    }
}

fn execute_on_worker(
    program: Program,
    inputs: Inputs,
    limits: &ExecutionConfig,
) -> Result<Outputs, SandboxError> {
    let timeout_ms = limits.timeout_ms;
    let timeout = Duration::from_millis(u64::from(timeout_ms));
    let interrupt = Arc::new(AtomicBool::new(false));
    let budget = Budget {
        deadline: Instant::now() + timeout,
        memory_bytes: limits.memory_bytes(),
        interrupt: Arc::clone(&interrupt),
    };

    let (tx, rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name("grading-script".into())
        .stack_size(WORKER_STACK_BYTES)
        .spawn(move || {
            let result = language::execute(&program, &inputs, &budget);
            let _ = tx.send(result);
        })
        .map_err(|e| SandboxError::Config(format!("cannot start script worker: {e}")))?;

    let result = match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(|e| SandboxError::from_language(e, timeout_ms)),
        Err(RecvTimeoutError::Timeout) => {
            interrupt.store(true, Ordering::Relaxed);
            Err(SandboxError::Timeout { timeout_ms })
        }
        Err(RecvTimeoutError::Disconnected) => Err(SandboxError::Runtime(
            "script worker stopped without a result".to_string(),
        )),
    };
    if worker.join().is_err() {
        tracing::error!("Script worker panicked");
    }
    result
}

/// Turns the script's raw output variables into a score.
fn coerce_outputs(outputs: Outputs) -> ScriptOutcome {
    let mut notes = Vec::new();

    let mut points = match outputs.points_awarded {
        Value::None => 0.0,
        Value::Bool(b) => f64::from(u8::from(b)),
        Value::Int(i) => i as f64,
        Value::Float(f) => f,
        Value::Str(s) => match s.trim().parse::<f64>() {
            Ok(f) => f,
            Err(_) => {
                notes.push(format!("Non-numeric points ('{s}'), defaulting to 0"));
                0.0
            }
        },
        other => {
            notes.push(format!(
                "Non-numeric points ({}), defaulting to 0",
                other.type_name()
            ));
            0.0
        }
    };
    if !points.is_finite() {
        notes.push(format!(
            "Non-finite points ({}), defaulting to 0",
            format_float(points)
        ));
        points = 0.0;
    }
    if points < 0.0 {
        tracing::warn!(points, "Script returned negative points, clamping to 0");
        notes.push(format!(
            "Invalid negative points ({}), defaulting to 0",
            format_float(points)
        ));
        points = 0.0;
    }

    let mut feedback = match outputs.feedback {
        Value::None => String::new(),
        Value::Str(s) => s,
        other => other.to_string(),
    };
    for note in &notes {
        if !feedback.is_empty() {
            feedback.push('\n');
        }
        feedback.push_str(note);
    }

    ScriptOutcome {
        points,
        feedback,
        notes,
    }
}

/// One-shot entry point: runs `script` with explicit limits and otherwise
/// global configuration.
///
/// # Returns
///
/// `(points, feedback)` after coercion.
pub fn run_script(
    script: &str,
    student_answers: &BTreeMap<String, String>,
    question_id: &str,
    answer: &str,
    timeout_ms: u32,
    memory_mb: u32,
    strict: bool,
) -> Result<(f64, String), SandboxError> {
    let config = ExecutionConfig {
        timeout_ms,
        memory_mb,
        strict_limits: strict,
        ..ExecutionConfig::from_app_config(&AppConfig::global())
    };
    let runner = ScriptRunner::new(config, HostEnvironment::detect());
    let outcome = runner.run(&ScriptRequest {
        script: script.to_string(),
        student_answers: student_answers.clone(),
        question_id: question_id.to_string(),
        answer: answer.to_string(),
        timeout_ms: None,
        memory_mb: None,
    })?;
    Ok((outcome.points, outcome.feedback))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(points: Value, feedback: Value) -> Outputs {
        Outputs {
            points_awarded: points,
            feedback,
        }
    }

    #[test]
    fn test_negative_points_clamped_with_note() {
        let outcome = coerce_outputs(outputs(Value::Float(-5.0), Value::Str("meh".into())));
        assert_eq!(outcome.points, 0.0);
        assert_eq!(
            outcome.feedback,
            "meh\nInvalid negative points (-5.0), defaulting to 0"
        );
    }

    #[test]
    fn test_numeric_strings_and_ints_are_accepted() {
        assert_eq!(
            coerce_outputs(outputs(Value::Str(" 2.5 ".into()), Value::None)).points,
            2.5
        );
        let outcome = coerce_outputs(outputs(Value::Int(3), Value::Int(7)));
        assert_eq!(outcome.points, 3.0);
        assert_eq!(outcome.feedback, "7");
        assert!(outcome.notes.is_empty());
    }

    #[test]
    fn test_non_numeric_points_default_to_zero() {
        let outcome = coerce_outputs(outputs(Value::List(vec![]), Value::Str(String::new())));
        assert_eq!(outcome.points, 0.0);
        assert_eq!(outcome.feedback, "Non-numeric points (list), defaulting to 0");

        let outcome = coerce_outputs(outputs(Value::Float(f64::NAN), Value::None));
        assert_eq!(outcome.points, 0.0);
        assert_eq!(outcome.notes.len(), 1);
    }
}
