use common::AppConfig;
use common::config::{
    DEFAULT_SCRIPT_MAX_BYTES, DEFAULT_SCRIPT_MAX_LINES, DEFAULT_SCRIPT_MEMORY_MB,
    DEFAULT_SCRIPT_TIMEOUT_MS,
};

use crate::error::SandboxError;

/// Limits applied to every script run by a [`ScriptRunner`](crate::ScriptRunner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub timeout_ms: u32,          // Wall-clock budget per script
    pub memory_mb: u32,           // Live value budget per script
    pub strict_limits: bool,      // Fail instead of running without the ceiling; implies the ceiling
    pub address_space_limit: bool, // Also lower RLIMIT_AS while a script runs
    pub max_script_bytes: usize,
    pub max_script_lines: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            memory_mb: DEFAULT_SCRIPT_MEMORY_MB,
            strict_limits: false,
            address_space_limit: true,
            max_script_bytes: DEFAULT_SCRIPT_MAX_BYTES,
            max_script_lines: DEFAULT_SCRIPT_MAX_LINES,
        }
    }
}

impl ExecutionConfig {
    /// Builds the sandbox limits from the loaded application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_ms: config.script_timeout_ms,
            memory_mb: config.script_memory_mb,
            strict_limits: config.script_strict_limits,
            address_space_limit: config.script_address_space_limit,
            max_script_bytes: config.script_max_bytes,
            max_script_lines: config.script_max_lines,
        }
    }

    /// Same configuration with per-rule overrides for the time and memory
    /// budgets.
    pub fn with_limits(&self, timeout_ms: Option<u32>, memory_mb: Option<u32>) -> Self {
        Self {
            timeout_ms: timeout_ms.unwrap_or(self.timeout_ms),
            memory_mb: memory_mb.unwrap_or(self.memory_mb),
            ..self.clone()
        }
    }

    /// Time and memory budgets must be strictly positive.
    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidLimits(format!(
                "timeout_ms must be positive, got {}",
                self.timeout_ms
            )));
        }
        if self.memory_mb == 0 {
            return Err(SandboxError::InvalidLimits(format!(
                "memory_mb must be positive, got {}",
                self.memory_mb
            )));
        }
        Ok(())
    }

    /// Whether runs should try to lower the address-space ceiling.
    pub fn wants_address_space_limit(&self) -> bool {
        self.address_space_limit || self.strict_limits
    }

    pub fn memory_bytes(&self) -> usize {
        (self.memory_mb as usize).saturating_mul(1024 * 1024)
    }
}
