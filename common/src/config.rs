//! Global grading configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables (and an
//! optional `.env` file). Values that are missing or fail to parse fall back to
//! their defaults, so loading never panics.

use std::env;
use std::str::FromStr;
use std::sync::{OnceLock, RwLock, RwLockReadGuard};

pub const DEFAULT_SCRIPT_TIMEOUT_MS: u32 = 5_000;
pub const DEFAULT_SCRIPT_MEMORY_MB: u32 = 50;
pub const DEFAULT_SCRIPT_MAX_BYTES: usize = 50_000;
pub const DEFAULT_SCRIPT_MAX_LINES: usize = 1_000;

/// Represents the complete grading configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_dir: String,
    pub log_to_stdout: bool,
    /// Wall-clock budget for a single grading script.
    pub script_timeout_ms: u32,
    /// Heap budget for a single grading script.
    pub script_memory_mb: u32,
    /// Treat an unavailable memory ceiling as a configuration error.
    pub script_strict_limits: bool,
    /// Lower the process address-space soft limit while a script runs. Never
    /// applied inside containers.
    pub script_address_space_limit: bool,
    pub script_max_bytes: usize,
    pub script_max_lines: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_name: "gradeflow".into(),
            log_level: "info".into(),
            log_file: "gradeflow.log".into(),
            log_dir: "logs".into(),
            log_to_stdout: true,
            script_timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
            script_memory_mb: DEFAULT_SCRIPT_MEMORY_MB,
            script_strict_limits: false,
            script_address_space_limit: true,
            script_max_bytes: DEFAULT_SCRIPT_MAX_BYTES,
            script_max_lines: DEFAULT_SCRIPT_MAX_LINES,
        }
    }
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Zero is not a usable limit; treat it like an unparseable value.
fn positive_or<T: PartialOrd + Default>(value: T, default: T) -> T {
    if value > T::default() { value } else { default }
}

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_current_env()
    }

    /// Loads the configuration from the given dotenv file followed by the
    /// process environment. Variables already set in the environment win.
    pub fn from_env_file(path: impl AsRef<std::path::Path>) -> Self {
        dotenvy::from_path(path.as_ref()).ok();
        Self::from_current_env()
    }

    fn from_current_env() -> Self {
        let d = AppConfig::default();
        Self {
            project_name: env::var("PROJECT_NAME").unwrap_or(d.project_name),
            log_level: env::var("LOG_LEVEL").unwrap_or(d.log_level),
            log_file: env::var("LOG_FILE").unwrap_or(d.log_file),
            log_dir: env::var("LOG_DIR").unwrap_or(d.log_dir),
            log_to_stdout: env_flag("LOG_TO_STDOUT", d.log_to_stdout),
            script_timeout_ms: positive_or(
                env_or("SCRIPT_TIMEOUT_MS", d.script_timeout_ms),
                d.script_timeout_ms,
            ),
            script_memory_mb: positive_or(
                env_or("SCRIPT_MEMORY_MB", d.script_memory_mb),
                d.script_memory_mb,
            ),
            script_strict_limits: env_flag("SCRIPT_STRICT_LIMITS", d.script_strict_limits),
            script_address_space_limit: env_flag(
                "SCRIPT_ADDRESS_SPACE_LIMIT",
                d.script_address_space_limit,
            ),
            script_max_bytes: positive_or(
                env_or("SCRIPT_MAX_BYTES", d.script_max_bytes),
                d.script_max_bytes,
            ),
            script_max_lines: positive_or(
                env_or("SCRIPT_MAX_LINES", d.script_max_lines),
                d.script_max_lines,
            ),
        }
    }

    fn instance() -> &'static RwLock<AppConfig> {
        CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()))
    }

    /// Returns a shared reference to the global configuration.
    pub fn global() -> RwLockReadGuard<'static, AppConfig> {
        Self::instance()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns an owned copy of the global configuration.
    pub fn snapshot() -> AppConfig {
        Self::global().clone()
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        let mut guard = Self::instance()
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = AppConfig::from_env();
    }

    /// Generic internal setter used by the per-field setters.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = Self::instance()
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_project_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.project_name = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_dir(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_dir = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_script_timeout_ms(value: u32) {
        AppConfig::set_field(|cfg| cfg.script_timeout_ms = value);
    }

    pub fn set_script_memory_mb(value: u32) {
        AppConfig::set_field(|cfg| cfg.script_memory_mb = value);
    }

    pub fn set_script_strict_limits(value: bool) {
        AppConfig::set_field(|cfg| cfg.script_strict_limits = value);
    }

    pub fn set_script_address_space_limit(value: bool) {
        AppConfig::set_field(|cfg| cfg.script_address_space_limit = value);
    }

    pub fn set_script_max_bytes(value: usize) {
        AppConfig::set_field(|cfg| cfg.script_max_bytes = value);
    }

    pub fn set_script_max_lines(value: usize) {
        AppConfig::set_field(|cfg| cfg.script_max_lines = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const KEYS: [&str; 6] = [
        "SCRIPT_TIMEOUT_MS",
        "SCRIPT_MEMORY_MB",
        "SCRIPT_STRICT_LIMITS",
        "LOG_TO_STDOUT",
        "SCRIPT_MAX_LINES",
        "PROJECT_NAME",
    ];

    fn clear_env() {
        for key in KEYS {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let cfg = AppConfig::from_current_env();
        assert_eq!(cfg.script_timeout_ms, 5_000);
        assert_eq!(cfg.script_memory_mb, 50);
        assert!(!cfg.script_strict_limits);
        assert!(cfg.script_address_space_limit);
        assert_eq!(cfg.script_max_bytes, 50_000);
        assert_eq!(cfg.script_max_lines, 1_000);
    }

    #[test]
    #[serial]
    fn test_reads_overrides_from_environment() {
        clear_env();
        unsafe {
            env::set_var("SCRIPT_TIMEOUT_MS", "250");
            env::set_var("SCRIPT_STRICT_LIMITS", "TRUE");
            env::set_var("SCRIPT_ADDRESS_SPACE_LIMIT", "off");
            env::set_var("LOG_TO_STDOUT", "0");
        }
        let cfg = AppConfig::from_current_env();
        assert_eq!(cfg.script_timeout_ms, 250);
        assert!(cfg.script_strict_limits);
        assert!(!cfg.script_address_space_limit);
        assert!(!cfg.log_to_stdout);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_garbage_and_zero_fall_back_to_defaults() {
        clear_env();
        unsafe {
            env::set_var("SCRIPT_TIMEOUT_MS", "soon");
            env::set_var("SCRIPT_MEMORY_MB", "0");
            env::set_var("SCRIPT_STRICT_LIMITS", "maybe");
        }
        let cfg = AppConfig::from_current_env();
        assert_eq!(cfg.script_timeout_ms, DEFAULT_SCRIPT_TIMEOUT_MS);
        assert_eq!(cfg.script_memory_mb, DEFAULT_SCRIPT_MEMORY_MB);
        assert!(!cfg.script_strict_limits);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SCRIPT_MAX_LINES=42").unwrap();
        writeln!(file, "PROJECT_NAME=quiz-week-3").unwrap();

        let cfg = AppConfig::from_env_file(file.path());
        assert_eq!(cfg.script_max_lines, 42);
        assert_eq!(cfg.project_name, "quiz-week-3");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_setters_and_reset() {
        clear_env();
        AppConfig::reset();
        AppConfig::set_script_memory_mb(7);
        assert_eq!(AppConfig::global().script_memory_mb, 7);

        AppConfig::reset();
        assert_eq!(AppConfig::global().script_memory_mb, DEFAULT_SCRIPT_MEMORY_MB);
    }
}
