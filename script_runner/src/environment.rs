//! One-time probe of the host the grader runs on.

use std::path::Path;
use std::sync::OnceLock;

const CONTAINER_MARKERS: &[&str] = &["docker", "kubepods", "containerd", "lxc"];
const CONTAINER_ENV_VARS: &[&str] = &["DOCKER_CONTAINER", "KUBERNETES_SERVICE_HOST"];

static DETECTED: OnceLock<HostEnvironment> = OnceLock::new();

/// Facts about the host that decide which process-level limits are usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostEnvironment {
    /// Address-space limits are skipped inside containers, where they tend to
    /// break the runtime instead of the script.
    pub in_container: bool,
    /// Whether the platform lets this process lower its own `RLIMIT_AS`.
    pub address_space_limits: bool,
}

impl HostEnvironment {
    /// Probes the host once per process and returns the cached result.
    pub fn detect() -> Self {
        *DETECTED.get_or_init(|| {
            let env = Self {
                in_container: probe_container(
                    Path::new("/.dockerenv"),
                    Path::new("/proc/1/cgroup"),
                    |key| std::env::var_os(key).is_some(),
                ),
                address_space_limits: cfg!(target_os = "linux"),
            };
            tracing::debug!(in_container = env.in_container, "Host environment probed");
            env
        })
    }

    pub fn bare_metal() -> Self {
        Self {
            in_container: false,
            address_space_limits: cfg!(target_os = "linux"),
        }
    }

    pub fn container() -> Self {
        Self {
            in_container: true,
            ..Self::bare_metal()
        }
    }
}

/// Best-effort container check. Unreadable files count as "no evidence".
fn probe_container(dockerenv: &Path, cgroup: &Path, has_env: impl Fn(&str) -> bool) -> bool {
    if dockerenv.exists() {
        return true;
    }
    if CONTAINER_ENV_VARS.iter().any(|key| has_env(key)) {
        return true;
    }
    match std::fs::read(cgroup) {
        Ok(bytes) => {
            let content = String::from_utf8_lossy(&bytes);
            CONTAINER_MARKERS.iter().any(|m| content.contains(m))
        }
        Err(_) => false,
    }
}
