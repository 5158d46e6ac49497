//! Optional process-wide address-space ceiling held for the duration of one
//! script run.
//!
//! Only the soft `RLIMIT_AS` is lowered, so the previous value can always be
//! put back without privileges. The ceiling sits `memory_mb` above what the
//! process already has mapped, plus headroom for the worker thread's stack
//! and its allocator arena.

use crate::error::SandboxError;

/// Address space reserved for the worker thread on top of the script budget.
pub const WORKER_HEADROOM_BYTES: u64 = 128 * 1024 * 1024;

/// Restores the previous soft limit when released or dropped.
pub struct AddressSpaceGuard {
    #[cfg(target_os = "linux")]
    previous: libc::rlimit,
    restored: bool,
}

impl AddressSpaceGuard {
    /// Lowers the soft address-space limit for a run with a budget of
    /// `memory_mb`. Returns a human-readable reason when the limit cannot be
    /// applied on this host.
    #[cfg(target_os = "linux")]
    pub fn install(memory_mb: u32) -> Result<Self, String> {
        let previous = current_limit()?;
        let mapped = mapped_bytes()?;
        let budget = u64::from(memory_mb) * 1024 * 1024;
        let mut soft = mapped
            .saturating_add(budget)
            .saturating_add(WORKER_HEADROOM_BYTES);
        if previous.rlim_max != libc::RLIM_INFINITY {
            soft = soft.min(previous.rlim_max as u64);
        }
        if previous.rlim_cur != libc::RLIM_INFINITY && previous.rlim_cur as u64 <= soft {
            tracing::debug!(
                current = previous.rlim_cur as u64,
                requested = soft,
                "Address-space limit already tighter than requested"
            );
        } else {
            set_limit(soft as libc::rlim_t, previous.rlim_max)?;
            tracing::debug!(soft, mapped, memory_mb, "Address-space limit lowered");
        }
        Ok(Self {
            previous,
            restored: false,
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn install(_memory_mb: u32) -> Result<Self, String> {
        Err("address-space limits are only supported on Linux".to_string())
    }

    /// Puts the previous limit back. Failure here is fatal for the caller.
    pub fn release(mut self) -> Result<(), SandboxError> {
        self.restored = true;
        self.restore().map_err(SandboxError::LimitRestore)
    }

    #[cfg(target_os = "linux")]
    fn restore(&self) -> Result<(), String> {
        set_limit(self.previous.rlim_cur, self.previous.rlim_max)
    }

    #[cfg(not(target_os = "linux"))]
    fn restore(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Drop for AddressSpaceGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(e) = self.restore() {
            tracing::error!(error = %e, "CRITICAL: failed to restore address-space limit");
        }
    }
}

#[cfg(target_os = "linux")]
fn current_limit() -> Result<libc::rlimit, String> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) };
    if rc != 0 {
        return Err(format!(
            "getrlimit(RLIMIT_AS) failed: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(limit)
}

#[cfg(target_os = "linux")]
fn set_limit(soft: libc::rlim_t, hard: libc::rlim_t) -> Result<(), String> {
    let limit = libc::rlimit {
        rlim_cur: soft,
        rlim_max: hard,
    };
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if rc == 0 {
        return Ok(());
    }
    Err(format!(
        "setrlimit(RLIMIT_AS, soft={soft}) failed: {}",
        std::io::Error::last_os_error()
    ))
}

/// Virtual memory currently mapped by this process.
#[cfg(target_os = "linux")]
fn mapped_bytes() -> Result<u64, String> {
    let statm = std::fs::read_to_string("/proc/self/statm")
        .map_err(|e| format!("cannot read /proc/self/statm: {e}"))?;
    let pages: u64 = statm
        .split_whitespace()
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| "unexpected /proc/self/statm format".to_string())?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return Err("cannot determine page size".to_string());
    }
    Ok(pages.saturating_mul(page_size as u64))
}
