//! Memory guard consulted before launching expensive browser renders.
//!
//! Samples this process's resident memory and the host's available memory
//! with [`sysinfo`]. The `System` instance is reused across samples.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

const MB: u64 = 1024 * 1024;

/// One memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Resident memory of this process, when it could be read.
    pub process_bytes: Option<u64>,
    /// Memory the host can still hand out.
    pub available_bytes: u64,
}

/// Decides whether there is room for another browser render.
pub struct MemoryGuard {
    /// Process ceiling in bytes; 0 disables the check.
    process_limit: u64,
    /// Host floor in bytes; 0 disables the check.
    available_floor: u64,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl MemoryGuard {
    pub fn new(process_limit_mb: u64, min_available_mb: u64) -> Self {
        Self {
            process_limit: process_limit_mb.saturating_mul(MB),
            available_floor: min_available_mb.saturating_mul(MB),
            pid: sysinfo::get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }

    /// Take a fresh reading.
    pub fn sample(&self) -> MemorySample {
        let mut sys = match self.system.lock() {
            Ok(sys) => sys,
            Err(poisoned) => poisoned.into_inner(),
        };
        sys.refresh_memory();
        let process_bytes = self.pid.and_then(|pid| {
            sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            sys.process(pid).map(|p| p.memory())
        });
        MemorySample {
            process_bytes,
            available_bytes: sys.available_memory(),
        }
    }

    /// Whether a reading is past either limit.
    pub fn is_over(&self, sample: &MemorySample) -> bool {
        let process_over = self.process_limit > 0
            && sample
                .process_bytes
                .is_some_and(|bytes| bytes > self.process_limit);
        let host_over = self.available_floor > 0 && sample.available_bytes < self.available_floor;
        process_over || host_over
    }

    /// Sample and report whether memory is under pressure.
    pub fn under_pressure(&self) -> bool {
        let sample = self.sample();
        let over = self.is_over(&sample);
        if over {
            tracing::warn!(
                "Memory pressure: process={}MB available={}MB",
                sample.process_bytes.unwrap_or(0) / MB,
                sample.available_bytes / MB
            );
        }
        over
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_guard_never_trips() {
        let guard = MemoryGuard::new(0, 0);
        let sample = MemorySample {
            process_bytes: Some(u64::MAX),
            available_bytes: 0,
        };
        assert!(!guard.is_over(&sample));
    }

    #[test]
    fn test_limits() {
        let guard = MemoryGuard::new(100, 50);
        let ok = MemorySample {
            process_bytes: Some(10 * MB),
            available_bytes: 500 * MB,
        };
        assert!(!guard.is_over(&ok));
        assert!(guard.is_over(&MemorySample {
            process_bytes: Some(200 * MB),
            ..ok
        }));
        assert!(guard.is_over(&MemorySample {
            available_bytes: 10 * MB,
            ..ok
        }));
        // Unknown process size only trips the host floor.
        assert!(!guard.is_over(&MemorySample {
            process_bytes: None,
            ..ok
        }));
    }

    #[test]
    fn test_huge_limits_saturate() {
        let guard = MemoryGuard::new(u64::MAX, u64::MAX);
        let sample = MemorySample {
            process_bytes: Some(u64::MAX - 1),
            available_bytes: u64::MAX - 1,
        };
        // Both limits clamp to u64::MAX instead of overflowing.
        assert!(guard.is_over(&sample));
        assert!(!MemoryGuard::new(u64::MAX, 0).is_over(&sample));
    }

    #[test]
    fn test_sample_reads_current_process() {
        let guard = MemoryGuard::new(1024 * 1024, 0);
        let sample = guard.sample();
        assert!(sample.process_bytes.unwrap_or(1) > 0);
        assert!(!guard.under_pressure());
    }
}
