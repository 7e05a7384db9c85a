//! Working set probes for the memory statistic

use std::time::Duration;

use sysinfo::{Pid, System};

use crate::statistics::Probe;

/// Reads the resident memory of the current process through `sysinfo`.
///
/// Only the process entry is refreshed on each observation; a full system refresh is far
/// too slow to run at every sampling boundary.
pub struct ProcessMemoryProbe {
    system: System,
    pid: Pid,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: Pid::from(std::process::id() as usize),
        }
    }

    /// Current working set in bytes, or 0 when the process entry is unavailable.
    pub fn working_set(&mut self) -> u64 {
        if !self.system.refresh_process(self.pid) {
            tracing::debug!("Process {} not visible to sysinfo", self.pid);
            return 0;
        }

        self.system
            .process(self.pid)
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for ProcessMemoryProbe {
    type Value = u64;

    fn observe(&mut self, _elapsed: Duration) -> u64 {
        self.working_set()
    }
}

/// Reports a constant working set. Useful where the real process footprint would make
/// assertions flaky.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub u64);

impl Probe for FixedMemoryProbe {
    type Value = u64;

    fn observe(&mut self, _elapsed: Duration) -> u64 {
        self.0
    }
}
