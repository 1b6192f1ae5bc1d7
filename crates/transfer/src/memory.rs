//! Process memory sampling around upload phases.
//!
//! Streaming keeps resident memory flat regardless of file size; these
//! events make that visible in the logs and flag a sample above the
//! configured threshold.

use std::fmt;
use std::sync::{Arc, Mutex};

use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::progress::{ProgressCallback, ProgressEvent};

/// Default resident-memory level above which a sample is logged as a warning.
pub const DEFAULT_MEMORY_WARN_BYTES: u64 = 20 * 1024 * 1024;

/// Progress points between two client-side samples.
const PROGRESS_SAMPLE_STEP: u8 = 20;

const MIB: f64 = 1024.0 * 1024.0;

/// Samples this process's resident memory.
pub struct MemorySampler {
    pid: Option<Pid>,
    system: Mutex<System>,
    warn_above: u64,
}

impl fmt::Debug for MemorySampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySampler")
            .field("pid", &self.pid)
            .field("warn_above", &self.warn_above)
            .finish()
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_WARN_BYTES)
    }
}

impl MemorySampler {
    /// A `warn_above` of zero disables sampling.
    pub fn new(warn_above: u64) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(_) if warn_above == 0 => None,
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = e, "memory sampling unavailable");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
            warn_above,
        }
    }

    pub fn warn_above(&self) -> u64 {
        self.warn_above
    }

    /// Current resident set size in bytes, if the platform reports it.
    pub fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }

    /// Logs a sample tagged with `phase` and returns it.
    pub fn record(&self, phase: &str) -> Option<u64> {
        let resident = self.resident_bytes()?;
        let resident_mib = (resident as f64 / MIB * 100.0).round() / 100.0;
        if resident > self.warn_above {
            warn!(
                phase,
                resident_mib,
                threshold_mib = self.warn_above as f64 / MIB,
                "memory usage above threshold"
            );
        } else {
            debug!(phase, resident_mib, "memory usage");
        }
        Some(resident)
    }

    /// Wraps `inner` so that a sample is also taken each time a file's
    /// progress crosses another 20-point step.
    pub fn progress_hook(self: Arc<Self>, inner: Option<ProgressCallback>) -> ProgressCallback {
        let steps = Mutex::new(StepTracker::default());
        Arc::new(move |event: &ProgressEvent| {
            let crossed = steps
                .lock()
                .map(|mut s| s.observe(event.file_index, event.percent))
                .unwrap_or(None);
            if let Some(percent) = crossed {
                self.record(&format!("{} {percent}%", event.file_name));
            }
            if let Some(cb) = &inner {
                cb(event);
            }
        })
    }
}

/// Last 20-point step reached by the file currently in flight.
#[derive(Debug, Default)]
struct StepTracker {
    file_index: usize,
    step: u8,
}

impl StepTracker {
    fn observe(&mut self, file_index: usize, percent: u8) -> Option<u8> {
        if file_index != self.file_index {
            self.file_index = file_index;
            self.step = 0;
        }
        let step = percent / PROGRESS_SAMPLE_STEP;
        if step > self.step {
            self.step = step;
            Some(step * PROGRESS_SAMPLE_STEP)
        } else {
            None
        }
    }
}
