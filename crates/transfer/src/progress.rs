use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Progress step between two reported events, in percentage points.
const REPORT_STEP: u8 = 10;

/// Callback invoked with upload progress.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// A single progress notification for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// File name as sent on the wire.
    pub file_name: String,
    /// 1-based position of the file in the request.
    pub file_index: usize,
    /// Number of files in the request.
    pub file_count: usize,
    /// Bytes of this file emitted so far.
    pub bytes_sent: u64,
    /// Total size of this file.
    pub total_bytes: u64,
    /// Integer percentage of `total_bytes` crossed.
    pub percent: u8,
    /// Sliding-window throughput estimate.
    pub bytes_per_second: f64,
    /// Estimated time to finish this file, if throughput is known.
    pub eta: Option<Duration>,
}

// ---------------------------------------------------------------------------
// ProgressGate
// ---------------------------------------------------------------------------

/// Decides when a progress event is worth emitting.
///
/// An event fires only once the percentage has advanced by at least
/// [`REPORT_STEP`] points since the last one. Small files whose first chunk
/// already covers 100% get a single event; zero-byte files get none.
#[derive(Debug, Clone)]
pub struct ProgressGate {
    total: u64,
    last_reported: u8,
}

impl ProgressGate {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            last_reported: 0,
        }
    }

    /// Returns the percentage to report for `emitted` bytes, if any.
    pub fn observe(&mut self, emitted: u64) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let percent = (emitted.min(self.total) as u128 * 100 / self.total as u128) as u8;
        if percent >= self.last_reported.saturating_add(REPORT_STEP) {
            self.last_reported = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Last percentage that produced an event.
    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if s.samples.len() < 2 {
            return 0.0;
        }

        let first = &s.samples[0];
        let last = &s.samples[s.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_reports_every_ten_points() {
        let mut gate = ProgressGate::new(100);
        let reported: Vec<u8> = (1..=100).filter_map(|b| gate.observe(b)).collect();
        assert_eq!(reported, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn gate_skips_intermediate_steps_on_large_chunks() {
        let mut gate = ProgressGate::new(1000);
        assert_eq!(gate.observe(50), None);
        assert_eq!(gate.observe(350), Some(35));
        assert_eq!(gate.observe(400), None);
        assert_eq!(gate.observe(450), Some(45));
        assert_eq!(gate.last_reported(), 45);
    }

    #[test]
    fn gate_single_chunk_file() {
        let mut gate = ProgressGate::new(17);
        assert_eq!(gate.observe(17), Some(100));
        assert_eq!(gate.observe(17), None);
    }

    #[test]
    fn gate_empty_file_never_reports() {
        let mut gate = ProgressGate::new(0);
        assert_eq!(gate.observe(0), None);
    }

    #[test]
    fn gate_handles_huge_totals() {
        let total = 5 * 1024 * 1024 * 1024u64;
        let mut gate = ProgressGate::new(total);
        assert_eq!(gate.observe(total / 2), Some(50));
        assert_eq!(gate.observe(total), Some(100));
    }

    #[test]
    fn speed_calculator_no_samples() {
        let calc = SpeedCalculator::default();
        assert_eq!(calc.bytes_per_second(), 0.0);
        assert!(calc.eta(1000).is_none());
    }

    #[test]
    fn speed_calculator_multiple_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(10)), None);
        calc.add_sample(500);
        std::thread::sleep(Duration::from_millis(50));
        calc.add_sample(500);

        assert!(calc.bytes_per_second() > 0.0);
        let eta = calc.eta(10_000);
        assert!(eta.is_some_and(|d| d.as_secs_f64() > 0.0));
    }

    #[test]
    fn speed_calculator_max_samples() {
        let calc = SpeedCalculator::new(Some(Duration::from_secs(60)), Some(5));
        for i in 0..20 {
            calc.add_sample(i * 10);
        }
        let s = calc.inner.lock().unwrap();
        assert!(s.samples.len() <= 5);
    }
}
