//! Simulated progress for opaque transfers.
//!
//! Follows `100 * (1 - e^(-t/k))`, capped at 95% until the transfer actually
//! resolves. `k` scales with payload size so larger payloads creep slower.

use std::time::Duration;

/// Percent ceiling before the real completion signal arrives.
pub const SIMULATED_CEILING: u8 = 95;

/// Assumed throughput used to size the time constant.
const NOMINAL_BYTES_PER_SEC: f64 = 1024.0 * 1024.0;

/// Time-based progress model for one transfer.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedProgress {
    total: u64,
    time_constant: f64,
}

impl SimulatedProgress {
    /// Model a transfer of `total` bytes.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(total: u64) -> Self {
        let time_constant = (total as f64 / NOMINAL_BYTES_PER_SEC).max(1.0);
        Self {
            total,
            time_constant,
        }
    }

    /// Estimated percent after `elapsed`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn percent_at(&self, elapsed: Duration) -> u8 {
        let t = elapsed.as_secs_f64();
        let raw = 100.0 * (1.0 - (-t / self.time_constant).exp());
        raw.clamp(0.0, f64::from(SIMULATED_CEILING)).floor() as u8
    }

    /// Estimated bytes sent after `elapsed`, consistent with `percent_at`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn bytes_at(&self, elapsed: Duration) -> u64 {
        let percent = f64::from(self.percent_at(elapsed));
        ((self.total as f64) * percent / 100.0).floor() as u64
    }
}
