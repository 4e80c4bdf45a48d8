//! EMA speed and ETA estimator.

use std::time::Instant;

/// Default weight of the newest speed sample.
pub const DEFAULT_ALPHA: f64 = 0.3;

/// Derived progress for one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// `floor(100 * transferred / total)`, clamped to 0-100.
    pub percent: u8,
    /// Smoothed speed in bytes per second.
    pub speed_bytes_per_sec: f64,
    /// Seconds remaining, when the speed is positive.
    pub eta_seconds: Option<f64>,
}

/// Integer percent of `transferred` over `total`.
///
/// A zero total reports 0 rather than dividing by zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn percent_of(transferred: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = u128::from(transferred.min(total)) * 100 / u128::from(total);
    percent as u8
}

/// Turns `(time, bytes)` samples into percent, speed and ETA.
///
/// One estimator per attempt; `reset` at the start of each epoch.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    alpha: f64,
    last: Option<(Instant, u64)>,
    speed: Option<f64>,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl ProgressEstimator {
    /// Create an estimator with the given smoothing factor.
    ///
    /// `alpha` is clamped to `(0, 1]`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            DEFAULT_ALPHA
        };
        Self {
            alpha,
            last: None,
            speed: None,
        }
    }

    /// Anchor the first sample at zero bytes.
    pub fn begin(&mut self, at: Instant) {
        self.last = Some((at, 0));
        self.speed = None;
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.last = None;
        self.speed = None;
    }

    /// Current smoothed speed, if any sample has produced one.
    #[must_use]
    pub const fn speed(&self) -> Option<f64> {
        self.speed
    }

    /// Feed a cumulative byte count.
    #[allow(clippy::cast_precision_loss)]
    pub fn sample(&mut self, at: Instant, transferred: u64, total: u64) -> ProgressSample {
        if let Some((prev_at, prev_bytes)) = self.last {
            let dt = at.saturating_duration_since(prev_at).as_secs_f64();
            // Zero elapsed time keeps the previous estimate.
            if dt > 0.0 {
                let instant = transferred.saturating_sub(prev_bytes) as f64 / dt;
                let smoothed = match self.speed {
                    Some(prev) => self.alpha.mul_add(instant, (1.0 - self.alpha) * prev),
                    None => instant,
                };
                self.speed = Some(smoothed);
                self.last = Some((at, transferred));
            }
        } else {
            self.last = Some((at, transferred));
        }

        let speed = self.speed.unwrap_or(0.0);
        let remaining = total.saturating_sub(transferred) as f64;
        let eta_seconds = (speed > 0.0).then(|| remaining / speed);

        ProgressSample {
            percent: percent_of(transferred, total),
            speed_bytes_per_sec: speed,
            eta_seconds,
        }
    }
}
