//! Progress estimation.
//!
//! - `estimator` - percent, EMA-smoothed speed, and ETA from byte samples
//! - `simulated` - bounded time-based estimate for transports without
//!   byte-level progress

mod estimator;
mod simulated;

pub use estimator::{ProgressEstimator, ProgressSample, percent_of};
pub use simulated::SimulatedProgress;
