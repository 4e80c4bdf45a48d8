//! Terminal presentation helpers.

pub mod progress;

pub use progress::{ProgressView, format_eta, status_line};
