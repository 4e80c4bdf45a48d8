//! Command handlers. Each receives the composed `CliContext`.

pub mod sign;
pub mod upload;
