//! Logging for the corpus balancer
//!
//! - Bracketed log lines with the emitting thread's name
//! - Dual output (timestamped file + stderr)

mod formatter;
mod setup;

pub use setup::{default_log_dir, setup_logging};
