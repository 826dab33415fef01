//! Shared utilities for the verikey verification pipeline.

pub mod id;
pub mod logging;
pub mod time;

pub use id::new_id;
pub use logging::init_tracing;
pub use time::{date_key, format_duration_ms};
