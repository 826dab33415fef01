//! Fundamental types for the verikey verification pipeline.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: timestamps, card keys, verification jobs, daily statistics,
//! and the tunable pipeline parameters.

pub mod card_key;
pub mod job;
pub mod params;
pub mod stats;
pub mod time;

pub use card_key::{CardKey, KeyStatus};
pub use job::{JobStatus, VerificationJob};
pub use params::VerifyParams;
pub use stats::DailyStats;
pub use time::Timestamp;
