//! Verification job pipeline.
//!
//! Ties together identifier validation, card-key locking, upstream
//! submission, status polling, and result settlement. The entry point for
//! callers is [`JobRunner`]: `run_batch` drives a whole batch of
//! `(link, card key)` pairs and emits one or more tagged events per pair,
//! while `create_job`/`process_job`/`check_duplicate` expose the same
//! machinery piecemeal to the HTTP layer.

pub mod batch;
pub mod config;
pub mod error;
pub mod ident;
pub mod keys;
pub mod orchestrator;
pub mod outcome;
pub mod rate_limit;

pub use batch::{BatchError, BatchEvent, BatchRequest};
pub use config::VerifyConfig;
pub use error::VerifyError;
pub use ident::IdentError;
pub use keys::{KeyError, KeyManager};
pub use orchestrator::JobRunner;
pub use outcome::VerifyOutcome;
pub use rate_limit::{RateLimited, RateLimiter};
