//! Client for the external verification service.
//!
//! Three concerns live here: the incremental SSE frame parser, the
//! best-effort payload model for the service's loosely-specified responses,
//! and the HTTP client that owns the CSRF session (token + cookie jar)
//! required to authorize calls. The [`UpstreamApi`] trait is the seam the
//! orchestrator consumes, so tests can script the protocol without a
//! network.

pub mod client;
pub mod error;
pub mod payload;
pub mod sse;

pub use client::{CsrfSession, EventStream, UpstreamApi, UpstreamClient};
pub use error::UpstreamError;
pub use payload::UpstreamPayload;
pub use sse::{SseEvent, SseParser};
