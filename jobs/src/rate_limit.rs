//! Fixed-window rate limiting.
//!
//! One window per client identifier, process-wide, reset by wall-clock
//! expiry. A rejection carries the seconds remaining in the window so the
//! caller can surface a retry-after. Two independent instances guard the
//! pipeline: batch submissions and admin logins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("too many requests, retry in {retry_after_secs}s")]
pub struct RateLimited {
    pub retry_after_secs: u64,
}

struct RateWindow {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter service. Internally synchronized; share one
/// instance per guarded surface.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request for `client_id`, rejecting above the limit.
    pub fn check(&self, client_id: &str) -> Result<(), RateLimited> {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> Result<(), RateLimited> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Expired windows are dead weight; drop them while we hold the lock.
        windows.retain(|_, w| w.reset_at > now);

        match windows.get_mut(client_id) {
            Some(window) if window.count >= self.max_requests => {
                let remaining = window.reset_at.saturating_duration_since(now);
                Err(RateLimited {
                    retry_after_secs: remaining.as_secs_f64().ceil() as u64,
                })
            }
            Some(window) => {
                window.count += 1;
                Ok(())
            }
            None => {
                windows.insert(
                    client_id.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                Ok(())
            }
        }
    }
}
