//! # Rate Limiting Module
//!
//! Per-user cooldown for inbound messages. Each user may have one message
//! processed per window; anything arriving earlier is rejected with the
//! remaining wait time and does not move the window.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Keyed cooldown tracker for inbound messages
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    last_seen: Mutex<HashMap<i64, Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing one message per `window`
    ///
    /// A zero window disables limiting.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check a message arriving now
    pub fn check(&self, user_id: i64) -> Result<(), Duration> {
        self.check_at(user_id, Instant::now())
    }

    /// Admit the message or return how long the user still has to wait
    pub fn check_at(&self, user_id: i64, now: Instant) -> Result<(), Duration> {
        if self.window.is_zero() {
            return Ok(());
        }

        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = last_seen.get(&user_id) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }

        last_seen.insert(user_id, now);
        Ok(())
    }

    /// Drop entries whose window has passed, returning how many were removed
    pub fn prune(&self, now: Instant) -> usize {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let before = last_seen.len();
        last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < self.window);
        let removed = before - last_seen.len();
        if removed > 0 {
            debug!(removed, remaining = last_seen.len(), "Pruned rate limiter entries");
        }
        removed
    }

    /// Number of users currently tracked
    pub fn tracked(&self) -> usize {
        self.last_seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
