// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Token-bucket throttle for generative model calls
//!
//! Implemented as a generic cell rate algorithm: each call reserves the next
//! slot on a theoretical arrival timeline and sleeps until that slot opens.
//! Up to `calls` reservations are granted immediately after an idle period;
//! beyond that, callers are spaced `interval / calls` apart in arrival order.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::RateLimitConfig;

/// Longest interval a limiter honours; longer ones are clamped to it
pub const MAX_INTERVAL: Duration = Duration::from_secs(86_400);

/// Shared limiter, one per model provider
#[derive(Debug)]
pub struct RateLimiter {
    emission: Duration,
    burst: Duration,
    tat: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Allow `calls` calls per `interval`. `calls` of zero is treated as one.
    pub fn new(calls: u32, interval: Duration) -> Self {
        let calls = calls.max(1);
        let emission = interval.min(MAX_INTERVAL) / calls;
        Self {
            emission,
            burst: emission * calls,
            tat: Mutex::new(None),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.calls, Duration::from_secs(config.interval_secs))
    }

    /// A limiter that never waits
    pub fn unlimited() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Reserve the next slot as of `now`, returning how long the caller must
    /// wait before using it.
    pub fn reserve(&self, now: Instant) -> Duration {
        let mut tat = self.tat.lock().unwrap_or_else(|e| e.into_inner());
        let start = match *tat {
            Some(t) if t > now => t,
            _ => now,
        };
        let Some(next) = start.checked_add(self.emission) else {
            return self.emission;
        };
        let allowed_at = next.checked_sub(self.burst);
        *tat = Some(next);

        allowed_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Wait until a call is permitted
    pub async fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            debug!("Throttling model call for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}
