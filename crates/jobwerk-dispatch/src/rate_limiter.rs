// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sliding-window rate limiting per named limit.
//
// Each limit allows at most `rate` hits per rolling `window`.  Hits are kept
// in chronological order and compacted lazily on every `track`/`status` call
// by dropping the stale prefix; there is no background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use jobwerk_core::clock::{Clock, SystemClock};
use jobwerk_core::error::{JobwerkError, Result};

/// Result of checking a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStatus {
    /// Another hit is allowed now.
    Under,
    /// The limit is exhausted; it frees up after `next_available`.
    Over { next_available: Duration },
}

impl RateLimitStatus {
    pub fn is_over(&self) -> bool {
        matches!(self, Self::Over { .. })
    }
}

#[derive(Debug)]
struct Limit {
    rate: usize,
    window_ms: i64,
    /// Hit timestamps, oldest first.
    hits: VecDeque<i64>,
}

impl Limit {
    /// Drop hits that have aged out of the window.
    fn compact(&mut self, now: i64) {
        while let Some(&oldest) = self.hits.front() {
            if now >= oldest.saturating_add(self.window_ms) {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Tracks hits per limit id. All state sits behind one lock.
pub struct RateLimiter {
    limits: Mutex<HashMap<String, Limit>>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            limits: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Install or overwrite a limit. Clears its hit history.
    pub fn set_limit(&self, limit_id: &str, rate: u32, window: Duration) -> Result<()> {
        if rate == 0 || window.is_zero() {
            return Err(JobwerkError::InvalidRateLimit {
                limit_id: limit_id.to_owned(),
            });
        }

        let limit = Limit {
            rate: rate as usize,
            window_ms: window.as_millis().min(i64::MAX as u128) as i64,
            hits: VecDeque::new(),
        };
        self.lock().insert(limit_id.to_owned(), limit);
        debug!(limit_id, rate, window_ms = window.as_millis() as u64, "rate limit set");
        Ok(())
    }

    /// Record a hit now. No-op for unknown ids.
    pub fn track(&self, limit_id: &str) {
        let now = self.clock.now_ms();
        if let Some(limit) = self.lock().get_mut(limit_id) {
            limit.hits.push_back(now);
            limit.compact(now);
        }
    }

    /// Current status of a limit, or `None` if no limit is set for the id.
    pub fn status(&self, limit_id: &str) -> Option<RateLimitStatus> {
        let now = self.clock.now_ms();
        let mut limits = self.lock();
        let limit = limits.get_mut(limit_id)?;
        limit.compact(now);

        if limit.hits.len() < limit.rate {
            return Some(RateLimitStatus::Under);
        }

        // The oldest hit of the newest `rate` hits decides when a slot frees up.
        let pivot = limit.hits[limit.hits.len() - limit.rate];
        let remaining_ms = limit.window_ms - (now - pivot);
        Some(RateLimitStatus::Over {
            next_available: Duration::from_millis(remaining_ms.max(0) as u64),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Limit>> {
        self.limits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
