// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backoff policies shared by the dispatcher's pending-queue retry timer and
// the scheduler backend's run-attempt retries.

use std::time::Duration;

/// Delay policy between successive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay for every attempt.
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait before the given attempt (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let base_ms = base.as_millis() as u64;
                let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
                Duration::from_millis(exp_ms.min(max.as_millis() as u64))
            }
        }
    }
}
