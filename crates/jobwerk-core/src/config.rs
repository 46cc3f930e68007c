// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;

/// Persistent engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobwerkConfig {
    pub dispatch: DispatchConfig,
    pub scheduler: SchedulerConfig,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

/// Dispatcher and runner tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Run attempt at which a `Retry` result is turned into a long-delay redispatch.
    pub reschedule_retry_count: u32,
    /// Delay of that long-delay redispatch.
    pub reschedule_retry_delay_ms: u64,
    /// Delay before retrying the pending queue after a scheduling failure.
    pub pending_retry_delay_ms: u64,
    /// When set, pending retries back off exponentially up to this cap.
    /// When unset, they repeat at `pending_retry_delay_ms`.
    pub pending_retry_max_delay_ms: Option<u64>,
    /// How long the runner waits for the host to finish initialising.
    pub readiness_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reschedule_retry_count: 5,
            reschedule_retry_delay_ms: 60 * 60 * 1000,
            pending_retry_delay_ms: 1000,
            pending_retry_max_delay_ms: None,
            readiness_timeout_ms: 5000,
        }
    }
}

impl DispatchConfig {
    pub fn reschedule_retry_delay(&self) -> Duration {
        Duration::from_millis(self.reschedule_retry_delay_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    /// Backoff applied between pending-queue drain attempts.
    pub fn pending_retry_backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.pending_retry_delay_ms);
        match self.pending_retry_max_delay_ms {
            Some(max_ms) => Backoff::Exponential {
                base,
                max: Duration::from_millis(max_ms.max(self.pending_retry_delay_ms)),
            },
            None => Backoff::Fixed(base),
        }
    }
}

/// In-process scheduler backend tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of jobs queued or running at once. Further schedule
    /// calls fail until capacity frees up.
    pub max_scheduled_jobs: usize,
    /// Upper bound for run-attempt backoff.
    pub max_backoff_ms: u64,
    /// Whether jobs flagged `persistent` are written to the durable store.
    pub persist_jobs: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_scheduled_jobs: 100,
            max_backoff_ms: 5 * 60 * 60 * 1000,
            persist_jobs: true,
        }
    }
}

impl SchedulerConfig {
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl JobwerkConfig {
    /// Effective log filter, falling back to `info`.
    pub fn log_filter(&self) -> &str {
        if self.log_filter.trim().is_empty() {
            "info"
        } else {
            &self.log_filter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = JobwerkConfig::default();
        assert_eq!(config.dispatch.reschedule_retry_count, 5);
        assert_eq!(config.dispatch.reschedule_retry_delay(), Duration::from_secs(3600));
        assert_eq!(config.dispatch.readiness_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.dispatch.pending_retry_backoff(),
            Backoff::Fixed(Duration::from_secs(1))
        );
        assert_eq!(config.scheduler.max_scheduled_jobs, 100);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: JobwerkConfig =
            serde_json::from_str(r#"{"dispatch":{"pending_retry_max_delay_ms":60000}}"#)
                .expect("parse config");
        assert_eq!(config.dispatch.reschedule_retry_count, 5);
        assert_eq!(
            config.dispatch.pending_retry_backoff(),
            Backoff::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(60),
            }
        );
        assert!(config.scheduler.persist_jobs);
    }
}
