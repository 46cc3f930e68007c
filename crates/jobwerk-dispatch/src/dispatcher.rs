// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job dispatcher.
//
// `dispatch` turns a job into a `Scheduler::schedule` call with an effective
// delay of `max(initial_delay, rate-limit wait)`.  Jobs the scheduler refuses
// are parked in the pending queue and retried from a timer until they go
// through.  `on_start_job` is the execution entry point the backend drives:
// it re-checks rate limits, records hits, runs the job, and turns a `Retry`
// at or past the run-attempt ceiling into a long-delay redispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use jobwerk_bridge::Scheduler;
use jobwerk_core::config::DispatchConfig;
use jobwerk_core::error::Result;
use jobwerk_core::{JobInfo, JobResult};

use crate::pending::PendingQueue;
use crate::rate_limiter::{RateLimitStatus, RateLimiter};
use crate::runner::JobRunner;

/// Entry point for scheduling and executing jobs.
///
/// Built once at startup and shared as `Arc<JobDispatcher>`.
pub struct JobDispatcher {
    this: Weak<JobDispatcher>,
    scheduler: Arc<dyn Scheduler>,
    rate_limiter: Arc<RateLimiter>,
    runner: JobRunner,
    pending: PendingQueue,
    retry_armed: AtomicBool,
    config: DispatchConfig,
}

impl JobDispatcher {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        rate_limiter: Arc<RateLimiter>,
        runner: JobRunner,
        config: DispatchConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            scheduler,
            rate_limiter,
            runner,
            pending: PendingQueue::new(),
            retry_armed: AtomicBool::new(false),
            config,
        })
    }

    /// Install or overwrite a rate limit.
    pub fn set_rate_limit(&self, limit_id: &str, rate: u32, window: Duration) -> Result<()> {
        self.rate_limiter.set_limit(limit_id, rate, window)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Number of jobs waiting for a scheduling retry.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Schedule a job. Scheduling failures are absorbed by the pending queue.
    #[instrument(skip_all, fields(job = %job))]
    pub fn dispatch(&self, job: JobInfo) {
        let delay = job
            .initial_delay()
            .max(self.rate_limit_delay(&job).unwrap_or(Duration::ZERO));
        self.dispatch_with_delay(job, delay);
    }

    /// Execute a due job.
    ///
    /// `run_attempt` counts earlier attempts of the same scheduled job.
    #[instrument(skip(self, job), fields(job = %job))]
    pub async fn on_start_job(&self, job: &JobInfo, run_attempt: u32) -> JobResult {
        if let Some(wait) = self.rate_limit_delay(job) {
            info!(
                wait_ms = wait.as_millis() as u64,
                "rate limit exceeded, redispatching job"
            );
            self.dispatch(job.clone());
            return JobResult::Failure;
        }

        for limit_id in job.rate_limit_ids() {
            self.rate_limiter.track(limit_id);
        }

        let result = self.runner.run(job).await;

        if result == JobResult::Retry && run_attempt >= self.config.reschedule_retry_count {
            let delay = self.config.reschedule_retry_delay();
            info!(
                delay_ms = delay.as_millis() as u64,
                "retry ceiling reached, rescheduling job"
            );
            self.dispatch_with_delay(job.clone(), delay);
            return JobResult::Failure;
        }

        result
    }

    /// Longest wait over the job's exhausted limits, or `None` if none are.
    fn rate_limit_delay(&self, job: &JobInfo) -> Option<Duration> {
        job.rate_limit_ids()
            .iter()
            .filter_map(|id| match self.rate_limiter.status(id) {
                Some(RateLimitStatus::Over { next_available }) => Some(next_available),
                _ => None,
            })
            .max()
    }

    fn dispatch_with_delay(&self, job: JobInfo, delay: Duration) {
        let scheduled = self
            .drain_pending()
            .and_then(|_| self.scheduler.schedule(&job, delay));

        match scheduled {
            Ok(()) => {
                debug!(job = %job, delay_ms = delay.as_millis() as u64, "job scheduled");
            }
            Err(e) => {
                warn!(job = %job, error = %e, "scheduling failed, job parked");
                self.pending.push(job, delay);
                self.arm_pending_retry();
            }
        }
    }

    fn drain_pending(&self) -> Result<usize> {
        self.pending
            .drain_with(|job, delay| self.scheduler.schedule(job, delay))
    }

    /// Start the pending-queue retry loop unless one is already running.
    fn arm_pending_retry(&self) {
        if self.retry_armed.swap(true, Ordering::AcqRel) {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!("no async runtime, pending jobs wait for the next dispatch");
            self.retry_armed.store(false, Ordering::Release);
            return;
        };

        let this = self.this.clone();
        let backoff = self.config.pending_retry_backoff();
        handle.spawn(async move {
            let mut attempt = 0u32;
            loop {
                tokio::time::sleep(backoff.delay(attempt)).await;
                let Some(dispatcher) = this.upgrade() else {
                    return;
                };
                match dispatcher.drain_pending() {
                    Ok(_) => break,
                    Err(e) => {
                        debug!(attempt, error = %e, "pending drain failed");
                        attempt = attempt.saturating_add(1);
                    }
                }
            }

            let Some(dispatcher) = this.upgrade() else {
                return;
            };
            dispatcher.retry_armed.store(false, Ordering::Release);
            // A push may have raced the flag reset.
            if !dispatcher.pending.is_empty() {
                dispatcher.arm_pending_retry();
            }
        });
    }
}
