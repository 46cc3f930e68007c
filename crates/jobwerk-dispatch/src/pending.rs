// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Buffer for jobs the scheduler refused.
//
// When a schedule call fails the job and the delay it was computed with are
// parked here.  Draining re-submits entries oldest first and removes each one
// only after its own schedule call succeeded; the first failure stops the
// drain and leaves that entry and everything behind it in place.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use jobwerk_core::JobInfo;
use jobwerk_core::error::Result;

/// A job waiting for its schedule call to be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDispatch {
    pub job: JobInfo,
    pub delay: Duration,
}

/// Thread-safe FIFO of [`PendingDispatch`] entries.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: Mutex<VecDeque<PendingDispatch>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a job behind everything already pending.
    pub fn push(&self, job: JobInfo, delay: Duration) {
        debug!(job = %job, delay_ms = delay.as_millis() as u64, "job parked for retry");
        self.lock().push_back(PendingDispatch { job, delay });
    }

    /// Number of parked jobs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the parked jobs, oldest first.
    pub fn snapshot(&self) -> Vec<PendingDispatch> {
        self.lock().iter().cloned().collect()
    }

    /// Re-submit parked jobs through `submit`, oldest first.
    ///
    /// The queue lock is held for the whole drain so concurrent drains and
    /// pushes serialise behind it.  Returns the number of jobs submitted, or
    /// the first submit error.
    pub fn drain_with<F>(&self, mut submit: F) -> Result<usize>
    where
        F: FnMut(&JobInfo, Duration) -> Result<()>,
    {
        let mut entries = self.lock();
        let mut submitted = 0;
        while let Some(entry) = entries.front() {
            submit(&entry.job, entry.delay)?;
            entries.pop_front();
            submitted += 1;
        }
        if submitted > 0 {
            info!(count = submitted, "pending jobs rescheduled");
        }
        Ok(submitted)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingDispatch>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobwerk_core::JobwerkError;

    fn job(action: &str) -> JobInfo {
        JobInfo::builder().action(action).build().expect("build job")
    }

    #[test]
    fn push_and_drain_in_order() {
        let queue = PendingQueue::new();
        queue.push(job("a"), Duration::from_secs(1));
        queue.push(job("b"), Duration::from_secs(2));
        assert_eq!(queue.len(), 2);

        let mut seen = Vec::new();
        let submitted = queue
            .drain_with(|job, delay| {
                seen.push((job.action().to_owned(), delay));
                Ok(())
            })
            .expect("drain");

        assert_eq!(submitted, 2);
        assert!(queue.is_empty());
        assert_eq!(
            seen,
            vec![
                ("a".to_owned(), Duration::from_secs(1)),
                ("b".to_owned(), Duration::from_secs(2)),
            ]
        );
    }

    #[test]
    fn failed_entry_stays_queued() {
        let queue = PendingQueue::new();
        queue.push(job("a"), Duration::ZERO);
        queue.push(job("b"), Duration::ZERO);
        queue.push(job("c"), Duration::ZERO);

        let result = queue.drain_with(|job, _| {
            if job.action() == "b" {
                Err(JobwerkError::Scheduling("busy".into()))
            } else {
                Ok(())
            }
        });

        assert!(result.is_err());
        let left: Vec<_> = queue
            .snapshot()
            .into_iter()
            .map(|p| p.job.action().to_owned())
            .collect();
        assert_eq!(left, vec!["b", "c"]);
    }
}
