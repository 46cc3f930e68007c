// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Demo components for the sample host.
//
// `analytics` uploads event batches under a shared upload rate limit.
// `remote-data` refreshes cached content; it needs the network and asks for a
// retry when the (simulated) server is unavailable.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use jobwerk_core::error::Result;
use jobwerk_core::{ConflictStrategy, JobInfo, JobResult};
use jobwerk_dispatch::{ComponentRegistry, JobComponent, SerialExecutor};
use tracing::info;

pub const ANALYTICS: &str = "analytics";
pub const REMOTE_DATA: &str = "remote-data";

pub const ACTION_UPLOAD_EVENTS: &str = "ACTION_UPLOAD_EVENTS";
pub const ACTION_REFRESH: &str = "ACTION_REFRESH";

/// Rate limit shared by every upload job.
pub const UPLOAD_LIMIT: &str = "upload";
pub const UPLOAD_LIMIT_RATE: u32 = 2;
pub const UPLOAD_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Uploads batches of analytics events.
pub struct AnalyticsUploader {
    executor: SerialExecutor,
    uploaded: AtomicU64,
}

impl Default for AnalyticsUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsUploader {
    pub fn new() -> Self {
        Self {
            executor: SerialExecutor::spawn(ANALYTICS),
            uploaded: AtomicU64::new(0),
        }
    }
}

impl JobComponent for AnalyticsUploader {
    fn executor(&self, _job: &JobInfo) -> SerialExecutor {
        self.executor.clone()
    }

    fn perform_job(&self, job: &JobInfo) -> JobResult {
        if job.action() != ACTION_UPLOAD_EVENTS {
            return JobResult::Success;
        }
        let batch = job.extras().get("batch").and_then(|v| v.as_u64()).unwrap_or(0);
        let total = self.uploaded.fetch_add(batch, Ordering::SeqCst) + batch;
        info!(batch, total, "analytics batch uploaded");
        JobResult::Success
    }
}

/// Refreshes remote data. The simulated server rejects the first
/// `failures` requests.
pub struct RemoteDataRefresher {
    executor: SerialExecutor,
    failures_left: AtomicU32,
}

impl RemoteDataRefresher {
    pub fn new(failures: u32) -> Self {
        Self {
            executor: SerialExecutor::spawn(REMOTE_DATA),
            failures_left: AtomicU32::new(failures),
        }
    }
}

impl JobComponent for RemoteDataRefresher {
    fn executor(&self, _job: &JobInfo) -> SerialExecutor {
        self.executor.clone()
    }

    fn perform_job(&self, job: &JobInfo) -> JobResult {
        if job.action() != ACTION_REFRESH {
            return JobResult::Success;
        }
        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            info!("remote data server unavailable");
            JobResult::Retry
        } else {
            info!("remote data refreshed");
            JobResult::Success
        }
    }
}

/// Registry with both demo components. Must be called inside the runtime.
pub fn registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with(ANALYTICS, Arc::new(AnalyticsUploader::new()))
        .with(REMOTE_DATA, Arc::new(RemoteDataRefresher::new(1)))
}

/// Jobs the sample host submits on startup.
pub fn sample_jobs() -> Result<Vec<JobInfo>> {
    let mut jobs = Vec::new();
    for batch in [25, 40, 10] {
        jobs.push(
            JobInfo::builder()
                .action(ACTION_UPLOAD_EVENTS)
                .component(ANALYTICS)
                .network_required(true)
                .conflict_strategy(ConflictStrategy::Append)
                .add_rate_limit(UPLOAD_LIMIT)
                .extra("batch", batch)
                .build()?,
        );
    }
    jobs.push(
        JobInfo::builder()
            .action(ACTION_REFRESH)
            .component(REMOTE_DATA)
            .network_required(true)
            .initial_delay(Duration::from_secs(2))
            .conflict_strategy(ConflictStrategy::Keep)
            .persistent(true)
            .build()?,
    );
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploader_counts_batches() {
        let uploader = AnalyticsUploader::new();
        let jobs = sample_jobs().expect("sample jobs");
        for job in jobs.iter().filter(|j| j.action() == ACTION_UPLOAD_EVENTS) {
            assert_eq!(uploader.perform_job(job), JobResult::Success);
        }
        assert_eq!(uploader.uploaded.load(Ordering::SeqCst), 75);
    }

    #[tokio::test]
    async fn refresher_retries_then_succeeds() {
        let refresher = RemoteDataRefresher::new(1);
        let job = JobInfo::builder()
            .action(ACTION_REFRESH)
            .component(REMOTE_DATA)
            .build()
            .expect("build job");
        assert_eq!(refresher.perform_job(&job), JobResult::Retry);
        assert_eq!(refresher.perform_job(&job), JobResult::Success);
    }

    #[test]
    fn uploads_share_the_upload_limit() {
        let jobs = sample_jobs().expect("sample jobs");
        assert_eq!(jobs.len(), 4);
        assert!(
            jobs.iter()
                .filter(|j| j.action() == ACTION_UPLOAD_EVENTS)
                .all(|j| j.rate_limit_ids().contains(UPLOAD_LIMIT))
        );
    }
}
