// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: builds the scheduler backend, dispatcher, and
// worker from configuration and owns them for the lifetime of the host.
//
// The durable store lives in `jobs.db` inside the data directory.  If it
// cannot be opened the engine still runs, without persistence.

use std::path::Path;
use std::sync::Arc;

use jobwerk_bridge::{ConnectivityMonitor, ExecutionRequest, ScheduleStore, TimerScheduler};
use jobwerk_core::JobwerkConfig;
use jobwerk_core::error::Result;
use jobwerk_dispatch::{AppReadiness, JobDispatcher, JobRunner, JobWorker, RateLimiter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::components;

const STORE_FILE: &str = "jobs.db";

pub struct Engine {
    dispatcher: Arc<JobDispatcher>,
    scheduler: Arc<TimerScheduler>,
    readiness: AppReadiness,
    connectivity: ConnectivityMonitor,
    requests: Option<mpsc::UnboundedReceiver<ExecutionRequest>>,
}

impl Engine {
    /// Build the engine with a durable store in `data_dir`, falling back to
    /// an in-memory schedule. Must be called inside the runtime.
    pub fn init(data_dir: &Path, config: &JobwerkConfig) -> Result<Self> {
        let store = if config.scheduler.persist_jobs {
            match ScheduleStore::open(data_dir.join(STORE_FILE)) {
                Ok(store) => Some(store),
                Err(e) => {
                    error!(error = %e, "schedule store unavailable, jobs will not survive restart");
                    None
                }
            }
        } else {
            None
        };
        Self::build(config, store)
    }

    fn build(config: &JobwerkConfig, store: Option<ScheduleStore>) -> Result<Self> {
        let connectivity = ConnectivityMonitor::default();
        let (scheduler, requests) =
            TimerScheduler::new(config.scheduler.clone(), connectivity.clone(), store);
        let scheduler = Arc::new(scheduler);

        let readiness = AppReadiness::new();
        let runner = JobRunner::new(
            Arc::new(components::registry()),
            readiness.clone(),
            config.dispatch.readiness_timeout(),
        );
        let dispatcher = JobDispatcher::new(
            scheduler.clone(),
            Arc::new(RateLimiter::default()),
            runner,
            config.dispatch.clone(),
        );
        dispatcher.set_rate_limit(
            components::UPLOAD_LIMIT,
            components::UPLOAD_LIMIT_RATE,
            components::UPLOAD_LIMIT_WINDOW,
        )?;

        if let Err(e) = scheduler.restore() {
            warn!(error = %e, "failed to restore persisted jobs");
        }
        info!(
            max_scheduled_jobs = config.scheduler.max_scheduled_jobs,
            persist_jobs = config.scheduler.persist_jobs,
            "engine initialised"
        );

        Ok(Self {
            dispatcher,
            scheduler,
            readiness,
            connectivity,
            requests: Some(requests),
        })
    }

    pub fn dispatcher(&self) -> &Arc<JobDispatcher> {
        &self.dispatcher
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduler.scheduled_count()
    }

    /// Open the readiness gate and start serving execution requests.
    /// Returns `None` if the worker was already started.
    pub fn start(&mut self) -> Option<JoinHandle<()>> {
        let requests = self.requests.take()?;
        let worker = JobWorker::new(self.dispatcher.clone(), self.scheduler.clone());
        let handle = tokio::spawn(worker.run(requests));
        self.readiness.mark_ready();
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_persists_into_the_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut engine = Engine::init(dir.path(), &JobwerkConfig::default()).expect("init");
        assert!(dir.path().join(STORE_FILE).exists());
        assert!(engine.start().is_some());
        assert!(engine.start().is_none());
    }

    #[tokio::test]
    async fn sample_jobs_are_scheduled() {
        let mut config = JobwerkConfig::default();
        config.scheduler.persist_jobs = false;
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::init(dir.path(), &config).expect("init");

        for job in components::sample_jobs().expect("sample jobs") {
            engine.dispatcher().dispatch(job);
        }

        assert_eq!(engine.dispatcher().pending_len(), 0);
        assert_eq!(engine.scheduled_count(), 4);
        assert!(!dir.path().join(STORE_FILE).exists());
        assert!(engine.connectivity().is_online());
    }
}
