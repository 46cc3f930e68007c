// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Resolves a due job to its component and runs it.
//
// Resolution policy:
//   host not ready in time   -> Retry
//   unknown component        -> Success (dropped, nothing left to retry)
//   disabled component       -> Success (dropped, disabled is not transient)
//   otherwise                -> whatever the component reports

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, instrument, warn};

use jobwerk_core::{JobInfo, JobResult};

use crate::component::ComponentRegistry;
use crate::readiness::AppReadiness;

/// Executes jobs against the component registry.
#[derive(Clone)]
pub struct JobRunner {
    registry: Arc<ComponentRegistry>,
    readiness: AppReadiness,
    readiness_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        readiness: AppReadiness,
        readiness_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            readiness,
            readiness_timeout,
        }
    }

    /// Run one job. The returned future resolves exactly once.
    #[instrument(skip_all, fields(job = %job))]
    pub async fn run(&self, job: &JobInfo) -> JobResult {
        if !self.readiness.wait(self.readiness_timeout).await {
            warn!(
                timeout_ms = self.readiness_timeout.as_millis() as u64,
                "host not ready, retrying job later"
            );
            return JobResult::Retry;
        }

        let Some(component) = self.registry.get(job.component()) else {
            warn!(component = %job.component(), "no component registered, dropping job");
            return JobResult::Success;
        };

        if !component.is_enabled() {
            debug!(component = %job.component(), "component disabled, dropping job");
            return JobResult::Success;
        }

        let executor = component.executor(job);
        let (tx, rx) = oneshot::channel();
        let task_job = job.clone();
        let submitted = executor.execute(move || {
            let result = component.perform_job(&task_job);
            let _ = tx.send(result);
        });

        if let Err(e) = submitted {
            warn!(error = %e, "executor unavailable, retrying job later");
            return JobResult::Retry;
        }

        match rx.await {
            Ok(result) => {
                debug!(%result, "job finished");
                result
            }
            Err(_) => {
                error!("job ended without reporting a result");
                JobResult::Failure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::component::JobComponent;
    use crate::executor::SerialExecutor;

    struct Recording {
        executor: SerialExecutor,
        enabled: AtomicBool,
        result: JobResult,
        calls: AtomicUsize,
    }

    impl Recording {
        fn new(result: JobResult) -> Arc<Self> {
            Arc::new(Self {
                executor: SerialExecutor::spawn("recording"),
                enabled: AtomicBool::new(true),
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl JobComponent for Recording {
        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }

        fn executor(&self, _job: &JobInfo) -> SerialExecutor {
            self.executor.clone()
        }

        fn perform_job(&self, _job: &JobInfo) -> JobResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    struct Panicking(SerialExecutor);

    impl JobComponent for Panicking {
        fn executor(&self, _job: &JobInfo) -> SerialExecutor {
            self.0.clone()
        }

        fn perform_job(&self, _job: &JobInfo) -> JobResult {
            panic!("component bug")
        }
    }

    fn job(component: &str) -> JobInfo {
        JobInfo::builder()
            .action("ACTION_TEST")
            .component(component)
            .build()
            .expect("build job")
    }

    fn runner(registry: ComponentRegistry, readiness: AppReadiness) -> JobRunner {
        JobRunner::new(Arc::new(registry), readiness, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn forwards_component_result() {
        let component = Recording::new(JobResult::Retry);
        let runner = runner(
            ComponentRegistry::new().with("inbox", component.clone()),
            AppReadiness::ready(),
        );

        assert_eq!(runner.run(&job("inbox")).await, JobResult::Retry);
        assert_eq!(component.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_component_is_dropped_as_success() {
        let component = Recording::new(JobResult::Retry);
        let runner = runner(
            ComponentRegistry::new().with("inbox", component.clone()),
            AppReadiness::ready(),
        );

        assert_eq!(runner.run(&job("gone")).await, JobResult::Success);
        assert_eq!(runner.run(&job("")).await, JobResult::Success);
        assert_eq!(component.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_component_is_dropped_as_success() {
        let component = Recording::new(JobResult::Failure);
        component.enabled.store(false, Ordering::SeqCst);
        let runner = runner(
            ComponentRegistry::new().with("inbox", component.clone()),
            AppReadiness::ready(),
        );

        assert_eq!(runner.run(&job("inbox")).await, JobResult::Success);
        assert_eq!(component.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_host_means_retry() {
        let component = Recording::new(JobResult::Success);
        let runner = runner(
            ComponentRegistry::new().with("inbox", component.clone()),
            AppReadiness::new(),
        );

        assert_eq!(runner.run(&job("inbox")).await, JobResult::Retry);
        assert_eq!(component.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panicking_component_reports_failure() {
        let runner = runner(
            ComponentRegistry::new().with("bad", Arc::new(Panicking(SerialExecutor::spawn("bad")))),
            AppReadiness::ready(),
        );

        assert_eq!(runner.run(&job("bad")).await, JobResult::Failure);
    }
}
