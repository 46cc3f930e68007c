// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridges backend execution requests to the dispatcher.
//
// Each request runs on its own task so a slow job never holds up the next
// due one.  The outcome is reported back to the backend: `Retry` asks for a
// backed-off rerun of the same ticket, anything else releases the ticket.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use jobwerk_bridge::{ExecutionBackend, ExecutionRequest};
use jobwerk_core::JobResult;

use crate::dispatcher::JobDispatcher;

pub struct JobWorker {
    dispatcher: Arc<JobDispatcher>,
    backend: Arc<dyn ExecutionBackend>,
}

impl JobWorker {
    pub fn new(dispatcher: Arc<JobDispatcher>, backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            dispatcher,
            backend,
        }
    }

    /// Serve requests until the backend drops its sender.
    pub async fn run(self, mut requests: mpsc::UnboundedReceiver<ExecutionRequest>) {
        info!("job worker started");
        while let Some(request) = requests.recv().await {
            let dispatcher = Arc::clone(&self.dispatcher);
            let backend = Arc::clone(&self.backend);
            tokio::spawn(async move {
                handle(&dispatcher, backend.as_ref(), request).await;
            });
        }
        info!("execution channel closed, job worker stopped");
    }
}

async fn handle(dispatcher: &JobDispatcher, backend: &dyn ExecutionBackend, request: ExecutionRequest) {
    let result = dispatcher
        .on_start_job(&request.job, request.run_attempt)
        .await;

    if result == JobResult::Retry {
        let ticket = request.ticket;
        let job = request.job.clone();
        if let Err(e) = backend.retry(request) {
            // The ticket is gone for good; hand the job back to the dispatcher.
            warn!(%ticket, job = %job, error = %e, "backend retry failed, redispatching");
            dispatcher.dispatch(job);
        }
    } else {
        backend.finish(&request);
    }
}
