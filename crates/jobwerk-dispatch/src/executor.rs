// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Serial executor for job work.
//
// Every executor owns one tokio task that pulls submitted closures off a
// channel and runs them one at a time on the blocking pool.  Jobs sent to
// the same executor therefore never overlap and run in submission order,
// while the dispatching task stays free.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use jobwerk_core::error::{JobwerkError, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a serial work queue. Clones submit to the same queue.
#[derive(Clone)]
pub struct SerialExecutor {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Task>,
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.name)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SerialExecutor {
    /// Start a new executor. Must be called from inside a tokio runtime.
    pub fn spawn(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        let worker_name = Arc::clone(&name);
        tokio::spawn(async move {
            debug!(executor = %worker_name, "executor started");
            while let Some(task) = rx.recv().await {
                if let Err(e) = tokio::task::spawn_blocking(task).await {
                    error!(executor = %worker_name, error = %e, "job task panicked");
                }
            }
            debug!(executor = %worker_name, "executor stopped");
        });

        Self { name, tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a closure behind everything already submitted.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.tx
            .send(Box::new(task))
            .map_err(|_| JobwerkError::ExecutorClosed(self.name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn runs_tasks_in_submission_order() {
        let executor = SerialExecutor::spawn("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5u64 {
            let order = Arc::clone(&order);
            executor
                .execute(move || {
                    // Earlier tasks sleep longer; order must still hold.
                    std::thread::sleep(Duration::from_millis(10 * (5 - i)));
                    order.lock().expect("lock").push(i);
                })
                .expect("submit");
        }

        let (tx, rx) = oneshot::channel();
        executor
            .execute(move || {
                let _ = tx.send(());
            })
            .expect("submit marker");
        rx.await.expect("marker ran");

        assert_eq!(*order.lock().expect("lock"), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn survives_a_panicking_task() {
        let executor = SerialExecutor::spawn("panicky");
        executor.execute(|| panic!("boom")).expect("submit");

        let (tx, rx) = oneshot::channel();
        executor
            .execute(move || {
                let _ = tx.send(42);
            })
            .expect("submit");
        assert_eq!(rx.await.expect("ran after panic"), 42);
    }
}
