// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host readiness gate. Jobs may fire before the host application finished
// initialising; the runner waits on this gate for a bounded time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// One-way "host is ready" flag. Clones share the flag.
#[derive(Debug, Clone)]
pub struct AppReadiness {
    ready: Arc<watch::Sender<bool>>,
}

impl Default for AppReadiness {
    fn default() -> Self {
        Self::new()
    }
}

impl AppReadiness {
    /// A gate that is not yet open.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { ready: Arc::new(tx) }
    }

    /// A gate that is already open.
    pub fn ready() -> Self {
        let gate = Self::new();
        gate.mark_ready();
        gate
    }

    pub fn mark_ready(&self) {
        if !self.ready.send_replace(true) {
            info!("host ready, jobs may run");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait up to `timeout` for the host. Returns whether it became ready.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.ready.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        )
    }
}
