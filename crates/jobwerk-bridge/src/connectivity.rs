// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network connectivity tracking.
//
// The host platform pushes connectivity changes in; jobs that require the
// network park on `wait_online` until the state flips back to `Online`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

/// Network connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Network is available.
    Online,
    /// No network connectivity.
    Offline,
}

/// Shared connectivity state. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<ConnectivityState>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Record a connectivity change reported by the platform.
    pub fn set_state(&self, new_state: ConnectivityState) {
        let old = self.state.send_replace(new_state);
        if old == ConnectivityState::Offline && new_state == ConnectivityState::Online {
            info!("network connectivity restored");
        } else if old == ConnectivityState::Online && new_state == ConnectivityState::Offline {
            warn!("network connectivity lost");
        }
    }

    /// Get the current connectivity state.
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == ConnectivityState::Online
    }

    /// Resolve once the network is available.
    pub async fn wait_online(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|s| *s == ConnectivityState::Online).await;
    }
}
