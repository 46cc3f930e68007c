// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for deferred job execution.

use std::time::Duration;

use jobwerk_core::JobInfo;
use jobwerk_core::error::Result;
use uuid::Uuid;

/// Hands jobs to the platform's deferred-execution facility.
///
/// A successful call is fire-and-forget: the backend later emits an
/// [`ExecutionRequest`] when the job is due.  An `Err` means the job was never
/// queued at all and is distinct from the job failing when it runs.
pub trait Scheduler: Send + Sync {
    /// Run `job` no earlier than `delay` from now, honouring its network
    /// requirement and conflict strategy.
    fn schedule(&self, job: &JobInfo, delay: Duration) -> Result<()>;
}

/// Completion side of a backend: how the executing side reports back.
pub trait ExecutionBackend: Send + Sync {
    /// Re-run the request after the backend's run-attempt backoff.
    fn retry(&self, request: ExecutionRequest) -> Result<()>;

    /// The request is done (successfully or terminally) and can be forgotten.
    fn finish(&self, request: &ExecutionRequest);
}

/// Backend-assigned identity of one scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A due job the backend wants executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub ticket: TicketId,
    pub job: JobInfo,
    /// Number of previous attempts for this ticket (0 on the first run).
    pub run_attempt: u32,
}
