// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Jobwerk dispatch engine.

use serde::{Deserialize, Serialize};

/// Identifier of a registered job component (the handler that performs a job).
///
/// An empty identifier is allowed; it simply never resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a newly dispatched job interacts with an already-queued job sharing
/// the same dedup key (`component:action`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictStrategy {
    /// Cancel the queued job and schedule the new one.
    #[default]
    Replace,
    /// Run the new job after the queued one.
    Append,
    /// Keep the queued job and drop the new one.
    Keep,
}

impl ConflictStrategy {
    /// Integer code used by the flat job record.
    pub fn code(self) -> i64 {
        match self {
            Self::Replace => 0,
            Self::Append => 1,
            Self::Keep => 2,
        }
    }

    /// Inverse of [`ConflictStrategy::code`].
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Replace),
            1 => Some(Self::Append),
            2 => Some(Self::Keep),
            _ => None,
        }
    }
}

/// Outcome of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobResult {
    /// Work is done (or was deliberately dropped).
    Success,
    /// Transient failure, run again later.
    Retry,
    /// Terminal failure for this attempt.
    Failure,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Retry => "retry",
            Self::Failure => "failure",
        };
        f.write_str(label)
    }
}
