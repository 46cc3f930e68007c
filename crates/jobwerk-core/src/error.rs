// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Jobwerk.

use thiserror::Error;

/// Top-level error type for all Jobwerk operations.
#[derive(Debug, Error)]
pub enum JobwerkError {
    // -- Job definition --
    #[error("job is missing an action")]
    MissingAction,

    #[error("invalid rate limit {limit_id}: rate must be at least 1 and window non-zero")]
    InvalidRateLimit { limit_id: String },

    #[error("malformed job record: {0}")]
    Record(String),

    // -- Scheduling / execution --
    /// The platform scheduling call failed; the job was never queued.
    #[error("scheduling failed: {0}")]
    Scheduling(String),

    #[error("executor {0} is closed")]
    ExecutorClosed(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JobwerkError>;
