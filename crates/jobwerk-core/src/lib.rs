// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jobwerk: Core job types and error definitions shared across all crates.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod types;

pub use backoff::Backoff;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::JobwerkConfig;
pub use error::JobwerkError;
pub use job::{JobInfo, JobInfoBuilder, JobRecord, MIN_INITIAL_BACKOFF};
pub use types::*;
