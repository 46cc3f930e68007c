// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jobwerk Dispatch: the orchestration layer.  Computes effective delays from
// rate limits, hands jobs to a `Scheduler`, buffers jobs the scheduler could
// not accept, and runs due jobs against registered components with a bounded
// retry policy.

pub mod component;
pub mod dispatcher;
pub mod executor;
pub mod pending;
pub mod rate_limiter;
pub mod readiness;
pub mod runner;
pub mod worker;

pub use component::{ComponentRegistry, JobComponent};
pub use dispatcher::JobDispatcher;
pub use executor::SerialExecutor;
pub use pending::{PendingDispatch, PendingQueue};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
pub use readiness::AppReadiness;
pub use runner::JobRunner;
pub use worker::JobWorker;
