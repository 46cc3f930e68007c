// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Jobwerk Bridge: abstraction over the platform's deferred-execution
// facility.  The dispatcher only ever talks to the `Scheduler` trait; the
// `TimerScheduler` backend implements it in-process with tokio timers and an
// optional SQLite store for jobs that must survive a restart.

pub mod connectivity;
pub mod store;
pub mod timer;
pub mod traits;

pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use store::{ScheduleStore, StoredJob};
pub use timer::TimerScheduler;
pub use traits::{ExecutionBackend, ExecutionRequest, Scheduler, TicketId};
