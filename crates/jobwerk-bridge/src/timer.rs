// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process scheduler backend driven by tokio timers.
//
// Used on hosts without a native job service (desktop, CI, embedded Linux).
// Each scheduled job gets a ticket and a timer task; when the timer fires
// (and the network is up, if the job needs it) an `ExecutionRequest` is sent
// down the channel returned from `TimerScheduler::new`.  The executing side
// reports back through `ExecutionBackend::retry` / `finish`.
//
// Conflict strategies are applied per dedup key (`component:action`):
//   Replace: queued (not yet running) entries for the key are cancelled
//   Keep: the new job is dropped if a queued (not yet running) entry exists
//   Append: the new job becomes due no earlier than the last entry

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use jobwerk_core::config::SchedulerConfig;
use jobwerk_core::error::{JobwerkError, Result};
use jobwerk_core::{Backoff, ConflictStrategy, JobInfo};

use crate::connectivity::ConnectivityMonitor;
use crate::store::{ScheduleStore, StoredJob};
use crate::traits::{ExecutionBackend, ExecutionRequest, Scheduler, TicketId};

/// Longest delay a timer is armed with.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// One scheduled job under a dedup key.
struct Slot {
    ticket: TicketId,
    due: Instant,
    /// Timer task; `None` once the timer fired and the job is executing.
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TimerState {
    slots: HashMap<String, Vec<Slot>>,
}

impl TimerState {
    fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    fn slot_mut(&mut self, key: &str, ticket: TicketId) -> Option<&mut Slot> {
        self.slots
            .get_mut(key)?
            .iter_mut()
            .find(|slot| slot.ticket == ticket)
    }

    fn remove(&mut self, key: &str, ticket: TicketId) -> Option<Slot> {
        let slots = self.slots.get_mut(key)?;
        let index = slots.iter().position(|slot| slot.ticket == ticket)?;
        let slot = slots.remove(index);
        if slots.is_empty() {
            self.slots.remove(key);
        }
        Some(slot)
    }
}

/// Scheduler backend that keeps jobs in memory and fires them with tokio timers.
///
/// Cheap to clone; clones share the same schedule.
#[derive(Clone)]
pub struct TimerScheduler {
    state: Arc<Mutex<TimerState>>,
    requests: mpsc::UnboundedSender<ExecutionRequest>,
    connectivity: ConnectivityMonitor,
    store: Option<Arc<Mutex<ScheduleStore>>>,
    config: SchedulerConfig,
}

impl TimerScheduler {
    /// Create a backend. Due jobs arrive on the returned receiver.
    pub fn new(
        config: SchedulerConfig,
        connectivity: ConnectivityMonitor,
        store: Option<ScheduleStore>,
    ) -> (Self, mpsc::UnboundedReceiver<ExecutionRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = if config.persist_jobs {
            store.map(|s| Arc::new(Mutex::new(s)))
        } else {
            None
        };
        let scheduler = Self {
            state: Arc::new(Mutex::new(TimerState::default())),
            requests: tx,
            connectivity,
            store,
            config,
        };
        (scheduler, rx)
    }

    /// Number of jobs queued or executing.
    pub fn scheduled_count(&self) -> usize {
        self.lock_state().len()
    }

    /// Number of jobs queued for the given dedup key, including running ones.
    pub fn count_for_key(&self, dedup_key: &str) -> usize {
        self.lock_state()
            .slots
            .get(dedup_key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Re-arm every job in the durable store. Call once at startup, from
    /// inside the runtime. Returns how many jobs were restored.
    pub fn restore(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let handle = runtime_handle()?;
        let stored = lock(store).load_all()?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut state = self.lock_state();
        for entry in &stored {
            debug!(
                ticket = %entry.ticket,
                job = %entry.job,
                created_at = %entry.created_at,
                run_attempt = entry.run_attempt,
                "restoring persisted job"
            );
            let remaining = Duration::from_millis((entry.due_at_ms - now_ms).max(0) as u64);
            let due = Instant::now() + remaining;
            let timer = self.arm(&handle, entry.ticket, entry.job.clone(), due, entry.run_attempt);
            state.slots.entry(entry.job.dedup_key()).or_default().push(Slot {
                ticket: entry.ticket,
                due,
                timer: Some(timer),
            });
        }

        info!(count = stored.len(), "restored persisted jobs");
        Ok(stored.len())
    }

    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        lock(&self.state)
    }

    /// Spawn the timer task for one ticket.
    fn arm(
        &self,
        handle: &Handle,
        ticket: TicketId,
        job: JobInfo,
        due: Instant,
        run_attempt: u32,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let requests = self.requests.clone();
        let connectivity = self.connectivity.clone();

        handle.spawn(async move {
            tokio::time::sleep_until(due).await;
            if job.is_network_required() && !connectivity.is_online() {
                debug!(job = %job, "waiting for network");
                connectivity.wait_online().await;
            }

            let key = job.dedup_key();
            {
                let mut state = lock(&state);
                match state.slot_mut(&key, ticket) {
                    Some(slot) => slot.timer = None,
                    // Replaced while we were waiting.
                    None => return,
                }
            }

            debug!(job = %job, %ticket, run_attempt, "job due");
            let request = ExecutionRequest {
                ticket,
                job,
                run_attempt,
            };
            if requests.send(request).is_err() {
                warn!(%ticket, "execution channel closed, dropping due job");
                lock(&state).remove(&key, ticket);
            }
        })
    }

    fn persist(&self, stored: &StoredJob) -> Result<()> {
        match &self.store {
            Some(store) if stored.job.is_persistent() => lock(store).save(stored),
            _ => Ok(()),
        }
    }

    fn forget(&self, ticket: &TicketId) {
        if let Some(store) = &self.store {
            if let Err(e) = lock(store).delete(ticket) {
                warn!(%ticket, error = %e, "failed to remove persisted job");
            }
        }
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(&self, job: &JobInfo, delay: Duration) -> Result<()> {
        let handle = runtime_handle()?;
        if self.requests.is_closed() {
            return Err(JobwerkError::Scheduling("execution channel closed".into()));
        }

        let key = job.dedup_key();
        let now = Instant::now();
        let mut due = now + delay.min(MAX_DELAY);
        let mut state = self.lock_state();

        match job.conflict_strategy() {
            ConflictStrategy::Keep => {
                // A running entry does not count: it may be redispatching itself.
                let queued = state
                    .slots
                    .get(&key)
                    .is_some_and(|slots| slots.iter().any(|slot| slot.timer.is_some()));
                if queued {
                    debug!(job = %job, "job already scheduled, keeping existing");
                    return Ok(());
                }
            }
            ConflictStrategy::Replace => {
                if let Some(slots) = state.slots.get_mut(&key) {
                    let mut replaced = Vec::new();
                    slots.retain_mut(|slot| {
                        if let Some(timer) = slot.timer.take() {
                            timer.abort();
                            replaced.push(slot.ticket);
                            false
                        } else {
                            true
                        }
                    });
                    if slots.is_empty() {
                        state.slots.remove(&key);
                    }
                    for ticket in &replaced {
                        self.forget(ticket);
                    }
                    if !replaced.is_empty() {
                        debug!(job = %job, count = replaced.len(), "replaced queued jobs");
                    }
                }
            }
            ConflictStrategy::Append => {
                if let Some(last) = state.slots.get(&key).and_then(|slots| slots.last()) {
                    due = due.max(last.due);
                }
            }
        }

        if state.len() >= self.config.max_scheduled_jobs {
            return Err(JobwerkError::Scheduling(format!(
                "scheduler is at capacity ({} jobs)",
                self.config.max_scheduled_jobs
            )));
        }

        let ticket = TicketId::new();
        let due_at_ms = wall_clock_due(due.duration_since(now));
        self.persist(&StoredJob::new(ticket, job.clone(), due_at_ms))
            .map_err(|e| JobwerkError::Scheduling(format!("persist job: {e}")))?;

        let timer = self.arm(&handle, ticket, job.clone(), due, 0);
        state.slots.entry(key).or_default().push(Slot {
            ticket,
            due,
            timer: Some(timer),
        });

        debug!(
            job = %job,
            %ticket,
            delay_ms = due.duration_since(now).as_millis() as u64,
            "job scheduled"
        );
        Ok(())
    }
}

impl ExecutionBackend for TimerScheduler {
    fn retry(&self, request: ExecutionRequest) -> Result<()> {
        let handle = runtime_handle()?;
        let backoff = Backoff::Exponential {
            base: request.job.min_initial_backoff(),
            max: self.config.max_backoff(),
        };
        let delay = backoff.delay(request.run_attempt).min(MAX_DELAY);
        let next_attempt = request.run_attempt.saturating_add(1);
        let due = Instant::now() + delay;
        let key = request.job.dedup_key();

        if let Some(store) = &self.store {
            if request.job.is_persistent() {
                let due_at_ms = wall_clock_due(delay);
                if let Err(e) = lock(store).reschedule(&request.ticket, due_at_ms, next_attempt) {
                    warn!(ticket = %request.ticket, error = %e, "failed to persist retry");
                }
            }
        }

        let timer = self.arm(&handle, request.ticket, request.job.clone(), due, next_attempt);
        let mut state = self.lock_state();
        match state.slot_mut(&key, request.ticket) {
            Some(slot) => {
                slot.due = due;
                slot.timer = Some(timer);
            }
            None => state.slots.entry(key).or_default().push(Slot {
                ticket: request.ticket,
                due,
                timer: Some(timer),
            }),
        }

        info!(
            job = %request.job,
            run_attempt = next_attempt,
            delay_ms = delay.as_millis() as u64,
            "job retry scheduled"
        );
        Ok(())
    }

    fn finish(&self, request: &ExecutionRequest) {
        if let Some(slot) = self.lock_state().remove(&request.job.dedup_key(), request.ticket) {
            if let Some(timer) = slot.timer {
                timer.abort();
            }
        }
        self.forget(&request.ticket);
        debug!(job = %request.job, ticket = %request.ticket, "job finished");
    }
}

/// Wall-clock due time in epoch milliseconds, saturating on overflow.
fn wall_clock_due(delay: Duration) -> i64 {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp_millis().saturating_add(delay_ms)
}

fn runtime_handle() -> Result<Handle> {
    Handle::try_current()
        .map_err(|_| JobwerkError::Scheduling("no async runtime available".into()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ConnectivityState;

    fn job(action: &str, strategy: ConflictStrategy) -> JobInfo {
        JobInfo::builder()
            .action(action)
            .component("inbox")
            .conflict_strategy(strategy)
            .build()
            .expect("build job")
    }

    fn scheduler(config: SchedulerConfig) -> (TimerScheduler, mpsc::UnboundedReceiver<ExecutionRequest>) {
        TimerScheduler::new(config, ConnectivityMonitor::default(), None)
    }

    #[test]
    fn schedule_without_runtime_fails() {
        let (scheduler, _rx) = scheduler(SchedulerConfig::default());
        let result = scheduler.schedule(&job("a", ConflictStrategy::Replace), Duration::ZERO);
        assert!(matches!(result, Err(JobwerkError::Scheduling(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        scheduler
            .schedule(&job("ACTION_UPDATE", ConflictStrategy::Replace), Duration::from_secs(10))
            .expect("schedule");

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let request = rx.try_recv().expect("request after delay");
        assert_eq!(request.job.action(), "ACTION_UPDATE");
        assert_eq!(request.run_attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_cancels_queued_job() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        let first = job("ACTION_UPDATE", ConflictStrategy::Replace)
            .to_builder()
            .extra("n", 1)
            .build()
            .expect("build");
        let second = first.to_builder().extra("n", 2).build().expect("build");

        scheduler.schedule(&first, Duration::from_secs(5)).expect("first");
        scheduler.schedule(&second, Duration::from_secs(5)).expect("second");
        assert_eq!(scheduler.count_for_key(&first.dedup_key()), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let request = rx.try_recv().expect("one request");
        assert_eq!(request.job, second);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn keep_ignores_new_job() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        let first = job("ACTION_SYNC", ConflictStrategy::Keep)
            .to_builder()
            .extra("n", 1)
            .build()
            .expect("build");
        let second = first.to_builder().extra("n", 2).build().expect("build");

        scheduler.schedule(&first, Duration::from_secs(5)).expect("first");
        scheduler.schedule(&second, Duration::ZERO).expect("second");

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rx.try_recv().expect("request").job, first);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn keep_does_not_count_the_running_entry() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        let job = job("ACTION_SYNC", ConflictStrategy::Keep);
        scheduler.schedule(&job, Duration::ZERO).expect("first");
        tokio::time::sleep(Duration::from_millis(1)).await;
        let running = rx.try_recv().expect("first run");

        // The running job schedules its own follow-up, then finishes.
        scheduler.schedule(&job, Duration::from_secs(60)).expect("follow-up");
        scheduler.finish(&running);
        assert_eq!(scheduler.count_for_key(&job.dedup_key()), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rx.try_recv().expect("follow-up run").job, job);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delay_is_persisted_without_wrapping() {
        let store = ScheduleStore::open_in_memory().expect("store");
        let (scheduler, _rx) =
            TimerScheduler::new(SchedulerConfig::default(), ConnectivityMonitor::default(), Some(store));
        let job = job("ACTION_LATER", ConflictStrategy::Replace)
            .to_builder()
            .persistent(true)
            .build()
            .expect("build");
        let now_ms = chrono::Utc::now().timestamp_millis();

        scheduler.schedule(&job, Duration::MAX).expect("schedule");

        let stored = scheduler
            .store
            .as_ref()
            .map(|s| lock(s).load_all().expect("load"))
            .expect("store present");
        assert!(stored[0].due_at_ms > now_ms);
    }

    #[test]
    fn wall_clock_due_saturates() {
        assert_eq!(wall_clock_due(Duration::MAX), i64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn append_runs_after_existing() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        let first = job("ACTION_SEND", ConflictStrategy::Append)
            .to_builder()
            .extra("n", 1)
            .build()
            .expect("build");
        let second = first.to_builder().extra("n", 2).build().expect("build");

        scheduler.schedule(&first, Duration::from_secs(10)).expect("first");
        scheduler.schedule(&second, Duration::from_secs(1)).expect("second");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let a = rx.try_recv().expect("first request");
        let b = rx.try_recv().expect("second request");
        assert_eq!(a.job, first);
        assert_eq!(b.job, second);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_limit_raises_scheduling_failure() {
        let config = SchedulerConfig {
            max_scheduled_jobs: 2,
            ..Default::default()
        };
        let (scheduler, _rx) = scheduler(config);
        scheduler
            .schedule(&job("a", ConflictStrategy::Replace), Duration::from_secs(60))
            .expect("a");
        scheduler
            .schedule(&job("b", ConflictStrategy::Replace), Duration::from_secs(60))
            .expect("b");
        let result = scheduler.schedule(&job("c", ConflictStrategy::Replace), Duration::from_secs(60));
        assert!(matches!(result, Err(JobwerkError::Scheduling(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn network_required_waits_for_connectivity() {
        let connectivity = ConnectivityMonitor::new(ConnectivityState::Offline);
        let (scheduler, mut rx) =
            TimerScheduler::new(SchedulerConfig::default(), connectivity.clone(), None);
        let job = job("ACTION_UPLOAD", ConflictStrategy::Replace)
            .to_builder()
            .network_required(true)
            .build()
            .expect("build");

        scheduler.schedule(&job, Duration::ZERO).expect("schedule");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());

        connectivity.set_state(ConnectivityState::Online);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(rx.try_recv().expect("request").job, job);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backs_off_and_counts_attempts() {
        let (scheduler, mut rx) = scheduler(SchedulerConfig::default());
        let job = job("ACTION_UPLOAD", ConflictStrategy::Replace);
        scheduler.schedule(&job, Duration::ZERO).expect("schedule");
        tokio::time::sleep(Duration::from_millis(1)).await;
        let request = rx.try_recv().expect("first run");

        scheduler.retry(request).expect("retry");
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let request = rx.try_recv().expect("second run");
        assert_eq!(request.run_attempt, 1);

        scheduler.finish(&request);
        assert_eq!(scheduler.scheduled_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_jobs_are_stored_and_restored() {
        let store = ScheduleStore::open_in_memory().expect("store");
        let (scheduler, _rx) =
            TimerScheduler::new(SchedulerConfig::default(), ConnectivityMonitor::default(), Some(store));
        let job = job("ACTION_UPLOAD", ConflictStrategy::Replace)
            .to_builder()
            .persistent(true)
            .build()
            .expect("build");
        scheduler.schedule(&job, Duration::from_secs(60)).expect("schedule");

        let stored = scheduler
            .store
            .as_ref()
            .map(|s| lock(s).load_all().expect("load"))
            .expect("store present");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].job, job);

        // A fresh backend over the same rows picks the job back up.
        let store = ScheduleStore::open_in_memory().expect("store");
        store.save(&stored[0]).expect("save");
        let (restored, mut rx) =
            TimerScheduler::new(SchedulerConfig::default(), ConnectivityMonitor::default(), Some(store));
        assert_eq!(restored.restore().expect("restore"), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(rx.try_recv().expect("restored request").job, job);
    }
}
