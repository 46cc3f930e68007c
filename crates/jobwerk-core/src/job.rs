// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job descriptions and their flat record encoding.
//
// A `JobInfo` is an immutable description of a deferred unit of work.  It is
// created through `JobInfoBuilder`, validated once at build time, and never
// mutated afterwards; a retry is a new dispatch of the same value.  Whenever a
// job crosses a process or persistence boundary it travels as a `JobRecord`.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{JobwerkError, Result};
use crate::types::{ComponentId, ConflictStrategy};

/// Floor for a job's initial retry backoff.
pub const MIN_INITIAL_BACKOFF: Duration = Duration::from_secs(30);

/// Flat key/value form of a job.
pub type JobRecord = Map<String, Value>;

const KEY_ACTION: &str = "action";
const KEY_EXTRAS: &str = "extras";
const KEY_COMPONENT: &str = "component";
const KEY_NETWORK_REQUIRED: &str = "network_required";
const KEY_INITIAL_DELAY: &str = "initial_delay";
const KEY_CONFLICT_STRATEGY: &str = "conflict_strategy";
const KEY_INITIAL_BACKOFF: &str = "initial_backoff";
const KEY_RATE_LIMIT_IDS: &str = "rate_limit_ids";
const KEY_PERSISTENT: &str = "persistent";

/// Immutable description of a deferred unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    action: String,
    component: ComponentId,
    network_required: bool,
    initial_delay: Duration,
    extras: Map<String, Value>,
    conflict_strategy: ConflictStrategy,
    min_initial_backoff: Duration,
    rate_limit_ids: BTreeSet<String>,
    persistent: bool,
}

impl JobInfo {
    pub fn builder() -> JobInfoBuilder {
        JobInfoBuilder::default()
    }

    /// Logical operation name.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Component that performs the job.
    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    pub fn is_network_required(&self) -> bool {
        self.network_required
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    pub fn conflict_strategy(&self) -> ConflictStrategy {
        self.conflict_strategy
    }

    /// Initial retry backoff, never below [`MIN_INITIAL_BACKOFF`].
    pub fn min_initial_backoff(&self) -> Duration {
        self.min_initial_backoff
    }

    /// Rate limits consumed each time this job executes.
    pub fn rate_limit_ids(&self) -> &BTreeSet<String> {
        &self.rate_limit_ids
    }

    /// Whether the job must survive a process restart.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Key used for conflict resolution at the scheduler.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.component, self.action)
    }

    /// A builder pre-populated with this job's values.
    pub fn to_builder(&self) -> JobInfoBuilder {
        JobInfoBuilder {
            action: Some(self.action.clone()),
            component: self.component.clone(),
            network_required: self.network_required,
            initial_delay: self.initial_delay,
            extras: self.extras.clone(),
            conflict_strategy: self.conflict_strategy,
            min_initial_backoff: self.min_initial_backoff,
            rate_limit_ids: self.rate_limit_ids.clone(),
            persistent: self.persistent,
        }
    }

    /// Encode as a flat record.
    pub fn to_record(&self) -> JobRecord {
        let mut record = JobRecord::new();
        record.insert(KEY_ACTION.into(), Value::String(self.action.clone()));
        record.insert(
            KEY_EXTRAS.into(),
            Value::String(Value::Object(self.extras.clone()).to_string()),
        );
        record.insert(
            KEY_COMPONENT.into(),
            Value::String(self.component.as_str().to_owned()),
        );
        record.insert(KEY_NETWORK_REQUIRED.into(), Value::Bool(self.network_required));
        record.insert(
            KEY_INITIAL_DELAY.into(),
            Value::from(duration_millis(self.initial_delay)),
        );
        record.insert(
            KEY_CONFLICT_STRATEGY.into(),
            Value::from(self.conflict_strategy.code()),
        );
        record.insert(
            KEY_INITIAL_BACKOFF.into(),
            Value::from(duration_millis(self.min_initial_backoff)),
        );
        let ids: Vec<Value> = self
            .rate_limit_ids
            .iter()
            .map(|id| Value::String(id.clone()))
            .collect();
        record.insert(
            KEY_RATE_LIMIT_IDS.into(),
            Value::String(Value::Array(ids).to_string()),
        );
        record.insert(KEY_PERSISTENT.into(), Value::Bool(self.persistent));
        record
    }

    /// Decode a flat record, substituting defaults for absent keys.
    pub fn from_record(record: &JobRecord) -> Result<Self> {
        let mut builder = JobInfo::builder()
            .network_required(record_bool(record, KEY_NETWORK_REQUIRED)?.unwrap_or(false))
            .initial_delay(record_millis(record, KEY_INITIAL_DELAY)?.unwrap_or_default())
            .persistent(record_bool(record, KEY_PERSISTENT)?.unwrap_or(false));

        if let Some(action) = record_str(record, KEY_ACTION)? {
            builder = builder.action(action);
        }
        if let Some(component) = record_str(record, KEY_COMPONENT)? {
            builder = builder.component(component);
        }
        if let Some(backoff) = record_millis(record, KEY_INITIAL_BACKOFF)? {
            builder = builder.initial_backoff(backoff);
        }

        if let Some(code) = record_i64(record, KEY_CONFLICT_STRATEGY)? {
            let strategy = ConflictStrategy::from_code(code).ok_or_else(|| {
                JobwerkError::Record(format!("unknown conflict strategy {code}"))
            })?;
            builder = builder.conflict_strategy(strategy);
        }

        if let Some(encoded) = record_str(record, KEY_EXTRAS)? {
            match serde_json::from_str::<Value>(encoded)? {
                Value::Object(extras) => builder = builder.extras(extras),
                Value::Null => {}
                other => {
                    return Err(JobwerkError::Record(format!(
                        "extras must be a JSON object, got {other}"
                    )));
                }
            }
        }

        if let Some(encoded) = record_str(record, KEY_RATE_LIMIT_IDS)? {
            let ids: Vec<String> = serde_json::from_str(encoded)?;
            for id in ids {
                builder = builder.add_rate_limit(id);
            }
        }

        builder.build()
    }
}

impl Hash for JobInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.action.hash(state);
        self.component.hash(state);
        self.network_required.hash(state);
        self.initial_delay.hash(state);
        for (key, value) in &self.extras {
            key.hash(state);
            value.to_string().hash(state);
        }
        self.conflict_strategy.hash(state);
        self.min_initial_backoff.hash(state);
        self.rate_limit_ids.hash(state);
        self.persistent.hash(state);
    }
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.component, self.action)
    }
}

/// Builder for [`JobInfo`].
#[derive(Debug, Clone)]
pub struct JobInfoBuilder {
    action: Option<String>,
    component: ComponentId,
    network_required: bool,
    initial_delay: Duration,
    extras: Map<String, Value>,
    conflict_strategy: ConflictStrategy,
    min_initial_backoff: Duration,
    rate_limit_ids: BTreeSet<String>,
    persistent: bool,
}

impl Default for JobInfoBuilder {
    fn default() -> Self {
        Self {
            action: None,
            component: ComponentId::default(),
            network_required: false,
            initial_delay: Duration::ZERO,
            extras: Map::new(),
            conflict_strategy: ConflictStrategy::default(),
            min_initial_backoff: MIN_INITIAL_BACKOFF,
            rate_limit_ids: BTreeSet::new(),
            persistent: false,
        }
    }
}

impl JobInfoBuilder {
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn component(mut self, component: impl Into<ComponentId>) -> Self {
        self.component = component.into();
        self
    }

    pub fn network_required(mut self, required: bool) -> Self {
        self.network_required = required;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Replace the whole extras payload.
    pub fn extras(mut self, extras: Map<String, Value>) -> Self {
        self.extras = extras;
        self
    }

    /// Add a single extras entry.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Initial retry backoff. Values below [`MIN_INITIAL_BACKOFF`] are raised to it.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.min_initial_backoff = backoff.max(MIN_INITIAL_BACKOFF);
        self
    }

    /// Attach a rate limit consumed by every execution of the job.
    pub fn add_rate_limit(mut self, limit_id: impl Into<String>) -> Self {
        self.rate_limit_ids.insert(limit_id.into());
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Validate and build. Fails if no non-empty action was set.
    pub fn build(self) -> Result<JobInfo> {
        let action = match self.action {
            Some(action) if !action.is_empty() => action,
            _ => return Err(JobwerkError::MissingAction),
        };

        Ok(JobInfo {
            action,
            component: self.component,
            network_required: self.network_required,
            initial_delay: self.initial_delay,
            extras: self.extras,
            conflict_strategy: self.conflict_strategy,
            min_initial_backoff: self.min_initial_backoff,
            rate_limit_ids: self.rate_limit_ids,
            persistent: self.persistent,
        })
    }
}

// ---------------------------------------------------------------------------
// Record field access
// ---------------------------------------------------------------------------

fn record_str<'a>(record: &'a JobRecord, key: &str) -> Result<Option<&'a str>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(JobwerkError::Record(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

fn record_bool(record: &JobRecord, key: &str) -> Result<Option<bool>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(JobwerkError::Record(format!(
            "{key} must be a bool, got {other}"
        ))),
    }
}

fn record_i64(record: &JobRecord, key: &str) -> Result<Option<i64>> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            JobwerkError::Record(format!("{key} must be an integer, got {value}"))
        }),
    }
}

/// Milliseconds for a record field, saturating at `i64::MAX`.
fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Millisecond field; negative values clamp to zero.
fn record_millis(record: &JobRecord, key: &str) -> Result<Option<Duration>> {
    Ok(record_i64(record, key)?.map(|ms| Duration::from_millis(ms.max(0) as u64)))
}
