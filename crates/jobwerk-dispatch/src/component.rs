// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job components and the registry that resolves them.

use std::collections::HashMap;
use std::sync::Arc;

use jobwerk_core::{ComponentId, JobInfo, JobResult};

use crate::executor::SerialExecutor;

/// A module that performs jobs addressed to it.
///
/// `perform_job` runs on the executor returned by `executor` and may block.
pub trait JobComponent: Send + Sync {
    /// Disabled components have their jobs dropped.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Executor the job should run on.
    fn executor(&self, job: &JobInfo) -> SerialExecutor;

    /// Do the work.
    fn perform_job(&self, job: &JobInfo) -> JobResult;
}

/// Typed lookup from component id to component, filled in at startup.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<ComponentId, Arc<dyn JobComponent>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the component for `id`.
    pub fn register(&mut self, id: impl Into<ComponentId>, component: Arc<dyn JobComponent>) {
        self.components.insert(id.into(), component);
    }

    /// Builder-style [`ComponentRegistry::register`].
    pub fn with(mut self, id: impl Into<ComponentId>, component: Arc<dyn JobComponent>) -> Self {
        self.register(id, component);
        self
    }

    pub fn get(&self, id: &ComponentId) -> Option<Arc<dyn JobComponent>> {
        self.components.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
