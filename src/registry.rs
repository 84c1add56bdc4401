//! Identifier-based registries for worker and task specs
//!
//! Arena-style: specs are registered once at load time and resolved by id
//! afterwards, never mutated. Registration rejects duplicates, resolution
//! rejects unknowns; cross-reference integrity is checked separately in
//! [`crate::pipeline`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CadreError;
use crate::spec::{TaskSpec, WorkerSpec};

/// Holds named worker definitions; pure lookup, no behavior
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<WorkerSpec>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: WorkerSpec) -> Result<(), CadreError> {
        if self.workers.contains_key(&spec.id) {
            return Err(CadreError::DuplicateIdentifier {
                kind: "worker",
                id: spec.id,
            });
        }
        self.workers.insert(spec.id.clone(), Arc::new(spec));
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<&Arc<WorkerSpec>, CadreError> {
        self.workers.get(id).ok_or_else(|| CadreError::UnknownIdentifier {
            kind: "worker",
            id: id.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Holds named task definitions and remembers declared order
#[derive(Debug, Default)]
pub struct TaskStore {
    /// Tasks in declared order; execution follows this order
    ordered: Vec<Arc<TaskSpec>>,
    /// task id -> position in `ordered`
    index: HashMap<String, usize>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: TaskSpec) -> Result<(), CadreError> {
        if self.index.contains_key(&spec.id) {
            return Err(CadreError::DuplicateIdentifier {
                kind: "task",
                id: spec.id,
            });
        }
        self.index.insert(spec.id.clone(), self.ordered.len());
        self.ordered.push(Arc::new(spec));
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<&Arc<TaskSpec>, CadreError> {
        self.position(id)
            .map(|i| &self.ordered[i])
            .ok_or_else(|| CadreError::UnknownIdentifier {
                kind: "task",
                id: id.to_string(),
            })
    }

    /// Position of a task in declared order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Tasks in declared (execution) order
    pub fn ordered(&self) -> &[Arc<TaskSpec>] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
