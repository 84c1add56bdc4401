//! Validated pipeline loaded from a [`PipelineSpec`]
//!
//! Loading registers every spec and checks referential integrity before
//! anything executes: assigned workers must exist, upstream task references
//! must point at tasks declared earlier. Because every dependency edge goes
//! backwards in declared order, the declared order is a topological order and
//! cycles cannot occur. Malformed pipelines never begin executing.

use std::sync::Arc;

use crate::error::CadreError;
use crate::registry::{TaskStore, WorkerRegistry};
use crate::spec::{PipelineSpec, TaskSpec, WorkerSpec};

#[derive(Debug)]
pub struct Pipeline {
    pub name: String,
    /// Default worker capability backend
    pub capability: String,
    /// Default model, None = backend default
    pub model: Option<String>,
    workers: WorkerRegistry,
    tasks: TaskStore,
}

impl Pipeline {
    /// Build and validate a pipeline. Fails with
    /// [`CadreError::InvalidPipelineDefinition`] on any broken reference,
    /// before any worker is invoked.
    pub fn from_spec(spec: PipelineSpec) -> Result<Self, CadreError> {
        let mut workers = WorkerRegistry::new();
        for worker in spec.workers {
            workers.register(worker)?;
        }

        let mut tasks = TaskStore::new();
        for task in spec.tasks {
            tasks.register(task)?;
        }

        validate_references(&workers, &tasks)?;

        Ok(Self {
            name: spec.name,
            capability: spec.capability,
            model: spec.model,
            workers,
            tasks,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, CadreError> {
        Self::from_spec(PipelineSpec::from_yaml(yaml)?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, CadreError> {
        Self::from_spec(PipelineSpec::from_file(path)?)
    }

    /// Tasks in declared (execution) order
    pub fn tasks_ordered(&self) -> &[Arc<TaskSpec>] {
        self.tasks.ordered()
    }

    pub fn task(&self, id: &str) -> Result<&Arc<TaskSpec>, CadreError> {
        self.tasks.resolve(id)
    }

    /// Position of a task in declared order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.position(id)
    }

    pub fn worker(&self, id: &str) -> Result<&Arc<WorkerSpec>, CadreError> {
        self.workers.resolve(id)
    }

    /// The worker assigned to a task
    pub fn worker_for(&self, task: &TaskSpec) -> Result<&Arc<WorkerSpec>, CadreError> {
        self.workers.resolve(&task.worker)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

/// Check every cross-reference in the definition.
///
/// Upstream references must resolve to a task declared strictly earlier;
/// self-references and forward references are both rejected here, which is
/// what makes the declared order a valid topological order.
fn validate_references(workers: &WorkerRegistry, tasks: &TaskStore) -> Result<(), CadreError> {
    if tasks.is_empty() {
        return Err(CadreError::InvalidPipelineDefinition {
            reason: "pipeline declares no tasks".to_string(),
        });
    }

    for (position, task) in tasks.ordered().iter().enumerate() {
        if workers.resolve(&task.worker).is_err() {
            return Err(CadreError::InvalidPipelineDefinition {
                reason: format!(
                    "task '{}' is assigned to unknown worker '{}'",
                    task.id, task.worker
                ),
            });
        }

        for upstream in &task.context {
            match tasks.position(upstream) {
                None => {
                    return Err(CadreError::InvalidPipelineDefinition {
                        reason: format!(
                            "task '{}' references unknown upstream task '{}'",
                            task.id, upstream
                        ),
                    });
                }
                Some(upstream_pos) if upstream_pos >= position => {
                    return Err(CadreError::InvalidPipelineDefinition {
                        reason: format!(
                            "task '{}' references '{}', which is not declared earlier \
                             in the pipeline",
                            task.id, upstream
                        ),
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}
