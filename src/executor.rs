//! Pipeline executor
//!
//! Executes every task of a validated [`Pipeline`] in declared order,
//! strictly sequentially: a task starts only after all of its upstream tasks
//! have succeeded, each task is invoked at most once per run, and the first
//! failure aborts the run before any downstream task starts. Worker
//! invocation is treated as an opaque blocking call with a bounded timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context::{compose_instructions, PipelineInputs};
use crate::error::CadreError;
use crate::event_log::{EventKind, EventLog};
use crate::pipeline::Pipeline;
use crate::spec::TaskSpec;
use crate::worker::{create_capability, InvocationRequest, WorkerCapability};

/// Default timeout for a single worker invocation (5 minutes)
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle of a single task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Lifecycle of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Completed,
    /// The run stopped at `task_id`; no downstream task was invoked
    Aborted { task_id: String, cause: String },
}

/// Execution record of one task, produced exactly once per task per run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// Raw worker output (empty on failure)
    pub output: String,
    pub success: bool,
    /// Error detail if the task failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn success(task_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            output: output.into(),
            success: true,
            error: None,
            finished_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn failure(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            output: String::new(),
            success: false,
            error: Some(error.into()),
            finished_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// One pipeline execution: ordered task results plus overall status
///
/// Owned exclusively by the executor while running; serializable afterwards
/// as the prior-run record that feeds replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub pipeline: String,
    /// Assigned by the run store on save; 0 until persisted
    pub sequence: u64,
    pub started_at: DateTime<Utc>,
    /// Inputs the run was started with, recorded so replay can reuse them
    pub inputs: PipelineInputs,
    pub status: RunStatus,
    pub results: Vec<TaskResult>,
}

impl PipelineRun {
    pub fn new(pipeline: impl Into<String>, inputs: PipelineInputs) -> Self {
        Self {
            pipeline: pipeline.into(),
            sequence: 0,
            started_at: Utc::now(),
            inputs,
            status: RunStatus::Created,
            results: Vec::new(),
        }
    }

    /// Result for a task, if it executed in this run
    pub fn result_for(&self, task_id: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }

    /// A task's state as recorded by this run; `Running` is only ever
    /// observable through the event log
    pub fn task_state(&self, task_id: &str) -> TaskState {
        match self.result_for(task_id) {
            Some(result) if result.success => TaskState::Succeeded,
            Some(_) => TaskState::Failed,
            None => TaskState::Pending,
        }
    }

    /// The aggregated output: the last task's result
    pub fn final_output(&self) -> Option<&str> {
        self.results.last().map(|r| r.output.as_str())
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Task id and cause if the run aborted
    pub fn abort_info(&self) -> Option<(&str, &str)> {
        match &self.status {
            RunStatus::Aborted { task_id, cause } => Some((task_id, cause)),
            _ => None,
        }
    }

    pub(crate) fn push_result(&mut self, result: TaskResult) {
        self.results.push(result);
    }
}

/// Cooperative cancellation flag, checked between tasks
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Executes a pipeline's tasks in declared order against cached worker
/// capabilities, with event logging and cooperative cancellation
pub struct PipelineExecutor {
    pipeline: Arc<Pipeline>,
    /// Cached capabilities (lock-free)
    capabilities: DashMap<String, Arc<dyn WorkerCapability>>,
    invocation_timeout: Duration,
    event_log: EventLog,
    cancel: CancelFlag,
}

impl PipelineExecutor {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            capabilities: DashMap::new(),
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            event_log: EventLog::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Bound each worker invocation to `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Pre-seed a capability, bypassing the factory (used by tests to
    /// observe requests made to a [`crate::worker::MockWorker`])
    pub fn insert_capability(&self, name: impl Into<String>, capability: Arc<dyn WorkerCapability>) {
        self.capabilities.insert(name.into(), capability);
    }

    /// Flag checked before each task; cancelling aborts at the next boundary
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Per-task execution log for the runs this executor performed
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Execute every task once, in declared order
    pub async fn execute(&self, inputs: &PipelineInputs) -> Result<PipelineRun, CadreError> {
        self.execute_seeded(inputs, Vec::new()).await
    }

    /// Execute with results reused from a prior run: `seeded` must hold one
    /// successful result per leading task, in declared order; execution
    /// starts at the first unseeded task.
    pub async fn execute_seeded(
        &self,
        inputs: &PipelineInputs,
        seeded: Vec<TaskResult>,
    ) -> Result<PipelineRun, CadreError> {
        let tasks = self.pipeline.tasks_ordered();
        if seeded.len() > tasks.len() {
            return Err(CadreError::InvalidArgument(format!(
                "{} reused results for a pipeline of {} tasks",
                seeded.len(),
                tasks.len()
            )));
        }
        for (task, result) in tasks.iter().zip(&seeded) {
            if result.task_id != task.id || !result.success {
                return Err(CadreError::InvalidArgument(format!(
                    "reused result '{}' does not match a successful run of task '{}'",
                    result.task_id, task.id
                )));
            }
        }

        let start_index = seeded.len();
        let run_start = Instant::now();
        let mut run = PipelineRun::new(&self.pipeline.name, inputs.clone());
        run.results = seeded;
        run.status = RunStatus::Running;

        self.event_log.emit(EventKind::PipelineStarted {
            pipeline: self.pipeline.name.clone(),
            task_count: tasks.len(),
        });

        for task in tasks.iter().skip(start_index) {
            if self.cancel.is_cancelled() {
                let cause = "cancelled before task started".to_string();
                self.event_log.emit(EventKind::PipelineAborted {
                    task_id: task.id.clone(),
                    error: cause.clone(),
                });
                run.status = RunStatus::Aborted {
                    task_id: task.id.clone(),
                    cause,
                };
                return Ok(run);
            }

            let result = self.execute_task(task, inputs, &run).await?;
            let failed = !result.success;
            let cause = result.error.clone();
            run.push_result(result);

            if failed {
                let cause = cause.unwrap_or_else(|| "task failed".to_string());
                self.event_log.emit(EventKind::PipelineAborted {
                    task_id: task.id.clone(),
                    error: cause.clone(),
                });
                run.status = RunStatus::Aborted {
                    task_id: task.id.clone(),
                    cause,
                };
                return Ok(run);
            }
        }

        self.event_log.emit(EventKind::PipelineCompleted {
            final_output_len: run.final_output().map_or(0, str::len),
            total_duration_ms: run_start.elapsed().as_millis() as u64,
        });
        run.status = RunStatus::Completed;
        Ok(run)
    }

    /// Execute one task: compose instructions, invoke the worker once,
    /// record the outcome. Worker failures and timeouts become a failed
    /// [`TaskResult`]; a missing upstream result is an internal defect and
    /// propagates as a hard error instead.
    #[instrument(skip(self, inputs, run), fields(task_id = %task.id))]
    async fn execute_task(
        &self,
        task: &TaskSpec,
        inputs: &PipelineInputs,
        run: &PipelineRun,
    ) -> Result<TaskResult, CadreError> {
        let worker = self.pipeline.worker_for(task)?;
        let task_start = Instant::now();

        self.event_log.emit(EventKind::TaskStarted {
            task_id: task.id.clone(),
            worker_id: worker.id.clone(),
        });
        debug!(worker = %worker.id, state = ?TaskState::Running, "executing task");

        let instructions = compose_instructions(task, inputs, run)?;
        self.event_log.emit(EventKind::InstructionsComposed {
            task_id: task.id.clone(),
            instructions_len: instructions.len(),
            upstream_count: task.context.len(),
        });
        if worker.verbose {
            tracing::info!(task = %task.id, "composed instructions:\n{instructions}");
        }

        let mut request = InvocationRequest::new(instructions)
            .with_role(&worker.role)
            .with_objective(&worker.objective)
            .with_constraints(&worker.constraints)
            .with_expected_output(&task.expected_output);
        if let Some(model) = worker.model.clone().or_else(|| self.pipeline.model.clone()) {
            request = request.with_model(model);
        }
        let prompt_len = request.user_prompt().len();

        let capability = match self.capability(&self.pipeline.capability) {
            Ok(capability) => capability,
            Err(detail) => {
                let error = CadreError::WorkerInvocation {
                    task_id: task.id.clone(),
                    detail,
                };
                return Ok(self.record_failure(task, error, task_start));
            }
        };

        self.event_log.emit(EventKind::WorkerInvoked {
            task_id: task.id.clone(),
            capability: capability.name().to_string(),
            prompt_len,
        });

        let outcome = tokio::time::timeout(self.invocation_timeout, capability.invoke(request)).await;
        let result = match outcome {
            Err(_) => {
                let error = CadreError::WorkerTimeout {
                    task_id: task.id.clone(),
                    seconds: self.invocation_timeout.as_secs(),
                };
                self.record_failure(task, error, task_start)
            }
            Ok(Err(invocation_error)) => {
                let error = CadreError::WorkerInvocation {
                    task_id: task.id.clone(),
                    detail: format!("{invocation_error:#}"),
                };
                self.record_failure(task, error, task_start)
            }
            Ok(Ok(response)) => {
                self.event_log.emit(EventKind::WorkerResponded {
                    task_id: task.id.clone(),
                    output_len: response.content.len(),
                });
                if worker.verbose {
                    tracing::info!(task = %task.id, "worker output:\n{}", response.content);
                }
                let duration = task_start.elapsed();
                self.event_log.emit(EventKind::TaskCompleted {
                    task_id: task.id.clone(),
                    output_len: response.content.len(),
                    duration_ms: duration.as_millis() as u64,
                });
                TaskResult::success(&task.id, response.content).with_duration(duration)
            }
        };

        Ok(result)
    }

    fn record_failure(&self, task: &TaskSpec, error: CadreError, task_start: Instant) -> TaskResult {
        let duration = task_start.elapsed();
        let detail = error.to_string();
        self.event_log.emit(EventKind::TaskFailed {
            task_id: task.id.clone(),
            error: detail.clone(),
            duration_ms: duration.as_millis() as u64,
        });
        TaskResult::failure(&task.id, detail).with_duration(duration)
    }

    /// Get or create a cached capability (atomic via DashMap entry API)
    fn capability(&self, name: &str) -> Result<Arc<dyn WorkerCapability>, String> {
        use dashmap::mapref::entry::Entry;

        match self.capabilities.entry(name.to_string()) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(e) => {
                let capability: Arc<dyn WorkerCapability> = Arc::from(
                    create_capability(name)
                        .map_err(|err| format!("cannot create capability '{name}': {err:#}"))?,
                );
                e.insert(Arc::clone(&capability));
                Ok(capability)
            }
        }
    }
}
