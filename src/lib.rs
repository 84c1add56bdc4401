//! Cadre - sequential pipeline runner for specialized AI workers

pub mod context;
pub mod error;
pub mod evaluator;
pub mod event_log;
pub mod executor;
pub mod modes;
pub mod pipeline;
pub mod registry;
pub mod run_store;
pub mod spec;
pub mod worker;

pub use context::{compose_instructions, PipelineInputs};
pub use error::{CadreError, FixSuggestion};
pub use evaluator::{Evaluator, LlmEvaluator, Score, StaticEvaluator};
pub use event_log::{Event, EventKind, EventLog};
pub use executor::{CancelFlag, PipelineExecutor, PipelineRun, RunStatus, TaskResult, TaskState};
pub use modes::{ModeController, ModeReport, RunMode, TestReport, TrainingReport, TrainingState};
pub use pipeline::Pipeline;
pub use registry::{TaskStore, WorkerRegistry};
pub use run_store::RunStore;
pub use spec::{PipelineSpec, TaskSpec, WorkerSpec};
