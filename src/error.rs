//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum CadreError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate {kind} identifier '{id}'")]
    DuplicateIdentifier { kind: &'static str, id: String },

    #[error("unknown {kind} identifier '{id}'")]
    UnknownIdentifier { kind: &'static str, id: String },

    #[error("invalid pipeline definition: {reason}")]
    InvalidPipelineDefinition { reason: String },

    #[error("task '{task_id}' has no recorded result for upstream task '{upstream_id}'")]
    MissingUpstreamContext { task_id: String, upstream_id: String },

    #[error("worker invocation failed for task '{task_id}': {detail}")]
    WorkerInvocation { task_id: String, detail: String },

    #[error("worker for task '{task_id}' timed out after {seconds}s")]
    WorkerTimeout { task_id: String, seconds: u64 },

    #[error("no prior run recorded for pipeline '{pipeline}'")]
    NoPriorRun { pipeline: String },

    #[error("pipeline aborted at task '{task_id}': {cause}")]
    Execution { task_id: String, cause: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CadreError {
    /// Whether the error is a definition/usage mistake (fix the pipeline file
    /// or the invocation) as opposed to a transient execution failure
    /// (retrying may succeed).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CadreError::YamlParse(_)
                | CadreError::DuplicateIdentifier { .. }
                | CadreError::UnknownIdentifier { .. }
                | CadreError::InvalidPipelineDefinition { .. }
                | CadreError::NoPriorRun { .. }
                | CadreError::InvalidArgument(_)
        )
    }
}

impl FixSuggestion for CadreError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            CadreError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            CadreError::Io(_) => Some("Check file path and permissions"),
            CadreError::DuplicateIdentifier { .. } => {
                Some("Give every worker and task a unique id")
            }
            CadreError::UnknownIdentifier { .. } => {
                Some("Verify the id exists in the pipeline definition")
            }
            CadreError::InvalidPipelineDefinition { .. } => {
                Some("Upstream tasks must be declared before the tasks that consume them")
            }
            CadreError::MissingUpstreamContext { .. } => {
                Some("This indicates a bug in cadre itself - please report it")
            }
            CadreError::WorkerInvocation { .. } => {
                Some("Check the worker backend is reachable (API key set, CLI installed)")
            }
            CadreError::WorkerTimeout { .. } => {
                Some("Raise --timeout or simplify the task instructions")
            }
            CadreError::NoPriorRun { .. } => {
                Some("Run the pipeline at least once before replaying")
            }
            CadreError::Execution { .. } => {
                Some("Inspect the failing task's error, then re-run or replay from it")
            }
            CadreError::InvalidArgument(_) => Some("Check the command-line arguments"),
        }
    }
}
