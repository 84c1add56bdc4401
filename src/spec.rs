//! Pipeline definition structures
//!
//! A pipeline file declares named workers and an ordered list of tasks:
//!
//! ```yaml
//! name: code-review
//! capability: claude
//!
//! workers:
//!   - id: reviewer
//!     role: Senior code reviewer
//!     objective: Find correctness and style issues
//!
//! tasks:
//!   - id: review
//!     worker: reviewer
//!     instructions: "Review the code at ${input.codebase_path}"
//!     expected_output: A markdown list of findings
//! ```
//!
//! Specs are immutable once loaded; [`crate::pipeline::Pipeline`] owns them
//! for the lifetime of a run.

use serde::{Deserialize, Serialize};

use crate::error::CadreError;

/// A named worker: a role-bound capability that tasks are assigned to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSpec {
    /// Unique worker identifier
    pub id: String,

    /// Role description (becomes the persona of the system prompt)
    pub role: String,

    /// What the worker is trying to achieve
    pub objective: String,

    /// Behavioral constraints, free text
    #[serde(default)]
    pub constraints: String,

    /// Override the pipeline-level model for this worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Echo composed prompts and outputs while running
    #[serde(default)]
    pub verbose: bool,
}

/// A unit of work bound to one worker, with declared upstream dependencies
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskSpec {
    /// Unique task identifier
    pub id: String,

    /// Instructions template; `${input.NAME}` placeholders resolve from the
    /// pipeline inputs, upstream outputs are appended as context blocks
    pub instructions: String,

    /// Description of the output the worker should produce
    pub expected_output: String,

    /// Identifier of the assigned worker
    pub worker: String,

    /// Upstream task identifiers whose outputs are injected as context,
    /// in this order; each must be declared earlier in the pipeline
    #[serde(default)]
    pub context: Vec<String>,
}

/// A parsed pipeline definition file
#[derive(Debug, Deserialize, Serialize)]
pub struct PipelineSpec {
    /// Pipeline identity; keys run records and checkpoints
    pub name: String,

    /// Default worker capability backend (claude, openai, mock)
    #[serde(default = "default_capability")]
    pub capability: String,

    /// Default model, resolved per backend when absent
    #[serde(default)]
    pub model: Option<String>,

    pub workers: Vec<WorkerSpec>,

    /// Tasks in declared order; execution follows this order
    pub tasks: Vec<TaskSpec>,
}

fn default_capability() -> String {
    "claude".to_string()
}

impl PipelineSpec {
    pub fn from_yaml(yaml: &str) -> Result<Self, CadreError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, CadreError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}
