//! Context propagation: composing the instructions sent to a worker
//!
//! A task's concrete instructions are built from three sources, in a fixed
//! order: the instructions template, `${input.NAME}` placeholders resolved
//! from the pipeline inputs, and one labeled context block per declared
//! upstream task. Composition is a pure function of (task, inputs, results
//! so far) - identical arguments produce byte-identical instructions.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CadreError;
use crate::executor::PipelineRun;
use crate::spec::TaskSpec;

/// Pattern for ${input.name} references
static INPUT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{input\.([\w-]+)\}").unwrap());

/// Named inputs supplied once at run start
///
/// Values are JSON so callers can pass nested structures; strings render
/// verbatim, everything else renders as compact JSON. A BTreeMap keeps
/// serialized run records stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineInputs {
    values: BTreeMap<String, Value>,
}

impl PipelineInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Render an input for template substitution
    pub fn render(&self, name: &str) -> Option<String> {
        self.values.get(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse repeated `key=value` CLI arguments
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> Result<Self, CadreError> {
        let mut inputs = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, value) = assignment.split_once('=').ok_or_else(|| {
                CadreError::InvalidArgument(format!(
                    "input '{assignment}' is not of the form key=value"
                ))
            })?;
            if key.is_empty() {
                return Err(CadreError::InvalidArgument(format!(
                    "input '{assignment}' has an empty key"
                )));
            }
            inputs.insert(key, value);
        }
        Ok(inputs)
    }
}

/// Substitute `${input.NAME}` placeholders; unknown names resolve to empty
fn resolve_inputs(template: &str, inputs: &PipelineInputs) -> String {
    INPUT_PATTERN
        .replace_all(template, |cap: &regex::Captures| {
            inputs.render(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Compose the concrete instructions for a task from its template, the
/// pipeline inputs, and the outputs of its declared upstream tasks.
///
/// Upstream blocks are appended in the task's declared context order. A
/// missing upstream result means the executor broke topological ordering;
/// that is reported as [`CadreError::MissingUpstreamContext`] rather than
/// silently composing partial context.
pub fn compose_instructions(
    task: &TaskSpec,
    inputs: &PipelineInputs,
    run: &PipelineRun,
) -> Result<String, CadreError> {
    let mut text = resolve_inputs(&task.instructions, inputs);

    for upstream in &task.context {
        let result = run.result_for(upstream).ok_or_else(|| {
            CadreError::MissingUpstreamContext {
                task_id: task.id.clone(),
                upstream_id: upstream.clone(),
            }
        })?;
        text.push_str("\n\n--- context from task '");
        text.push_str(upstream);
        text.push_str("' ---\n");
        text.push_str(&result.output);
    }

    Ok(text)
}
