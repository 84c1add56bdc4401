//! Evaluator capability for `test` mode
//!
//! Scores a run's aggregated output against reference criteria on a 0-10
//! scale. [`LlmEvaluator`] drives any worker capability and parses a numeric
//! verdict from its reply; [`StaticEvaluator`] returns a fixed score for
//! tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::worker::{create_capability, InvocationRequest, WorkerCapability};

/// First number (integer or decimal) in the evaluator's reply
static SCORE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// A single evaluation verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// 0 (failing) to 10 (perfect)
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Score {
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 10.0),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// The score recorded for a failed iteration
    pub fn failing(rationale: impl Into<String>) -> Self {
        Self::new(0.0).with_rationale(rationale)
    }
}

/// Scores pipeline output against reference criteria
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn score(&self, output: &str, criteria: &str) -> Result<Score>;
}

/// Evaluator that asks a worker capability for a 0-10 judgement
pub struct LlmEvaluator {
    capability: Arc<dyn WorkerCapability>,
    model: Option<String>,
}

impl LlmEvaluator {
    pub fn new(capability: Arc<dyn WorkerCapability>) -> Self {
        Self {
            capability,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Build an evaluator over a named capability backend
    pub fn from_capability_name(name: &str) -> Result<Self> {
        Ok(Self::new(Arc::from(create_capability(name)?)))
    }

    fn build_request(&self, output: &str, criteria: &str) -> InvocationRequest {
        let instructions = format!(
            "Rate the following output against the stated criteria.\n\n\
             Criteria:\n{criteria}\n\nOutput:\n{output}\n\n\
             Reply with a score from 0 to 10 on the first line, \
             then a one-paragraph justification."
        );
        let mut request = InvocationRequest::new(instructions)
            .with_role("a strict quality evaluator")
            .with_objective("Judge whether the output satisfies the criteria")
            .with_expected_output("A numeric score from 0 to 10, then a justification");
        if let Some(ref model) = self.model {
            request = request.with_model(model.clone());
        }
        request
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    fn name(&self) -> &str {
        self.capability.name()
    }

    async fn score(&self, output: &str, criteria: &str) -> Result<Score> {
        let request = self.build_request(output, criteria);
        let response = self.capability.invoke(request).await?;

        let value: f64 = SCORE_PATTERN
            .find(&response.content)
            .context("evaluator reply contained no numeric score")?
            .as_str()
            .parse()
            .context("evaluator score did not parse as a number")?;

        Ok(Score::new(value).with_rationale(response.content))
    }
}

/// Fixed-score evaluator for tests
pub struct StaticEvaluator {
    value: f64,
}

impl StaticEvaluator {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl Evaluator for StaticEvaluator {
    fn name(&self) -> &str {
        "static"
    }

    async fn score(&self, _output: &str, _criteria: &str) -> Result<Score> {
        Ok(Score::new(self.value))
    }
}
