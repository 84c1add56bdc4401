//! Worker capability backends
//!
//! A capability is the opaque thing that actually answers a task: it accepts
//! a role-bound invocation (role, objective, constraints, instructions,
//! expected output) and returns free-form text. The executor treats it as a
//! blocking black box with a bounded timeout; retries and streaming, if any,
//! live behind this trait.
//!
//! | Backend  | Use case   | Requires |
//! |----------|------------|----------|
//! | `claude` | Production | `claude` CLI installed |
//! | `openai` | Production | `OPENAI_API_KEY` env var |
//! | `mock`   | Testing    | Nothing  |

mod claude;
mod mock;
mod openai;

pub use claude::ClaudeWorker;
pub use mock::MockWorker;
pub use openai::OpenAiWorker;

use anyhow::Result;
use async_trait::async_trait;

/// Average characters per token for mixed prose + code content
const CHARS_PER_TOKEN: f32 = 3.0;

/// Core trait every worker capability implements
///
/// Invocation is a single prompt-in, text-out exchange; the orchestrator
/// never retries and never assumes streaming or latency characteristics.
#[async_trait]
pub trait WorkerCapability: Send + Sync {
    /// Backend name (e.g. "claude", "openai", "mock")
    fn name(&self) -> &str;

    /// Execute one invocation and return the response
    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResponse>;

    /// Check if this backend is usable (CLI installed, API key set)
    fn is_available(&self) -> bool {
        true
    }
}

/// One worker invocation
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Role description of the assigned worker
    pub role: String,
    /// What the worker is trying to achieve
    pub objective: String,
    /// Behavioral constraints, free text (may be empty)
    pub constraints: String,
    /// Composed instructions (template + inputs + upstream context)
    pub instructions: String,
    /// Description of the expected output
    pub expected_output: String,
    /// Model override, None = backend default
    pub model: Option<String>,
}

impl InvocationRequest {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            role: String::new(),
            objective: String::new(),
            constraints: String::new(),
            instructions: instructions.into(),
            expected_output: String::new(),
            model: None,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = objective.into();
        self
    }

    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = constraints.into();
        self
    }

    pub fn with_expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = expected.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Fold role, objective, and constraints into a system prompt
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.\nYour objective: {}", self.role, self.objective);
        if !self.constraints.is_empty() {
            prompt.push_str("\nConstraints: ");
            prompt.push_str(&self.constraints);
        }
        prompt
    }

    /// Instructions plus the expected-output description
    pub fn user_prompt(&self) -> String {
        let mut prompt = self.instructions.clone();
        if !self.expected_output.is_empty() {
            prompt.push_str("\n\nExpected output: ");
            prompt.push_str(&self.expected_output);
        }
        prompt
    }
}

/// Response from one invocation
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    /// The generated content
    pub content: String,
    /// Token usage statistics (estimated when the backend reports none)
    pub usage: TokenUsage,
}

impl InvocationResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: TokenUsage::default(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt: u32, completion: u32) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    /// Estimate usage from character counts when the backend reports none
    pub fn estimate(prompt_len: usize, response_len: usize) -> Self {
        let prompt_tokens = (prompt_len as f32 / CHARS_PER_TOKEN).ceil() as u32;
        let completion_tokens = (response_len as f32 / CHARS_PER_TOKEN).ceil() as u32;
        Self::new(prompt_tokens, completion_tokens)
    }
}

/// Create a capability instance by name
pub fn create_capability(name: &str) -> Result<Box<dyn WorkerCapability>> {
    match name.to_lowercase().as_str() {
        "claude" => Ok(Box::new(ClaudeWorker::new())),
        "openai" => Ok(Box::new(OpenAiWorker::new()?)),
        "mock" => Ok(Box::new(MockWorker::new())),
        _ => anyhow::bail!("Unknown capability: '{name}'. Available: claude, openai, mock"),
    }
}
