//! OpenAI worker using the Chat Completions API
//!
//! Requires the `OPENAI_API_KEY` environment variable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{InvocationRequest, InvocationResponse, TokenUsage, WorkerCapability};

/// OpenAI API endpoint
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model when neither the pipeline nor the worker names one
const DEFAULT_MODEL: &str = "gpt-4o";

pub struct OpenAiWorker {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiWorker {
    /// Reads `OPENAI_API_KEY` from the environment
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self::with_api_key(api_key))
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl WorkerCapability for OpenAiWorker {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResponse> {
        let payload = ChatCompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_prompt(),
                },
            ],
        };

        tracing::debug!(model = %payload.model, "Sending request to OpenAI API");

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .context("failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API returned {status}: {body}");
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse OpenAI API response")?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("OpenAI API response contained no choices")?;

        let usage = completion
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_else(|| TokenUsage::estimate(request.instructions.len(), content.len()));

        Ok(InvocationResponse::new(content).with_usage(usage))
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}
