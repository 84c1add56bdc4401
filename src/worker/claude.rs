//! Claude worker using the Claude CLI
//!
//! Executes invocations via `claude -p "prompt"`. The overall invocation
//! timeout is owned by the executor; this backend only bounds its own
//! availability probe.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Command;
use std::time::Duration;
use wait_timeout::ChildExt;

use super::{InvocationRequest, InvocationResponse, TokenUsage, WorkerCapability};

/// Timeout for the CLI availability check
const CLI_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Worker backed by the Claude CLI
pub struct ClaudeWorker {
    /// Path to the claude CLI binary
    cli_path: String,
}

impl ClaudeWorker {
    pub fn new() -> Self {
        Self {
            cli_path: "claude".to_string(),
        }
    }

    /// Set a custom CLI path
    pub fn with_cli_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = path.into();
        self
    }

    /// Check if the claude CLI is installed (bounded probe)
    fn check_cli(&self) -> bool {
        Command::new(&self.cli_path)
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .and_then(|mut child| match child.wait_timeout(CLI_CHECK_TIMEOUT)? {
                Some(status) => Ok(status.success()),
                None => {
                    let _ = child.kill();
                    Ok(false)
                }
            })
            .unwrap_or(false)
    }
}

impl Default for ClaudeWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerCapability for ClaudeWorker {
    fn name(&self) -> &str {
        "claude"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResponse> {
        let user_prompt = request.user_prompt();

        let mut cmd = tokio::process::Command::new(&self.cli_path);
        cmd.arg("-p")
            .arg(&user_prompt)
            .arg("--system-prompt")
            .arg(request.system_prompt());
        if let Some(ref model) = request.model {
            cmd.arg("--model").arg(model);
        }

        tracing::debug!(prompt_len = user_prompt.len(), "Invoking claude CLI");

        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to execute '{}'", self.cli_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("claude CLI exited with {}: {}", output.status, stderr.trim());
        }

        let content = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let usage = TokenUsage::estimate(user_prompt.len(), content.len());
        Ok(InvocationResponse::new(content).with_usage(usage))
    }

    fn is_available(&self) -> bool {
        self.check_cli()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_cli_path() {
        let worker = ClaudeWorker::new().with_cli_path("/usr/local/bin/claude");
        assert_eq!(worker.cli_path, "/usr/local/bin/claude");
    }

    #[test]
    fn missing_cli_is_unavailable() {
        let worker = ClaudeWorker::new().with_cli_path("definitely-not-a-real-binary");
        assert!(!worker.is_available());
    }
}
