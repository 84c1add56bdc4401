//! Mock worker for testing
//!
//! Returns scripted responses without touching any real backend, records
//! every request for assertions, and can inject failures.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{InvocationRequest, InvocationResponse, TokenUsage, WorkerCapability};

/// One scripted reply
#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Failure(String),
}

/// Mock worker with a FIFO queue of scripted replies
pub struct MockWorker {
    scripted: Arc<Mutex<Vec<Scripted>>>,
    /// Returned when the queue is empty
    default_response: String,
    /// Every request made, in order
    requests: Arc<Mutex<Vec<InvocationRequest>>>,
}

impl MockWorker {
    pub fn new() -> Self {
        Self {
            scripted: Arc::new(Mutex::new(vec![])),
            default_response: "Mock response".to_string(),
            requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Create with a queue of successful responses
    pub fn with_responses<S: Into<String>>(responses: Vec<S>) -> Self {
        let worker = Self::new();
        {
            let mut queue = worker.scripted.lock().unwrap();
            queue.extend(responses.into_iter().map(|r| Scripted::Reply(r.into())));
        }
        worker
    }

    /// Set the default response used when the queue is empty
    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: impl Into<String>) {
        self.scripted
            .lock()
            .unwrap()
            .push(Scripted::Reply(response.into()));
    }

    /// Queue an invocation failure
    pub fn queue_failure(&self, error: impl Into<String>) {
        self.scripted
            .lock()
            .unwrap()
            .push(Scripted::Failure(error.into()));
    }

    /// All requests made to this worker
    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of invocations so far
    pub fn invocation_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<InvocationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerCapability for MockWorker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let scripted = {
            let mut queue = self.scripted.lock().unwrap();
            if queue.is_empty() {
                Scripted::Reply(self.default_response.clone())
            } else {
                queue.remove(0)
            }
        };

        match scripted {
            Scripted::Reply(content) => {
                let usage = TokenUsage::estimate(request.instructions.len(), content.len());
                Ok(InvocationResponse::new(content).with_usage(usage))
            }
            Scripted::Failure(error) => anyhow::bail!(error),
        }
    }
}
