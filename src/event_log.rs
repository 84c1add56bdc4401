//! Per-task execution log
//!
//! Append-only audit trail of a pipeline run:
//! - Event: envelope with id + timestamp + kind
//! - EventKind: pipeline-level, task-level, and worker-level variants
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // pipeline level
    PipelineStarted {
        pipeline: String,
        task_count: usize,
    },
    PipelineCompleted {
        final_output_len: usize,
        total_duration_ms: u64,
    },
    PipelineAborted {
        task_id: String,
        error: String,
    },

    // task level
    TaskStarted {
        task_id: String,
        worker_id: String,
    },
    TaskCompleted {
        task_id: String,
        output_len: usize,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: String,
        error: String,
        duration_ms: u64,
    },

    // worker level
    InstructionsComposed {
        task_id: String,
        instructions_len: usize,
        upstream_count: usize,
    },
    WorkerInvoked {
        task_id: String,
        capability: String,
        prompt_len: usize,
    },
    WorkerResponded {
        task_id: String,
        output_len: usize,
    },
}

impl EventKind {
    /// Extract task_id if the event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::InstructionsComposed { task_id, .. }
            | Self::WorkerInvoked { task_id, .. }
            | Self::WorkerResponded { task_id, .. }
            | Self::PipelineAborted { task_id, .. } => Some(task_id),
            Self::PipelineStarted { .. } | Self::PipelineCompleted { .. } => None,
        }
    }

    /// Check if this is a pipeline-level event
    pub fn is_pipeline_event(&self) -> bool {
        matches!(
            self,
            Self::PipelineStarted { .. }
                | Self::PipelineCompleted { .. }
                | Self::PipelineAborted { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };
        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Filter events by task ID
    pub fn filter_task(&self, task_id: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .collect()
    }

    /// Filter pipeline-level events only
    pub fn pipeline_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_pipeline_event())
            .collect()
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_extraction() {
        let started = EventKind::TaskStarted {
            task_id: "review".to_string(),
            worker_id: "reviewer".to_string(),
        };
        assert_eq!(started.task_id(), Some("review"));

        let pipeline = EventKind::PipelineStarted {
            pipeline: "demo".to_string(),
            task_count: 5,
        };
        assert_eq!(pipeline.task_id(), None);
    }

    #[test]
    fn emit_returns_monotonic_ids() {
        let log = EventLog::new();

        let id1 = log.emit(EventKind::PipelineStarted {
            pipeline: "demo".to_string(),
            task_count: 2,
        });
        let id2 = log.emit(EventKind::TaskStarted {
            task_id: "t1".to_string(),
            worker_id: "w".to_string(),
        });

        assert_eq!(id1, 0);
        assert_eq!(id2, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn filter_task_returns_only_matching() {
        let log = EventLog::new();
        log.emit(EventKind::TaskStarted {
            task_id: "alpha".to_string(),
            worker_id: "w".to_string(),
        });
        log.emit(EventKind::TaskStarted {
            task_id: "beta".to_string(),
            worker_id: "w".to_string(),
        });
        log.emit(EventKind::TaskCompleted {
            task_id: "alpha".to_string(),
            output_len: 10,
            duration_ms: 100,
        });

        let alpha = log.filter_task("alpha");
        assert_eq!(alpha.len(), 2);
        assert!(alpha.iter().all(|e| e.kind.task_id() == Some("alpha")));
    }

    #[test]
    fn pipeline_events_filtered() {
        let log = EventLog::new();
        log.emit(EventKind::PipelineStarted {
            pipeline: "demo".to_string(),
            task_count: 1,
        });
        log.emit(EventKind::TaskStarted {
            task_id: "t1".to_string(),
            worker_id: "w".to_string(),
        });
        log.emit(EventKind::PipelineCompleted {
            final_output_len: 4,
            total_duration_ms: 500,
        });

        assert_eq!(log.pipeline_events().len(), 2);
    }

    #[test]
    fn serializes_with_type_tag() {
        let kind = EventKind::TaskFailed {
            task_id: "audit".to_string(),
            error: "worker unreachable".to_string(),
            duration_ms: 42,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "task_failed");
        assert_eq!(json["task_id"], "audit");
    }

    #[test]
    fn clones_share_the_same_log() {
        let log = EventLog::new();
        let cloned = log.clone();

        log.emit(EventKind::PipelineStarted {
            pipeline: "demo".to_string(),
            task_count: 1,
        });
        assert_eq!(cloned.len(), 1);
    }
}
