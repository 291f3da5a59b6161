//! Progress event types and event bus
//!
//! The ingest pipeline reports progress as structured events through an
//! injected [`ProgressSink`]. The concrete transport behind the sink (SSE,
//! pipe, log file) is a consumer concern; [`EventBus`] is the provided
//! in-process implementation on top of `tokio::broadcast`.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Final outcome of processing one work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkOutcome {
    /// Work (or its missing covers) was newly ingested
    Added,
    /// Existing work's metadata was refreshed
    Updated,
    /// Nothing to do for this work
    Skipped,
    /// Processing failed; see the task log
    Failed,
}

impl WorkOutcome {
    /// Lowercase label, matching the serialized form
    pub fn label(self) -> &'static str {
        match self {
            WorkOutcome::Added => "added",
            WorkOutcome::Updated => "updated",
            WorkOutcome::Skipped => "skipped",
            WorkOutcome::Failed => "failed",
        }
    }
}

/// Severity of a progress log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Progress events emitted by the ingest pipeline
///
/// Consumers must tolerate arbitrary interleaving across works; ordering is
/// only guaranteed within one work's task lifecycle (added -> logs -> removed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A work entered processing
    TaskAdded { code: String },

    /// Log line scoped to one in-flight work
    TaskLog {
        code: String,
        level: LogLevel,
        message: String,
    },

    /// A work left processing with its final outcome
    TaskRemoved { code: String, outcome: WorkOutcome },

    /// Aggregate result entry; `processed` is the running total of
    /// completed works in this run
    ResultAdded {
        code: String,
        outcome: WorkOutcome,
        processed: usize,
    },

    /// Log line not scoped to any single work
    MainLog { level: LogLevel, message: String },

    /// Terminal event with a human-readable run summary
    Finished { message: String },
}

/// Sink for progress events, injected into the orchestrator
pub trait ProgressSink: Send + Sync {
    /// Deliver one event. Must not block the pipeline.
    fn emit(&self, event: ProgressEvent);
}

/// Broadcast-backed progress channel
///
/// Non-blocking publish: slow subscribers lag and drop old events rather
/// than stalling the pipeline. Subscribers only see events emitted after
/// they subscribe.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl ProgressSink for EventBus {
    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine; progress is advisory
        if self.tx.send(event).is_err() {
            tracing::trace!("progress event dropped: no subscribers");
        }
    }
}

/// Sink that discards everything (tests, headless runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that records every event in memory, for assertions in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
