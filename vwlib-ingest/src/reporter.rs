//! Progress reporting
//!
//! Owns the per-work task log buffers and the running outcome tally, and
//! turns them into [`ProgressEvent`]s on the injected sink. State lives in
//! this object, created and owned by the orchestrator for one run; there
//! are no module-level task lists.

use crate::scan::statistics::ScanCounts;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use vwlib_common::events::{LogLevel, ProgressEvent, ProgressSink, WorkOutcome};

struct ReporterState {
    /// In-flight works: code -> buffered log lines
    tasks: HashMap<String, Vec<(LogLevel, String)>>,
    counts: ScanCounts,
}

/// Event-emitting progress reporter for one pipeline run
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    state: Mutex<ReporterState>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(ReporterState {
                tasks: HashMap::new(),
                counts: ScanCounts::default(),
            }),
        }
    }

    /// Begin tracking a work. Adding an already-tracked code is a no-op
    /// safeguard, not an error.
    pub fn add_task(&self, code: &str) {
        let mut state = self.state.lock().unwrap();
        if state.tasks.contains_key(code) {
            return;
        }
        state.tasks.insert(code.to_string(), Vec::new());
        drop(state);
        self.sink.emit(ProgressEvent::TaskAdded {
            code: code.to_string(),
        });
    }

    /// Log a line against one in-flight work
    pub fn task_log(&self, code: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        {
            let mut state = self.state.lock().unwrap();
            if let Some(buffer) = state.tasks.get_mut(code) {
                buffer.push((level, message.clone()));
            }
        }
        self.sink.emit(ProgressEvent::TaskLog {
            code: code.to_string(),
            level,
            message,
        });
    }

    /// Finish a work: drop its buffer, tally the outcome, emit the
    /// removal and the aggregate result with the running total.
    ///
    /// A failed work escalates its buffered log lines to the main log so
    /// the failure record survives the buffer.
    pub fn finish_task(&self, code: &str, outcome: WorkOutcome) {
        let (buffer, processed) = {
            let mut state = self.state.lock().unwrap();
            let buffer = state.tasks.remove(code).unwrap_or_default();
            state.counts.record(outcome);
            (buffer, state.counts.total())
        };

        if outcome == WorkOutcome::Failed {
            for (level, line) in &buffer {
                tracing::warn!(work = code, ?level, "{line}");
            }
        }

        self.sink.emit(ProgressEvent::TaskRemoved {
            code: code.to_string(),
            outcome,
        });
        self.sink.emit(ProgressEvent::ResultAdded {
            code: code.to_string(),
            outcome,
            processed,
        });
    }

    /// Log a line not scoped to any work
    pub fn main_log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.sink.emit(ProgressEvent::MainLog { level, message });
    }

    /// Emit the terminal summary event
    pub fn finished(&self, message: impl Into<String>) {
        self.sink.emit(ProgressEvent::Finished {
            message: message.into(),
        });
    }

    /// Snapshot of the outcome tally
    pub fn counts(&self) -> ScanCounts {
        self.state.lock().unwrap().counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vwlib_common::events::MemorySink;

    fn reporter() -> (Arc<MemorySink>, ProgressReporter) {
        let sink = Arc::new(MemorySink::new());
        let reporter = ProgressReporter::new(sink.clone());
        (sink, reporter)
    }

    #[test]
    fn duplicate_add_is_suppressed() {
        let (sink, reporter) = reporter();

        reporter.add_task("RJ123456");
        reporter.add_task("RJ123456");

        let adds = sink
            .events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::TaskAdded { .. }))
            .count();
        assert_eq!(adds, 1);
    }

    #[test]
    fn finish_emits_removal_and_running_total() {
        let (sink, reporter) = reporter();

        reporter.add_task("RJ000001");
        reporter.add_task("RJ000002");
        reporter.finish_task("RJ000001", WorkOutcome::Added);
        reporter.finish_task("RJ000002", WorkOutcome::Failed);

        let events = sink.events();
        assert!(events.contains(&ProgressEvent::TaskRemoved {
            code: "RJ000001".into(),
            outcome: WorkOutcome::Added,
        }));
        assert!(events.contains(&ProgressEvent::ResultAdded {
            code: "RJ000001".into(),
            outcome: WorkOutcome::Added,
            processed: 1,
        }));
        assert!(events.contains(&ProgressEvent::ResultAdded {
            code: "RJ000002".into(),
            outcome: WorkOutcome::Failed,
            processed: 2,
        }));

        let counts = reporter.counts();
        assert_eq!(counts.added, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn same_code_can_be_tracked_again_after_finish() {
        let (sink, reporter) = reporter();

        reporter.add_task("RJ123456");
        reporter.finish_task("RJ123456", WorkOutcome::Skipped);
        reporter.add_task("RJ123456");

        let adds = sink
            .events()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::TaskAdded { .. }))
            .count();
        assert_eq!(adds, 2);
    }

    #[test]
    fn task_log_reaches_the_sink() {
        let (sink, reporter) = reporter();
        reporter.add_task("RJ123456");
        reporter.task_log("RJ123456", LogLevel::Warn, "cover missing");

        assert!(sink.events().contains(&ProgressEvent::TaskLog {
            code: "RJ123456".into(),
            level: LogLevel::Warn,
            message: "cover missing".into(),
        }));
    }
}
