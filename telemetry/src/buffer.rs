use crate::event::TelemetryEvent;
use parking_lot::Mutex;

/// Append-only in-memory record of every decoded event, shared by all
/// ingestion connections.
///
/// A single lock covers both appends and snapshots so a reader never sees a
/// partial append. Growth is unbounded for the lifetime of the process.
#[derive(Debug, Default)]
pub struct TelemetryBuffer {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }

    /// Snapshot of every event in insertion order.
    pub fn all(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Events for one project, in insertion order. Linear scan.
    pub fn by_project(&self, project_id: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
