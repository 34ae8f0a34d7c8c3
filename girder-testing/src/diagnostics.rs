// Diagnostic source that keeps every event it sees

use girder_core::{DiagnosticEvent, DiagnosticSource};
use parking_lot::Mutex;

/// A recorded diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub name: &'static str,
    pub action: String,
    pub filter: Option<String>,
}

/// Captures events by name with the action and filter they refer to.
#[derive(Default)]
pub struct RecordingDiagnosticSource {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingDiagnosticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Event names, oldest first
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name == name).count()
    }
}

impl DiagnosticSource for RecordingDiagnosticSource {
    fn is_enabled(&self, _name: &str) -> bool {
        true
    }

    fn write(&self, event: &DiagnosticEvent<'_>) {
        self.events.lock().push(RecordedEvent {
            name: event.name(),
            action: event.action().display_name.clone(),
            filter: event.filter().map(str::to_string),
        });
    }
}

impl std::fmt::Debug for RecordingDiagnosticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingDiagnosticSource")
            .field("events", &self.events.lock().len())
            .finish()
    }
}
