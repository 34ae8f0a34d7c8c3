// Call recording for filter and controller doubles

use girder_core::{ControllerContext, ControllerFactory, ControllerInstance, Error};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered log of pipeline steps shared by every double in a test.
///
/// Entries are written as `"{name}:{event}"`.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` for the double called `name`
    pub fn record(&self, name: &str, event: impl std::fmt::Display) {
        self.calls.lock().push(format!("{}:{}", name, event));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every entry, oldest first
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn was_called(&self, entry: &str) -> bool {
        self.calls.lock().iter().any(|call| call == entry)
    }

    /// Entries recorded by the double called `name`
    pub fn calls_for(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}:", name);
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl std::fmt::Debug for CallLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.calls.lock().iter()).finish()
    }
}

type CreateFn = dyn Fn() -> ControllerInstance + Send + Sync;

/// Controller factory that counts creations and releases.
pub struct RecordingControllerFactory {
    create: Box<CreateFn>,
    created: AtomicUsize,
    released: AtomicUsize,
    log: Option<CallLog>,
}

impl RecordingControllerFactory {
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> ControllerInstance + Send + Sync + 'static,
    {
        Self {
            create: Box::new(create),
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            log: None,
        }
    }

    /// Factory creating `C::default()`
    pub fn of_default<C: Default + Send + Sync + 'static>() -> Self {
        Self::new(|| Arc::new(C::default()) as ControllerInstance)
    }

    /// Also write `controller:create` and `controller:release` to `log`
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl ControllerFactory for RecordingControllerFactory {
    fn create_controller(&self, _context: &ControllerContext) -> Result<ControllerInstance, Error> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.record("controller", "create");
        }
        Ok((self.create)())
    }

    fn release_controller(&self, _context: &ControllerContext, _controller: ControllerInstance) {
        self.released.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.record("controller", "release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_log() {
        let log = CallLog::new();
        log.record("a", "before");
        log.record("b", "before");
        log.record("a", "after");

        assert_eq!(log.call_count(), 3);
        assert!(log.was_called("b:before"));
        assert_eq!(log.calls_for("a"), vec!["a:before", "a:after"]);

        log.clear();
        assert_eq!(log.call_count(), 0);
    }

    #[test]
    fn test_clones_share_entries() {
        let log = CallLog::new();
        log.clone().record("x", 1);
        assert_eq!(log.get_calls(), vec!["x:1"]);
    }
}
