use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Tells whoever renders a path that their cached view is stale.
///
/// Best effort: implementations must not block and cannot fail the write that
/// triggered them.
pub trait InvalidationSink: Send + Sync {
    fn invalidate(&self, path: &str);
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct NoopInvalidator;

impl InvalidationSink for NoopInvalidator {
    fn invalidate(&self, path: &str) {
        debug!(path, "Invalidation requested without a sink");
    }
}

#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    paths: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl InvalidationSink for RecordingInvalidator {
    fn invalidate(&self, path: &str) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path.to_owned());
    }
}
