//! In-memory sink.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use console_tap_core::LogEvent;

use crate::{EventSink, SinkError};

/// In-memory sink keeping formatted records.
///
/// Useful for development and tests. Clones share the same records.
/// Can be switched into a failing mode to exercise fault handling.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<RwLock<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of the records written so far.
    #[must_use]
    pub fn records(&self) -> Vec<String> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of records written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn append(&self, event: &LogEvent) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Io(std::io::Error::other("simulated write failure")));
        }
        self.records
            .write()
            .map_err(|e| SinkError::Internal(e.to_string()))?
            .push(event.to_record());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use console_tap_core::MaterializedValue;

    use super::*;

    #[tokio::test]
    async fn test_records_and_failure_mode() {
        let sink = MemorySink::new();
        let event = LogEvent::now("log", vec![MaterializedValue::Bool(true)]);

        tokio_test::assert_ok!(sink.append(&event).await);
        sink.set_failing(true);
        assert!(sink.append(&event).await.is_err());
        sink.set_failing(false);
        tokio_test::assert_ok!(sink.append(&event).await);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records[0].starts_with("[log] "));
        assert!(records[0].ends_with(" true\n"));
    }
}
