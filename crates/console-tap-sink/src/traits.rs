//! Sink trait and error.

use std::sync::Arc;

use async_trait::async_trait;
use console_tap_core::LogEvent;
use thiserror::Error;

/// Sink error.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink closed")]
    Closed,
    #[error("Sink error: {0}")]
    Internal(String),
}

/// Durable, append-only destination for log events.
///
/// Each event becomes exactly one newline-terminated record, written
/// whole with respect to concurrent appends. Existing content is never
/// rewritten.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Append one record.
    async fn append(&self, event: &LogEvent) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn append(&self, event: &LogEvent) -> Result<(), SinkError> {
        (**self).append(event).await
    }
}
