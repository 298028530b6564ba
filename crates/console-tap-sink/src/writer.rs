//! Record writer over any async byte sink.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use console_tap_core::LogEvent;
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::Mutex,
};

use crate::{EventSink, SinkError};

/// Writes `[level] timestamp message` records.
///
/// The formatted record goes through one locked `write_all` followed by a
/// flush, so concurrent appends never interleave within a record.
#[derive(Clone)]
pub struct WriterSink {
    writer: Arc<Mutex<BufWriter<Box<dyn AsyncWrite + Send + Unpin>>>>,
}

impl std::fmt::Debug for WriterSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

impl WriterSink {
    /// Create a sink over an arbitrary writer.
    #[must_use]
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(Box::new(writer)))),
        }
    }

    /// Open `path` for appending, creating it if missing.
    ///
    /// # Errors
    /// Returns error if the file cannot be opened.
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        tracing::debug!(path = %path.display(), "Opened output file");
        Ok(Self::new(file))
    }

    /// Sink writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Write one raw, already formatted record.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn write_record(&self, record: &str) -> Result<(), std::io::Error> {
        let mut guard = self.writer.lock().await;
        guard.write_all(record.as_bytes()).await?;
        guard.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for WriterSink {
    async fn append(&self, event: &LogEvent) -> Result<(), SinkError> {
        self.write_record(&event.to_record()).await?;
        Ok(())
    }
}
