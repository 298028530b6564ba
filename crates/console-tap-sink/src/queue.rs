//! Non-blocking front for a sink.
//!
//! Event intake must never wait on disk. `SinkQueue::enqueue` only pushes
//! onto an unbounded channel; a background task appends in FIFO order.

use console_tap_core::LogEvent;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{EventSink, SinkError};

/// Counters reported by a finished worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub failed: u64,
}

/// Cloneable handle for enqueueing events.
#[derive(Clone)]
pub struct SinkQueue {
    tx: mpsc::UnboundedSender<LogEvent>,
}

/// Owner of the background append task.
pub struct SinkWorker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<SinkStats>,
}

impl SinkQueue {
    /// Spawn the append task for `sink`.
    #[must_use]
    pub fn spawn<S: EventSink>(sink: S) -> (Self, SinkWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(sink, rx, stop_rx));
        (Self { tx }, SinkWorker { stop_tx, handle })
    }

    /// Queue an event for appending. Never blocks.
    ///
    /// # Errors
    /// Returns `SinkError::Closed` once the worker has stopped.
    pub fn enqueue(&self, event: LogEvent) -> Result<(), SinkError> {
        self.tx.send(event).map_err(|_| SinkError::Closed)
    }
}

impl SinkWorker {
    /// Stop accepting events, append everything already queued, and wait.
    pub async fn close(self) -> SinkStats {
        let _ = self.stop_tx.send(());
        self.handle.await.unwrap_or_else(|e| {
            tracing::error!("Sink worker panicked: {e}");
            SinkStats::default()
        })
    }
}

async fn run_worker<S: EventSink>(
    sink: S,
    mut rx: mpsc::UnboundedReceiver<LogEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) -> SinkStats {
    let mut stats = SinkStats::default();
    let mut failing = false;
    let mut stopping = false;

    loop {
        tokio::select! {
            biased;
            () = async { let _ = (&mut stop_rx).await; }, if !stopping => {
                // Remaining events are still drained below.
                stopping = true;
                rx.close();
            }
            next = rx.recv() => {
                let Some(event) = next else { break };
                match sink.append(&event).await {
                    Ok(()) => {
                        stats.written += 1;
                        if failing {
                            tracing::info!("Output writes recovered");
                            failing = false;
                        }
                    }
                    Err(e) => {
                        stats.failed += 1;
                        if failing {
                            tracing::debug!("Failed to append record: {e}");
                        } else {
                            tracing::error!("Failed to append record: {e}");
                            failing = true;
                        }
                    }
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use console_tap_core::MaterializedValue;

    use super::*;
    use crate::MemorySink;

    fn event(n: i64) -> LogEvent {
        LogEvent::now("log", vec![MaterializedValue::Number(n.into())])
    }

    #[tokio::test]
    async fn test_preserves_order_and_drains_on_close() {
        let sink = MemorySink::new();
        let (queue, worker) = SinkQueue::spawn(sink.clone());

        for n in 0..100 {
            tokio_test::assert_ok!(queue.enqueue(event(n)));
        }
        let stats = worker.close().await;

        assert_eq!(stats, SinkStats { written: 100, failed: 0 });
        let records = sink.records();
        for (n, record) in records.iter().enumerate() {
            assert!(record.ends_with(&format!(" {n}\n")));
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_worker() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        let (queue, worker) = SinkQueue::spawn(sink.clone());

        tokio_test::assert_ok!(queue.enqueue(event(1)));
        tokio_test::assert_ok!(queue.enqueue(event(2)));
        // Single-threaded test runtime: yielding lets the worker drain both.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        sink.set_failing(false);
        tokio_test::assert_ok!(queue.enqueue(event(3)));
        let stats = worker.close().await;

        assert_eq!(stats, SinkStats { written: 1, failed: 2 });
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].ends_with(" 3\n"));
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_rejected() {
        let (queue, worker) = SinkQueue::spawn(MemorySink::new());
        worker.close().await;
        assert!(matches!(queue.enqueue(event(1)), Err(SinkError::Closed)));
    }
}
