//! Append-only persistence for console records.
//!
//! Provides:
//! - `EventSink` - Trait every record destination implements
//! - `WriterSink` - Newline-terminated records over any async writer (files, stdout)
//! - `MemorySink` - In-memory sink (feature: memory)
//! - `SinkQueue` - Non-blocking front that appends from a background task

pub mod queue;
pub mod traits;
pub mod writer;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemorySink;
pub use queue::{SinkQueue, SinkStats, SinkWorker};
pub use traits::{EventSink, SinkError};
pub use writer::WriterSink;
