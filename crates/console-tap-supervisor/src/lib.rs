//! Connection supervision for console-tap.
//!
//! Provides:
//! - `ConnectionSupervisor` - Discover, connect, monitor and retry one target
//! - `StatusReporter` - Once-per-transition status logging

pub mod status;
pub mod supervisor;

pub use status::StatusReporter;
pub use supervisor::{AttemptError, ConnectionState, ConnectionSupervisor, TickOutcome};
