//! Once-per-transition status reporting.
//!
//! The supervisor ticks every few seconds. Repeating "trying to connect"
//! or "target not found" on every tick would flood the log, so each status
//! is emitted only when it differs from the last one reported.

use console_tap_core::{TargetDescriptor, TargetInfo, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Seeking,
    Attached,
}

/// Logs connection status transitions exactly once each.
///
/// Every method returns whether it emitted a message.
#[derive(Debug)]
pub struct StatusReporter {
    phase: Phase,
    miss_reported: bool,
    last_failure: Option<String>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    /// Create a reporter that has not reported anything yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            miss_reported: false,
            last_failure: None,
        }
    }

    /// A connection attempt is starting.
    pub fn attempt_started(&mut self, target: &TargetDescriptor) -> bool {
        if self.phase == Phase::Seeking {
            return false;
        }
        self.phase = Phase::Seeking;
        self.miss_reported = false;
        self.last_failure = None;
        tracing::info!("Trying to connect to {target}");
        true
    }

    /// The target was not listed.
    pub fn target_missing(&mut self, target: &TargetDescriptor) -> bool {
        self.last_failure = None;
        if self.miss_reported {
            return false;
        }
        self.miss_reported = true;
        tracing::debug!("{target} is not available yet, will retry");
        true
    }

    /// The attempt failed after the target was selected, or discovery failed.
    pub fn attempt_failed(&mut self, error: &impl std::fmt::Display) -> bool {
        self.miss_reported = false;
        let message = error.to_string();
        if self.last_failure.as_deref() == Some(message.as_str()) {
            tracing::debug!("Connection attempt failed again: {message}");
            return false;
        }
        tracing::warn!("Connection attempt failed: {message}");
        self.last_failure = Some(message);
        true
    }

    /// A session is live.
    pub fn connected(&mut self, target: &TargetDescriptor, info: &TargetInfo) -> bool {
        if self.phase == Phase::Attached {
            return false;
        }
        self.phase = Phase::Attached;
        tracing::info!(target_id = %info.id, url = %info.url, "Connected to {target}");
        true
    }

    /// The live session ended.
    pub fn disconnected(
        &mut self,
        target: &TargetDescriptor,
        error: Option<&TransportError>,
    ) -> bool {
        if self.phase != Phase::Attached {
            return false;
        }
        self.phase = Phase::Idle;
        match error {
            Some(e) => tracing::warn!("Disconnected from {target}: {e}"),
            None => tracing::warn!("Disconnected from {target}"),
        }
        true
    }
}
