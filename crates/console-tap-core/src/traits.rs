//! Collaborator traits for the remote debugging transport.
//!
//! The core never speaks a wire protocol itself. A transport lists targets
//! and opens sessions; a session enables the console feed, enumerates
//! object properties and pushes notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::RemoteValueRef;

/// A discoverable remote execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// Transport-assigned identifier.
    pub id: String,
    /// Address of the inspected document or worker.
    pub url: String,
    /// Target kind (`page`, `worker`, ...).
    #[serde(default)]
    pub kind: String,
    /// Endpoint a session connects to, when the transport needs one.
    #[serde(default)]
    pub websocket_url: Option<String>,
}

impl TargetInfo {
    /// Create a target with just an id and url.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind: "page".to_string(),
            websocket_url: None,
        }
    }
}

/// One own property of a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub enumerable: bool,
    /// Absent for accessor properties.
    pub value: Option<RemoteValueRef>,
}

impl PropertyDescriptor {
    /// An enumerable data property.
    #[must_use]
    pub fn new(name: impl Into<String>, value: RemoteValueRef) -> Self {
        Self {
            name: name.into(),
            enumerable: true,
            value: Some(value),
        }
    }
}

/// A console call reported by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeEvent {
    /// Console method (`log`, `warn`, `error`, ...).
    pub level: String,
    pub args: Vec<RemoteValueRef>,
}

/// Push notifications delivered by a live session.
#[derive(Debug, Clone)]
pub enum SessionNotification {
    Event(RuntimeEvent),
    Disconnected,
    Error(TransportError),
}

/// Transport error.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Session closed")]
    Closed,
}

/// An open session against one target.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Enable the diagnostic/console feed.
    async fn enable_events(&self) -> Result<(), TransportError>;

    /// Enumerate the own properties of a remote object.
    async fn get_own_properties(
        &self,
        object_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, TransportError>;

    /// Take the notification stream.
    ///
    /// Returns `None` once it has been taken. The stream ends when the
    /// session ends, so nothing can be delivered after teardown.
    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<SessionNotification>>;

    /// Release the session. Idempotent.
    async fn close(&self);
}

/// Entry point of the remote debugging transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Session: Session;

    /// List the currently discoverable targets.
    async fn list_targets(&self) -> Result<Vec<TargetInfo>, TransportError>;

    /// Open a session against a listed target.
    async fn connect(&self, target: &TargetInfo) -> Result<Self::Session, TransportError>;
}
