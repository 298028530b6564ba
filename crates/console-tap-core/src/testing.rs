//! Scripted in-memory collaborator for tests.
//!
//! `ScriptedTransport` lists a configurable set of targets and opens
//! `ScriptedSession`s that answer property fetches from an `ObjectGraph`.
//! Every opened session leaves a `SessionProbe` behind so a test can push
//! notifications into it and observe its teardown.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    RemoteValueRef,
    traits::{
        PropertyDescriptor, RuntimeEvent, Session, SessionNotification, TargetInfo, Transport,
        TransportError,
    },
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remote objects by handle id.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: HashMap<String, Result<Vec<PropertyDescriptor>, TransportError>>,
    fetch_delay: Option<Duration>,
}

impl ObjectGraph {
    /// Empty graph: every handle fails to resolve.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object with the given own properties.
    #[must_use]
    pub fn object(mut self, id: impl Into<String>, properties: Vec<PropertyDescriptor>) -> Self {
        self.objects.insert(id.into(), Ok(properties));
        self
    }

    /// Add a handle whose property fetch fails.
    #[must_use]
    pub fn failing(mut self, id: impl Into<String>, error: TransportError) -> Self {
        self.objects.insert(id.into(), Err(error));
        self
    }

    /// Delay every property fetch.
    #[must_use]
    pub const fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }
}

/// Test-side view of an opened session.
#[derive(Debug, Clone)]
pub struct SessionProbe {
    notifier: mpsc::UnboundedSender<SessionNotification>,
    closed: Arc<AtomicBool>,
}

impl SessionProbe {
    /// Deliver a console call.
    pub fn emit(&self, level: &str, args: Vec<RemoteValueRef>) {
        let _ = self.notifier.send(SessionNotification::Event(RuntimeEvent {
            level: level.to_string(),
            args,
        }));
    }

    /// Deliver a disconnect notification.
    pub fn disconnect(&self) {
        let _ = self.notifier.send(SessionNotification::Disconnected);
    }

    /// Deliver a transport error notification.
    pub fn fail(&self, error: TransportError) {
        let _ = self.notifier.send(SessionNotification::Error(error));
    }

    /// Whether the owner released the session.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory session backed by an `ObjectGraph`.
pub struct ScriptedSession {
    graph: ObjectGraph,
    enable_error: Option<TransportError>,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<SessionNotification>>>,
    probe: SessionProbe,
    fetches: AtomicUsize,
}

impl ScriptedSession {
    /// Create a standalone session.
    #[must_use]
    pub fn new(graph: ObjectGraph) -> Self {
        Self::with_enable_error(graph, None)
    }

    fn with_enable_error(graph: ObjectGraph, enable_error: Option<TransportError>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            graph,
            enable_error,
            notifications: Mutex::new(Some(rx)),
            probe: SessionProbe {
                notifier: tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            fetches: AtomicUsize::new(0),
        }
    }

    /// Probe for pushing notifications into this session.
    #[must_use]
    pub fn probe(&self) -> SessionProbe {
        self.probe.clone()
    }

    /// Number of property fetches served.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn enable_events(&self) -> Result<(), TransportError> {
        self.enable_error.clone().map_or(Ok(()), Err)
    }

    async fn get_own_properties(
        &self,
        object_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.graph.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.graph.objects.get(object_id).cloned().unwrap_or_else(|| {
            Err(TransportError::Remote {
                code: -32000,
                message: format!("Could not find object with id {object_id}"),
            })
        })
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<SessionNotification>> {
        lock(&self.notifications).take()
    }

    async fn close(&self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory transport with scripted discovery and handshake results.
#[derive(Default)]
pub struct ScriptedTransport {
    targets: Mutex<Vec<TargetInfo>>,
    graph: ObjectGraph,
    list_error: Mutex<Option<TransportError>>,
    connect_error: Mutex<Option<TransportError>>,
    enable_error: Mutex<Option<TransportError>>,
    list_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    probes: Mutex<Vec<SessionProbe>>,
}

impl ScriptedTransport {
    /// Transport listing the given targets.
    #[must_use]
    pub fn new(targets: Vec<TargetInfo>) -> Self {
        Self {
            targets: Mutex::new(targets),
            ..Self::default()
        }
    }

    /// Serve property fetches of opened sessions from `graph`.
    #[must_use]
    pub fn with_graph(mut self, graph: ObjectGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Replace the listed targets.
    pub fn set_targets(&self, targets: Vec<TargetInfo>) {
        *lock(&self.targets) = targets;
    }

    /// Make listing fail (or succeed again with `None`).
    pub fn set_list_error(&self, error: Option<TransportError>) {
        *lock(&self.list_error) = error;
    }

    /// Make `connect` fail (or succeed again with `None`).
    pub fn set_connect_error(&self, error: Option<TransportError>) {
        *lock(&self.connect_error) = error;
    }

    /// Make `enable_events` fail on subsequently opened sessions.
    pub fn set_enable_error(&self, error: Option<TransportError>) {
        *lock(&self.enable_error) = error;
    }

    /// Delay each listing call.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        *lock(&self.list_delay) = delay;
    }

    /// Number of listing calls, i.e. connection attempts that reached the transport.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Probes of every session opened so far, oldest first.
    #[must_use]
    pub fn probes(&self) -> Vec<SessionProbe> {
        lock(&self.probes).clone()
    }

    /// Probe of the most recently opened session.
    #[must_use]
    pub fn last_probe(&self) -> Option<SessionProbe> {
        lock(&self.probes).last().cloned()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Session = ScriptedSession;

    async fn list_targets(&self) -> Result<Vec<TargetInfo>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.list_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let list_error = lock(&self.list_error).clone();
        match list_error {
            Some(error) => Err(error),
            None => Ok(lock(&self.targets).clone()),
        }
    }

    async fn connect(&self, _target: &TargetInfo) -> Result<ScriptedSession, TransportError> {
        let connect_error = lock(&self.connect_error).clone();
        if let Some(error) = connect_error {
            return Err(error);
        }
        let enable_error = lock(&self.enable_error).clone();
        let session = ScriptedSession::with_enable_error(self.graph.clone(), enable_error);
        lock(&self.probes).push(session.probe());
        Ok(session)
    }
}
