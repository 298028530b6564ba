//! Connection supervisor state machine.
//!
//! ```text
//! Disconnected --tick--> Connecting --handshake ok--> Connected
//!       ^                    |                            |
//!       +---- miss/failure --+---- disconnect/error ------+
//! ```
//!
//! `tick` only acts from `Disconnected`. The state lock is a plain mutex
//! that is never held across an await: the attempt itself runs unlocked,
//! and the `Connecting` state is what keeps overlapping ticks out.

use std::{
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use console_tap_core::{
    LogEvent, SessionNotification, TapConfig, TargetDescriptor, TargetInfo, TransportError,
    ValueMaterializer,
    traits::{Session, Transport},
};
use console_tap_sink::SinkQueue;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::StatusReporter;

/// How long `shutdown` waits for a pump to write what it already received.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a connection attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Target discovery failed: {0}")]
    Discovery(#[source] TransportError),
    #[error("Handshake failed: {0}")]
    Handshake(#[source] TransportError),
    #[error("Session offered no notification stream")]
    NoNotifications,
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of one `tick`.
#[derive(Debug)]
pub enum TickOutcome {
    /// Already connected, mid-attempt, or shut down.
    Skipped,
    Connected,
    /// The target is not listed yet.
    TargetNotFound,
    Failed(AttemptError),
}

struct Attached<S> {
    session: Arc<S>,
    notifications: mpsc::UnboundedReceiver<SessionNotification>,
    target: TargetInfo,
}

struct LiveSession<S> {
    session: Arc<S>,
    pump: JoinHandle<()>,
    /// Tells the pump to stop taking new notifications and drain.
    stop: oneshot::Sender<()>,
}

struct Inner<S> {
    state: ConnectionState,
    /// Bumped on every successful connect; stale pumps compare against it.
    generation: u64,
    live: Option<LiveSession<S>>,
    reporter: StatusReporter,
    shut_down: bool,
}

/// Owns the lifecycle of one logical connection to a remote target.
///
/// Once connected, console events are materialized and queued on the sink
/// in the order they were received.
pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    target: TargetDescriptor,
    connect_timeout: Duration,
    materializer: ValueMaterializer,
    sink: SinkQueue,
    inner: Mutex<Inner<T::Session>>,
    attempts: AtomicU64,
}

impl<T: Transport> ConnectionSupervisor<T> {
    /// Create a supervisor in the `Disconnected` state.
    #[must_use]
    pub fn new(transport: T, config: &TapConfig, sink: SinkQueue) -> Arc<Self> {
        Arc::new(Self {
            transport,
            target: config.target.clone(),
            connect_timeout: config.connect_timeout,
            materializer: ValueMaterializer::new(config.materializer),
            sink,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                generation: 0,
                live: None,
                reporter: StatusReporter::new(),
                shut_down: false,
            }),
            attempts: AtomicU64::new(0),
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Number of connection attempts started so far.
    #[must_use]
    pub fn attempts_started(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T::Session>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one connection attempt if disconnected; otherwise do nothing.
    pub async fn tick(self: &Arc<Self>) -> TickOutcome {
        {
            let mut inner = self.lock();
            if inner.shut_down || inner.state != ConnectionState::Disconnected {
                return TickOutcome::Skipped;
            }
            inner.state = ConnectionState::Connecting;
            inner.reporter.attempt_started(&self.target);
        }
        let guard = AttemptGuard::new(self);
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let result = tokio::time::timeout(self.connect_timeout, self.attempt())
            .await
            .unwrap_or(Err(AttemptError::Timeout(self.connect_timeout)));

        match result {
            Ok(Some(attached)) => {
                guard.disarm();
                self.install(attached).await
            }
            Ok(None) => {
                guard.disarm();
                let mut inner = self.lock();
                inner.state = ConnectionState::Disconnected;
                inner.reporter.target_missing(&self.target);
                TickOutcome::TargetNotFound
            }
            Err(e) => {
                guard.disarm();
                let mut inner = self.lock();
                inner.state = ConnectionState::Disconnected;
                inner.reporter.attempt_failed(&e);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Discover, connect, enable events and take the notification stream.
    async fn attempt(&self) -> Result<Option<Attached<T::Session>>, AttemptError> {
        let targets = self
            .transport
            .list_targets()
            .await
            .map_err(AttemptError::Discovery)?;
        let Some(target) = self.target.select(&targets).cloned() else {
            return Ok(None);
        };

        let session = self
            .transport
            .connect(&target)
            .await
            .map_err(AttemptError::Handshake)?;

        if let Err(e) = session.enable_events().await {
            session.close().await;
            return Err(AttemptError::Handshake(e));
        }
        let Some(notifications) = session.take_notifications() else {
            session.close().await;
            return Err(AttemptError::NoNotifications);
        };

        Ok(Some(Attached {
            session: Arc::new(session),
            notifications,
            target,
        }))
    }

    async fn install(self: &Arc<Self>, attached: Attached<T::Session>) -> TickOutcome {
        let Attached {
            session,
            notifications,
            target,
        } = attached;

        let rejected = {
            let mut inner = self.lock();
            if inner.shut_down {
                inner.state = ConnectionState::Disconnected;
                Some(session)
            } else {
                inner.generation += 1;
                let generation = inner.generation;
                let (stop, stopped) = oneshot::channel();
                let pump = tokio::spawn(Arc::clone(self).pump(
                    generation,
                    Arc::clone(&session),
                    notifications,
                    stopped,
                ));
                inner.live = Some(LiveSession {
                    session,
                    pump,
                    stop,
                });
                inner.state = ConnectionState::Connected;
                inner.reporter.connected(&self.target, &target);
                None
            }
        };

        match rejected {
            Some(session) => {
                session.close().await;
                TickOutcome::Skipped
            }
            None => TickOutcome::Connected,
        }
    }

    /// Drains one session's notifications until it ends.
    ///
    /// Once `stop` fires, the channel is closed to new notifications and
    /// whatever was already received is still written.
    async fn pump(
        self: Arc<Self>,
        generation: u64,
        session: Arc<T::Session>,
        mut notifications: mpsc::UnboundedReceiver<SessionNotification>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut stopping = false;
        let error = loop {
            let notification = tokio::select! {
                biased;
                notification = notifications.recv() => notification,
                _ = &mut stop, if !stopping => {
                    stopping = true;
                    notifications.close();
                    continue;
                }
            };

            match notification {
                Some(SessionNotification::Event(event)) => {
                    let received = Utc::now();
                    let fields = self
                        .materializer
                        .materialize_all(session.as_ref(), event.args)
                        .await;
                    let record = LogEvent::at(event.level, received, fields);
                    if let Err(e) = self.sink.enqueue(record) {
                        tracing::error!("Failed to queue record: {e}");
                    }
                }
                Some(SessionNotification::Error(e)) => break Some(e),
                Some(SessionNotification::Disconnected) | None => break None,
            }
        };
        drop(session);
        self.teardown(generation, error).await;
    }

    /// Release the session of `generation` and return to `Disconnected`.
    ///
    /// The session is closed before the state flips, so a new attempt never
    /// overlaps a still-referenced session.
    async fn teardown(&self, generation: u64, error: Option<TransportError>) {
        let live = {
            let mut inner = self.lock();
            if inner.state != ConnectionState::Connected || inner.generation != generation {
                return;
            }
            inner.live.take()
        };

        if let Some(live) = live {
            live.session.close().await;
        }

        let mut inner = self.lock();
        if inner.generation == generation && inner.state == ConnectionState::Connected {
            inner.state = ConnectionState::Disconnected;
            inner.reporter.disconnected(&self.target, error.as_ref());
        }
    }

    /// Tear down any live session and refuse further attempts.
    ///
    /// Notifications the session already delivered are materialized and
    /// queued before the session is closed, bounded by a drain timeout.
    pub async fn shutdown(&self) {
        let live = {
            let mut inner = self.lock();
            inner.shut_down = true;
            let live = inner.live.take();
            if inner.state == ConnectionState::Connected {
                inner.state = ConnectionState::Disconnected;
                inner.reporter.disconnected(&self.target, None);
            }
            live
        };

        if let Some(LiveSession {
            session,
            mut pump,
            stop,
        }) = live
        {
            let _ = stop.send(());
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut pump).await.is_err() {
                tracing::warn!("Pending console events not written within {DRAIN_TIMEOUT:?}");
                pump.abort();
            }
            session.close().await;
        }
    }

    /// Tick now, then every `interval`, until `shutdown` resolves.
    ///
    /// Each tick runs as its own task so the timer never waits on a slow
    /// attempt; overlapping ticks are turned away by `tick` itself.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let supervisor = Arc::clone(&self);
                    tokio::spawn(async move {
                        supervisor.tick().await;
                    });
                }
            }
        }

        self.shutdown().await;
    }
}

/// Returns a cancelled attempt's `Connecting` state to `Disconnected`.
struct AttemptGuard<'a, T: Transport> {
    supervisor: &'a ConnectionSupervisor<T>,
    armed: bool,
}

impl<'a, T: Transport> AttemptGuard<'a, T> {
    const fn new(supervisor: &'a ConnectionSupervisor<T>) -> Self {
        Self {
            supervisor,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T: Transport> Drop for AttemptGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.supervisor.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Disconnected;
            tracing::debug!("Connection attempt cancelled");
        }
    }
}
