//! DevTools WebSocket session.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use console_tap_core::{
    PropertyDescriptor, RuntimeEvent, Session, SessionNotification, TransportError,
};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::{Value, json};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::protocol::{
    CONSOLE_API_CALLED, ConsoleApiCalled, Frame, GetPropertiesResult, INSPECTOR_DETACHED,
    Incoming, Request,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A WebSocket session against one DevTools target.
///
/// A background reader routes responses to their waiting callers and
/// turns events into `SessionNotification`s.
pub struct CdpSession {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    next_id: AtomicU64,
    request_timeout: Duration,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<SessionNotification>>>,
    reader: JoinHandle<()>,
    /// Set by the reader once the socket is gone.
    reader_done: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl CdpSession {
    /// Open a session on a `webSocketDebuggerUrl`.
    ///
    /// # Errors
    /// Returns error if the WebSocket handshake fails.
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let (writer, stream) = ws.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_done = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&pending),
            Arc::clone(&reader_done),
            tx,
        ));

        tracing::debug!(%url, "DevTools session opened");

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            request_timeout,
            notifications: Mutex::new(Some(rx)),
            reader,
            reader_done,
            closed: AtomicBool::new(false),
        })
    }

    /// Send a command and wait for its response.
    ///
    /// # Errors
    /// Returns error if the send fails, the remote answers with an error,
    /// the session closes first, or the request times out.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&Request { id, method, params })
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        if self.reader_done.load(Ordering::SeqCst) {
            lock(&self.pending).remove(&id);
            return Err(TransportError::Closed);
        }

        let sent = self.writer.lock().await.send(Message::Text(json.into())).await;
        if let Err(e) = sent {
            lock(&self.pending).remove(&id);
            return Err(TransportError::Connection(e.to_string()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(TransportError::Timeout(method.to_string()))
            }
        }
    }
}

#[async_trait]
impl Session for CdpSession {
    async fn enable_events(&self) -> Result<(), TransportError> {
        self.call("Runtime.enable", json!({})).await.map(|_| ())
    }

    async fn get_own_properties(
        &self,
        object_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, TransportError> {
        let result = self
            .call(
                "Runtime.getProperties",
                json!({ "objectId": object_id, "ownProperties": true }),
            )
            .await?;
        let parsed: GetPropertiesResult = serde_json::from_value(result)
            .map_err(|e| TransportError::Protocol(format!("Runtime.getProperties: {e}")))?;
        Ok(parsed.result.into_iter().map(Into::into).collect())
    }

    fn take_notifications(&self) -> Option<mpsc::UnboundedReceiver<SessionNotification>> {
        lock(&self.notifications).take()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reader.abort();
        lock(&self.pending).clear();
        if let Err(e) = self.writer.lock().await.close().await {
            tracing::debug!("Failed to close DevTools socket: {e}");
        }
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Pending,
    done: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<SessionNotification>,
) {
    let last = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<Incoming>(&text) {
                Ok(incoming) => dispatch(Frame::from(incoming), &pending, &tx),
                Err(e) => tracing::warn!("Invalid DevTools message: {e}"),
            },
            Some(Ok(Message::Close(_))) | None => break SessionNotification::Disconnected,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                break SessionNotification::Error(TransportError::Connection(e.to_string()));
            }
        }
    };

    // Dropping the senders fails every waiting call with `Closed`.
    done.store(true, Ordering::SeqCst);
    lock(&pending).clear();
    let _ = tx.send(last);
}

fn dispatch(frame: Frame, pending: &Pending, tx: &mpsc::UnboundedSender<SessionNotification>) {
    match frame {
        Frame::Response { id, result } => {
            if let Some(waiter) = lock(pending).remove(&id) {
                let _ = waiter.send(result);
            } else {
                tracing::debug!(id, "Response for unknown request");
            }
        }
        Frame::Event { method, params } => match method.as_str() {
            CONSOLE_API_CALLED => match serde_json::from_value::<ConsoleApiCalled>(params) {
                Ok(call) => {
                    let _ = tx.send(SessionNotification::Event(RuntimeEvent::from(call)));
                }
                Err(e) => tracing::warn!("Malformed {CONSOLE_API_CALLED} params: {e}"),
            },
            INSPECTOR_DETACHED => {
                let _ = tx.send(SessionNotification::Disconnected);
            }
            _ => tracing::trace!(%method, "Ignoring event"),
        },
        Frame::Unknown => tracing::debug!("Ignoring unrecognized frame"),
    }
}

#[cfg(test)]
mod tests {
    use console_tap_core::RemoteValueRef;
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal DevTools endpoint: answers `Runtime.enable` and
    /// `Runtime.getProperties`, then emits one console call and closes.
    async fn serve_once(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut stream) = ws.split();

        while let Some(Ok(msg)) = stream.next().await {
            let Message::Text(text) = msg else { continue };
            let request: Value = serde_json::from_str(&text).unwrap();
            let id = request["id"].clone();
            let reply = match request["method"].as_str() {
                Some("Runtime.enable") => json!({ "id": id, "result": {} }),
                Some("Runtime.getProperties") if request["params"]["objectId"] == "O1" => json!({
                    "id": id,
                    "result": { "result": [{
                        "name": "x",
                        "enumerable": true,
                        "value": { "type": "number", "value": 1 }
                    }]}
                }),
                _ => json!({
                    "id": id,
                    "error": { "code": -32000, "message": "Could not find object" }
                }),
            };
            sink.send(Message::Text(reply.to_string().into())).await.unwrap();

            if request["method"] == "Runtime.getProperties"
                && request["params"]["objectId"] == "gone"
            {
                let event = json!({
                    "method": "Runtime.consoleAPICalled",
                    "params": { "type": "warn", "args": [ { "type": "string", "value": "bye" } ] }
                });
                sink.send(Message::Text(event.to_string().into())).await.unwrap();
                sink.close().await.unwrap();
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_session_round_trip_against_local_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener));

        let url = format!("ws://{addr}/devtools/page/1");
        let session = CdpSession::connect(&url, Duration::from_secs(5)).await.unwrap();
        let mut notifications = session.take_notifications().unwrap();
        assert!(session.take_notifications().is_none());

        tokio_test::assert_ok!(session.enable_events().await);

        let props = session.get_own_properties("O1").await.unwrap();
        assert_eq!(props, vec![PropertyDescriptor::new("x", RemoteValueRef::from(1))]);

        let err = session.get_own_properties("gone").await.unwrap_err();
        assert!(matches!(err, TransportError::Remote { code: -32000, .. }));

        match notifications.recv().await {
            Some(SessionNotification::Event(event)) => {
                assert_eq!(event.level, "warn");
                assert_eq!(event.args, vec![RemoteValueRef::string("bye")]);
            }
            other => panic!("expected console event, got {other:?}"),
        }
        assert!(matches!(notifications.recv().await, Some(SessionNotification::Disconnected)));

        // Requests after the socket closed fail fast instead of hanging.
        let after = session.get_own_properties("O1").await;
        assert!(matches!(after, Err(TransportError::Closed)));

        session.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = CdpSession::connect(&format!("ws://{addr}/"), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
