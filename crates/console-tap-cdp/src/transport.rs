//! Target discovery over the DevTools HTTP endpoint.

use std::time::Duration;

use async_trait::async_trait;
use console_tap_core::{TargetInfo, Transport, TransportError};

use crate::{CdpSession, protocol::TargetDescription};

/// Default remote debugging endpoint (`--remote-debugging-port=9222`).
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

/// DevTools transport for one remote debugging endpoint.
#[derive(Debug, Clone)]
pub struct CdpTransport {
    endpoint: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl CdpTransport {
    /// Create a transport; `request_timeout` bounds discovery and every
    /// session request.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
            request_timeout,
        })
    }

    /// The HTTP endpoint targets are listed from.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bound on each discovery and session request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[async_trait]
impl Transport for CdpTransport {
    type Session = CdpSession;

    async fn list_targets(&self) -> Result<Vec<TargetInfo>, TransportError> {
        let url = format!("{}/json/list", self.endpoint);
        let targets: Vec<TargetDescription> = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransportError::Connection(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("{url}: {e}")))?;
        Ok(targets.into_iter().map(TargetInfo::from).collect())
    }

    async fn connect(&self, target: &TargetInfo) -> Result<CdpSession, TransportError> {
        let url = target.websocket_url.as_deref().ok_or_else(|| {
            TransportError::Protocol(format!(
                "target {} has no webSocketDebuggerUrl (another debugger attached?)",
                target.id
            ))
        })?;
        CdpSession::connect(url, self.request_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Serve a single HTTP response with `body`.
    async fn serve_json(listener: TcpListener, status: &'static str, body: &'static str) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = stream.read(&mut buf).await.unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_targets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_json(
            listener,
            "200 OK",
            r#"[
                {"id":"A","type":"page","title":"t","url":"http://localhost:4000/",
                 "webSocketDebuggerUrl":"ws://127.0.0.1:1/devtools/page/A"},
                {"id":"B","type":"service_worker","url":"http://localhost:4000/sw.js"}
            ]"#,
        ));

        let transport =
            CdpTransport::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        let targets = tokio_test::assert_ok!(transport.list_targets().await);
        server.await.unwrap();

        assert_eq!(transport.endpoint(), format!("http://{addr}"));
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "A");
        assert_eq!(targets[1].kind, "service_worker");
        assert_eq!(targets[1].websocket_url, None);
    }

    #[tokio::test]
    async fn test_list_targets_http_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_json(listener, "500 Internal Server Error", "{}"));

        let transport =
            CdpTransport::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        let result = transport.list_targets().await;
        server.await.unwrap();

        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_requires_websocket_url() {
        let transport = CdpTransport::new(DEFAULT_ENDPOINT, Duration::from_secs(1)).unwrap();
        let result = transport
            .connect(&TargetInfo::new("A", "http://localhost:4000/"))
            .await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }
}
