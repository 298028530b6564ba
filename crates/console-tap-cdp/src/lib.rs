//! Chrome DevTools Protocol transport.
//!
//! Provides:
//! - `CdpTransport` - Target discovery over the `/json/list` HTTP endpoint
//! - `CdpSession` - WebSocket session with request/response routing
//! - Wire types for the `Runtime` domain

pub mod protocol;
pub mod session;
pub mod transport;

pub use session::CdpSession;
pub use transport::{CdpTransport, DEFAULT_ENDPOINT};
