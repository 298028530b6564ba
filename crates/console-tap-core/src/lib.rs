//! Core abstractions for tailing a remote runtime's console.
//!
//! This crate provides the fundamental building blocks:
//! - `RemoteValueRef` / `MaterializedValue` - Remote and local value models
//! - `LogEvent` - One timestamped, leveled console record
//! - `ValueMaterializer` - Recursive expansion of remote object handles
//! - `Transport` / `Session` - The collaborator traits a wire protocol implements
//! - `TapConfig` - Plain configuration values

pub mod config;
pub mod event;
pub mod materializer;
pub mod traits;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{MaterializerConfig, TapConfig, TargetDescriptor};
pub use event::LogEvent;
pub use materializer::ValueMaterializer;
pub use traits::{
    PropertyDescriptor, RuntimeEvent, Session, SessionNotification, TargetInfo, Transport,
    TransportError,
};
pub use value::{MaterializedValue, RemoteValueRef, Scalar};
