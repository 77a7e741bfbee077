//! Mona core library.
//!
//! Resilient server-push event client and the collaborator boundaries the
//! checkout orchestrator is built on. Nothing here is global: every component
//! is constructed by the host and passed down.
//!
//! # Features
//!
//! - **Stream client**: one connection per channel, health checks, backoff
//!   reconnects and a background mode with heartbeats
//! - **Event routing**: raw channel payloads to typed transaction and auth events
//! - **Collaborators**: secure storage and payment gateway traits with default
//!   implementations
//!
//! # Example
//!
//! ```ignore
//! use mona_lib::prelude::*;
//! use std::sync::Arc;
//!
//! let client = StreamClient::with_http(StreamConfig::new("https://rtdb.example.com"))?;
//! let (session_tx, session_rx) = tokio::sync::watch::channel(None);
//! let router = EventRouter::new(session_rx);
//! let (sink, mut inbox) = tokio::sync::mpsc::unbounded_channel();
//!
//! let (on_event, on_error) = router.callbacks(ChannelType::PaymentUpdates, sink);
//! client.subscribe_channel(ChannelKey::payment_updates("T1"), on_event, on_error)?;
//! ```

pub mod config;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod health;
pub mod prelude;
pub mod protocol;
pub mod secure_storage;
pub mod state;
pub mod stream;

/// Test doubles for transports and gateways.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{MonaConfig, StreamConfig};
pub use errors::{MonaError, MonaErrorCode};

/// Common result alias for Mona operations.
pub type Result<T> = std::result::Result<T, MonaError>;
