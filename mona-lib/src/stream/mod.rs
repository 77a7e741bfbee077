//! Resilient server-push event client.
//!
//! [`StreamClient`] keeps at most one [`Connection`] per channel key, runs a
//! periodic health pass and reconnects with backoff. The
//! [`BackgroundModeController`] maps app lifecycle signals onto the client's
//! background mode.

mod background;
mod client;
mod connection;
mod sse;
mod transport;

pub use background::{BackgroundModeController, LifecycleEvent};
pub use client::StreamClient;
pub use connection::{Connection, ConnectionState, ErrorCallback, EventCallback, StateBoard};
pub use sse::{
    extract_payload, ChannelPayload, SseDecoder, SseFrame, EVENT_AUTH_REVOKED, EVENT_CANCEL,
    EVENT_KEEP_ALIVE,
};
pub use transport::{EventStream, EventTransport};

#[cfg(feature = "http")]
pub use transport::HttpEventTransport;
