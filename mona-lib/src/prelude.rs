//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use mona_lib::prelude::*;
//! ```

// Configuration and errors
pub use crate::config::{MonaConfig, StreamConfig};
pub use crate::errors::{MonaError, MonaErrorCode};
pub use crate::Result;

// Channels
pub use crate::protocol::{checkout_url, login_url, ChannelKey, ChannelType, LoginScope};

// Stream client
pub use crate::stream::{
    BackgroundModeController, ChannelPayload, ConnectionState, ErrorCallback, EventCallback,
    EventTransport, LifecycleEvent, StreamClient,
};

// Routing and domain state
pub use crate::events::{ChannelMessage, ChannelMessageKind, DomainEvent, EventRouter, EventSink};
pub use crate::state::{AuthState, TransactionInfo, TransactionState};

// Collaborators
pub use crate::gateway::{GatewayError, Headers, PaymentGateway};
pub use crate::secure_storage::{SecureStore, SecureStoreExt, StoreOptions};
