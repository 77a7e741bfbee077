//! Test utilities for Mona.
//!
//! - [`MockEventTransport`]: scripted server-push streams, one per URL
//! - [`MockPaymentGateway`]: queued gateway responses per path, with a
//!   record of every request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mona_lib::test_utils::{MockEventTransport, MockPaymentGateway};
//!
//! let transport = MockEventTransport::new();
//! let client = StreamClient::new(config, Arc::new(transport.clone()));
//! client.subscribe_channel(ChannelKey::payment_updates("T1"), on_event, on_error)?;
//! transport.push_data(&url, r#"{"event":"transaction_completed"}"#);
//! ```

mod mock_gateway;
mod mock_transport;

pub use mock_gateway::{MockPaymentGateway, RecordedRequest};
pub use mock_transport::MockEventTransport;
