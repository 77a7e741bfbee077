//! Event transport: opens one server-push stream for a URL.

use super::sse::SseFrame;
use crate::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of frames for one open channel. The stream ends on server close.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseFrame>> + Send>>;

/// Opens server-push streams.
///
/// Implementations report open failures from `open` and read failures as
/// `Err` items on the returned stream. Dropping the stream closes it.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn open(&self, url: &str) -> Result<EventStream>;
}

#[cfg(feature = "http")]
pub use http::HttpEventTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::stream::sse::SseDecoder;
    use crate::MonaError;
    use bytes::Bytes;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tracing::debug;

    type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

    /// `text/event-stream` transport over reqwest.
    pub struct HttpEventTransport {
        client: reqwest::Client,
        connect_timeout: Duration,
    }

    impl HttpEventTransport {
        /// Create a transport. The timeout bounds connection setup only,
        /// streams themselves stay open indefinitely.
        pub fn new(connect_timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|e| MonaError::Internal(format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                client,
                connect_timeout,
            })
        }

        /// Use a preconfigured client.
        pub fn with_client(client: reqwest::Client, connect_timeout: Duration) -> Self {
            Self {
                client,
                connect_timeout,
            }
        }

        fn map_reqwest_error(&self, url: &str, e: reqwest::Error) -> MonaError {
            if e.is_timeout() {
                MonaError::ConnectionTimeout {
                    operation: format!("open {}", url),
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                }
            } else if e.is_connect() {
                MonaError::ConnectionFailed {
                    target: url.to_string(),
                    reason: e.to_string(),
                }
            } else {
                MonaError::Transport(format!("stream request failed: {}", e))
            }
        }
    }

    #[async_trait]
    impl EventTransport for HttpEventTransport {
        async fn open(&self, url: &str) -> Result<EventStream> {
            debug!(url = %url, "Opening event stream");

            let response = self
                .client
                .get(url)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(MonaError::ConnectionFailed {
                    target: url.to_string(),
                    reason: format!("HTTP {}", status.as_u16()),
                });
            }

            let bytes: ByteStream = Box::pin(response.bytes_stream());
            Ok(Box::pin(frames(bytes)))
        }
    }

    struct FrameState {
        bytes: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<SseFrame>,
        done: bool,
    }

    fn frames(bytes: ByteStream) -> impl Stream<Item = Result<SseFrame>> + Send {
        let state = FrameState {
            bytes,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(frame) = state.pending.pop_front() {
                    return Some((Ok(frame), state));
                }
                if state.done {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.pending.extend(state.decoder.push(&chunk)),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(MonaError::Transport(format!("stream read failed: {}", e))),
                            state,
                        ));
                    }
                    None => {
                        state.done = true;
                        state.pending.extend(state.decoder.finish());
                    }
                }
            }
        })
    }
}
