//! Scripted event transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::stream::{EventStream, EventTransport, SseFrame};
use crate::{MonaError, Result};

type FrameSender = mpsc::UnboundedSender<Result<SseFrame>>;

#[derive(Default)]
struct TransportState {
    opens: HashMap<String, usize>,
    streams: HashMap<String, FrameSender>,
    backlog: HashMap<String, Vec<Result<SseFrame>>>,
    failures: HashMap<String, VecDeque<MonaError>>,
}

/// In-memory [`EventTransport`].
///
/// Every `open` creates a fresh stream for the URL. Frames pushed while no
/// stream is open are held and delivered on the next open.
#[derive(Clone, Default)]
pub struct MockEventTransport {
    state: Arc<Mutex<TransportState>>,
    opened: Arc<Notify>,
}

impl MockEventTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of `open` calls for `url`, failed ones included.
    pub fn open_count(&self, url: &str) -> usize {
        self.lock().opens.get(url).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.lock().opens.values().sum()
    }

    /// Whether a stream for `url` is currently open.
    pub fn is_open(&self, url: &str) -> bool {
        self.lock()
            .streams
            .get(url)
            .map_or(false, |tx| !tx.is_closed())
    }

    /// Make the next `open` of `url` fail with `error`.
    pub fn fail_next_open(&self, url: &str, error: MonaError) {
        self.lock()
            .failures
            .entry(url.to_string())
            .or_default()
            .push_back(error);
    }

    /// Deliver a frame. Returns false if it was held for a later open.
    pub fn push_frame(&self, url: &str, frame: SseFrame) -> bool {
        self.push(url, Ok(frame))
    }

    /// Deliver an unnamed frame carrying `data`.
    pub fn push_data(&self, url: &str, data: &str) -> bool {
        self.push_frame(url, SseFrame::data(data))
    }

    /// Fail the open stream with `error`.
    pub fn push_error(&self, url: &str, error: MonaError) -> bool {
        self.push(url, Err(error))
    }

    /// End the open stream as if the server closed it.
    pub fn close(&self, url: &str) {
        self.lock().streams.remove(url);
    }

    /// Wait until `url` has been opened at least `count` times.
    pub async fn wait_for_open(&self, url: &str, count: usize) {
        loop {
            let notified = self.opened.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.open_count(url) >= count {
                return;
            }
            notified.await;
        }
    }

    fn push(&self, url: &str, item: Result<SseFrame>) -> bool {
        let mut state = self.lock();
        let item = match state.streams.get(url) {
            Some(tx) => match tx.send(item) {
                Ok(()) => return true,
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };
        state.backlog.entry(url.to_string()).or_default().push(item);
        false
    }
}

#[async_trait]
impl EventTransport for MockEventTransport {
    async fn open(&self, url: &str) -> Result<EventStream> {
        let result = {
            let mut state = self.lock();
            *state.opens.entry(url.to_string()).or_insert(0) += 1;

            match state.failures.get_mut(url).and_then(VecDeque::pop_front) {
                Some(error) => Err(error),
                None => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    for item in state.backlog.remove(url).unwrap_or_default() {
                        let _ = tx.send(item);
                    }
                    state.streams.insert(url.to_string(), tx);
                    let stream: EventStream =
                        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
                            rx.recv().await.map(|item| (item, rx))
                        }));
                    Ok(stream)
                }
            }
        };
        self.opened.notify_waiters();
        result
    }
}
