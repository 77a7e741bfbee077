//! One subscription to one remote channel.
//!
//! A [`Connection`] owns four tasks: the read loop, the dispatcher that runs
//! `on_event` in arrival order, a pending reconnect timer and the background
//! heartbeat. All of them are aborted by [`Connection::teardown`].
//!
//! Locking: `status` guards state transitions and publication to the state
//! board, `tasks` guards the task handles. The two are never held together.

use super::sse::{extract_payload, ChannelPayload, SseFrame};
use super::transport::EventTransport;
use crate::config::StreamConfig;
use crate::health::{reconnect_delay, ConnectionHealth};
use crate::protocol::ChannelKey;
use crate::MonaError;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Open while the client is in background mode; heartbeats keep it fresh.
    BackgroundMaintained,
    Error,
}

impl ConnectionState {
    /// Connecting or open.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::BackgroundMaintained
        )
    }

    /// Transport is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Connected | Self::BackgroundMaintained)
    }
}

/// Receives payloads of one channel, in order.
pub type EventCallback = Arc<dyn Fn(ChannelPayload) + Send + Sync>;

/// Receives transport failures of one channel.
pub type ErrorCallback = Arc<dyn Fn(MonaError) + Send + Sync>;

/// Published `{ChannelKey: state}` snapshot.
pub type StateBoard = watch::Sender<HashMap<ChannelKey, ConnectionState>>;

struct Status {
    state: ConnectionState,
    last_event_at: Option<Instant>,
    consecutive_errors: u32,
    in_background: bool,
}

#[derive(Default)]
struct Tasks {
    reader: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

#[derive(Clone, Copy)]
enum Slot {
    Reader,
    Reconnect,
    Heartbeat,
}

impl Tasks {
    fn slot(&mut self, slot: Slot) -> &mut Option<JoinHandle<()>> {
        match slot {
            Slot::Reader => &mut self.reader,
            Slot::Reconnect => &mut self.reconnect,
            Slot::Heartbeat => &mut self.heartbeat,
        }
    }

    fn abort_all(&mut self) {
        for handle in [
            self.reader.take(),
            self.reconnect.take(),
            self.heartbeat.take(),
            self.dispatcher.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

/// Settings a connection is created with.
pub(crate) struct ConnectionParams {
    pub key: ChannelKey,
    pub url: String,
    pub auto_reconnect: bool,
    pub in_background: bool,
    pub on_event: EventCallback,
    pub on_error: ErrorCallback,
}

/// Live subscription owned by the stream client.
pub struct Connection {
    key: ChannelKey,
    url: String,
    auto_reconnect: bool,
    config: Arc<StreamConfig>,
    transport: Arc<dyn EventTransport>,
    board: Arc<StateBoard>,
    on_error: ErrorCallback,
    dispatch_tx: mpsc::UnboundedSender<ChannelPayload>,
    status: Mutex<Status>,
    tasks: Mutex<Tasks>,
    closed: AtomicBool,
    generation: AtomicU64,
    created_at: Instant,
}

impl Connection {
    /// Create a connection in `Disconnected` and start its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(
        params: ConnectionParams,
        config: Arc<StreamConfig>,
        transport: Arc<dyn EventTransport>,
        board: Arc<StateBoard>,
    ) -> Arc<Self> {
        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<ChannelPayload>();
        let on_event = params.on_event;
        let dispatcher = tokio::spawn(async move {
            while let Some(payload) = dispatch_rx.recv().await {
                on_event(payload);
            }
        });

        let connection = Arc::new(Self {
            key: params.key,
            url: params.url,
            auto_reconnect: params.auto_reconnect,
            config,
            transport,
            board,
            on_error: params.on_error,
            dispatch_tx,
            status: Mutex::new(Status {
                state: ConnectionState::Disconnected,
                last_event_at: None,
                consecutive_errors: 0,
                in_background: params.in_background,
            }),
            tasks: Mutex::new(Tasks {
                dispatcher: Some(dispatcher),
                ..Tasks::default()
            }),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            created_at: Instant::now(),
        });

        {
            let status = connection.lock_status();
            connection.publish_locked(&status);
        }
        connection
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_status().state
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.lock_status().consecutive_errors
    }

    /// `consecutive_errors` below the configured threshold.
    pub fn is_healthy(&self) -> bool {
        self.consecutive_errors() < self.config.max_consecutive_errors
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Snapshot for the health pass.
    pub fn health(&self) -> ConnectionHealth {
        let status = self.lock_status();
        let last_activity = status.last_event_at.unwrap_or(self.created_at);
        ConnectionHealth {
            key: self.key.clone(),
            state: status.state,
            consecutive_errors: status.consecutive_errors,
            idle_for: Instant::now().saturating_duration_since(last_activity),
            has_received_event: status.last_event_at.is_some(),
            in_background: status.in_background,
            auto_reconnect: self.auto_reconnect,
        }
    }

    /// Whether a reconnect timer is waiting to fire.
    pub fn reconnect_pending(&self) -> bool {
        self.lock_tasks()
            .reconnect
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Caller holds the status lock; skipped once torn down.
    fn publish_locked(&self, status: &Status) {
        if self.is_closed() {
            return;
        }
        let state = status.state;
        self.board.send_modify(|states| {
            states.insert(self.key.clone(), state);
        });
    }

    /// Store a task handle, or abort it if the connection is already closed.
    fn install(&self, slot: Slot, handle: JoinHandle<()>) {
        let mut tasks = self.lock_tasks();
        if self.is_closed() {
            handle.abort();
            return;
        }
        if let Some(previous) = tasks.slot(slot).replace(handle) {
            previous.abort();
        }
    }

    fn abort_slot(&self, slot: Slot) {
        if let Some(handle) = self.lock_tasks().slot(slot).take() {
            handle.abort();
        }
    }

    /// Open the transport and start reading. Replaces any running reader.
    pub(crate) fn establish(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut status = self.lock_status();
            status.state = ConnectionState::Connecting;
            self.publish_locked(&status);
        }
        debug!(channel = %self.key, generation, "Establishing connection");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.read_loop(generation).await });
        self.install(Slot::Reader, handle);
    }

    async fn read_loop(self: Arc<Self>, generation: u64) {
        let timeout = self.config.connect_timeout();
        let mut stream = match tokio::time::timeout(timeout, self.transport.open(&self.url)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.on_failure(generation, e);
                return;
            }
            Err(_) => {
                self.on_failure(
                    generation,
                    MonaError::ConnectionTimeout {
                        operation: format!("open {}", self.key),
                        timeout_ms: timeout.as_millis() as u64,
                    },
                );
                return;
            }
        };

        self.on_open(generation);

        while let Some(item) = stream.next().await {
            if !self.is_current(generation) || self.is_closed() {
                return;
            }
            match item {
                Ok(frame) => {
                    if !self.on_frame(frame) {
                        break;
                    }
                }
                Err(e) => {
                    self.on_failure(generation, e);
                    return;
                }
            }
        }

        self.on_closed(generation);
    }

    fn on_open(self: &Arc<Self>, generation: u64) {
        let background = {
            let mut status = self.lock_status();
            if self.is_closed() || !self.is_current(generation) {
                return;
            }
            status.state = if status.in_background {
                ConnectionState::BackgroundMaintained
            } else {
                ConnectionState::Connected
            };
            status.consecutive_errors = 0;
            status.last_event_at = Some(Instant::now());
            self.publish_locked(&status);
            status.in_background
        };
        info!(channel = %self.key, background, "Channel connected");

        if background {
            self.start_heartbeat();
        }
    }

    /// Returns false when the server ended the subscription.
    fn on_frame(&self, frame: SseFrame) -> bool {
        if frame.is_server_close() {
            debug!(channel = %self.key, event = ?frame.event, "Server closed channel");
            return false;
        }

        self.touch(true);
        if frame.is_keep_alive() {
            return true;
        }

        match extract_payload(&frame.data) {
            Ok(Some(payload)) => {
                if self.dispatch_tx.send(payload).is_err() {
                    debug!(channel = %self.key, "Dispatcher gone, dropping payload");
                }
            }
            Ok(None) => debug!(channel = %self.key, "Null payload ignored"),
            Err(e) => warn!(channel = %self.key, error = %e, "Dropping malformed payload"),
        }
        true
    }

    fn touch(&self, reset_errors: bool) {
        let mut status = self.lock_status();
        status.last_event_at = Some(Instant::now());
        if reset_errors {
            status.consecutive_errors = 0;
        }
    }

    fn on_failure(self: &Arc<Self>, generation: u64, error: MonaError) {
        let errors = {
            let mut status = self.lock_status();
            if self.is_closed() || !self.is_current(generation) {
                return;
            }
            status.state = ConnectionState::Error;
            status.consecutive_errors = status.consecutive_errors.saturating_add(1);
            self.publish_locked(&status);
            status.consecutive_errors
        };
        warn!(channel = %self.key, errors, error = %error, "Channel failed");

        self.abort_slot(Slot::Heartbeat);
        (self.on_error)(error);

        if self.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    fn on_closed(self: &Arc<Self>, generation: u64) {
        {
            let mut status = self.lock_status();
            if self.is_closed() || !self.is_current(generation) {
                return;
            }
            status.state = ConnectionState::Disconnected;
            self.publish_locked(&status);
        }
        info!(channel = %self.key, "Channel closed");

        self.abort_slot(Slot::Heartbeat);
        if self.auto_reconnect {
            self.schedule_reconnect();
        }
    }

    /// Schedule a reconnect, replacing any pending one.
    pub(crate) fn schedule_reconnect(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let (delay, errors) = {
            let status = self.lock_status();
            let after_error = status.state == ConnectionState::Error;
            (
                reconnect_delay(&self.config, status.consecutive_errors, after_error),
                status.consecutive_errors,
            )
        };
        debug!(
            channel = %self.key,
            errors,
            delay_secs = delay.as_secs(),
            "Scheduling reconnect"
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.establish();
        });
        self.install(Slot::Reconnect, handle);
    }

    /// Drop the current transport and reconnect after the clean-close delay.
    pub(crate) fn force_reconnect(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.abort_slot(Slot::Reader);
        self.abort_slot(Slot::Heartbeat);
        {
            let mut status = self.lock_status();
            status.state = ConnectionState::Disconnected;
            self.publish_locked(&status);
        }
        info!(channel = %self.key, "Forcing reconnect");
        self.schedule_reconnect();
    }

    pub(crate) fn enter_background(self: &Arc<Self>) {
        let open = {
            let mut status = self.lock_status();
            status.in_background = true;
            if status.state == ConnectionState::Connected {
                status.state = ConnectionState::BackgroundMaintained;
                self.publish_locked(&status);
                true
            } else {
                false
            }
        };
        if open {
            self.start_heartbeat();
        }
    }

    pub(crate) fn exit_background(&self) {
        {
            let mut status = self.lock_status();
            status.in_background = false;
            if status.state == ConnectionState::BackgroundMaintained {
                status.state = ConnectionState::Connected;
                self.publish_locked(&status);
            }
        }
        self.abort_slot(Slot::Heartbeat);
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let period = self.config.heartbeat_interval();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(connection) = weak.upgrade() else {
                    return;
                };
                let maintained = connection.state() == ConnectionState::BackgroundMaintained;
                if maintained {
                    connection.touch(false);
                }
            }
        });
        self.install(Slot::Heartbeat, handle);
    }

    /// Cancel all tasks, close the transport and leave the state board.
    /// Idempotent.
    pub(crate) fn teardown(&self) {
        {
            let _status = self.lock_status();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.board.send_modify(|states| {
                states.remove(&self.key);
            });
        }
        self.lock_tasks().abort_all();
        debug!(channel = %self.key, "Connection torn down");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("url", &self.url)
            .field("state", &self.state())
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}
