//! Registry of live channel connections.

use super::connection::{
    Connection, ConnectionParams, ConnectionState, ErrorCallback, EventCallback, StateBoard,
};
use super::transport::EventTransport;
use crate::config::StreamConfig;
use crate::health::{ConnectionHealth, HealthVerdict};
use crate::protocol::ChannelKey;
use crate::{MonaError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Server-push client keeping one connection per [`ChannelKey`].
///
/// Cheap to clone; all clones share the same connections. Dropping the last
/// clone tears every connection down.
///
/// # Example
///
/// ```ignore
/// let client = StreamClient::with_http(StreamConfig::new("https://rtdb.example.com"))?;
/// client.subscribe_channel(
///     ChannelKey::payment_updates("T1"),
///     Arc::new(|payload| println!("{:?}", payload)),
///     Arc::new(|error| eprintln!("{}", error)),
/// )?;
/// ```
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Arc<StreamConfig>,
    transport: Arc<dyn EventTransport>,
    connections: Mutex<HashMap<ChannelKey, Arc<Connection>>>,
    board: Arc<StateBoard>,
    in_background: AtomicBool,
    health_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl StreamClient {
    pub fn new(config: StreamConfig, transport: Arc<dyn EventTransport>) -> Self {
        let (board, _) = watch::channel(HashMap::new());
        Self {
            inner: Arc::new(ClientInner {
                config: Arc::new(config),
                transport,
                connections: Mutex::new(HashMap::new()),
                board: Arc::new(board),
                in_background: AtomicBool::new(false),
                health_task: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Client over the default `text/event-stream` transport.
    #[cfg(feature = "http")]
    pub fn with_http(config: StreamConfig) -> Result<Self> {
        let transport = super::transport::HttpEventTransport::new(config.connect_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    /// Subscribe `key` to `base_url + path`.
    ///
    /// No-op when an active, healthy connection already exists for the key.
    /// Otherwise any previous connection for the key is torn down and a new
    /// one established. Must be called from within a Tokio runtime.
    pub fn subscribe(
        &self,
        key: ChannelKey,
        path: &str,
        on_event: EventCallback,
        on_error: ErrorCallback,
        auto_reconnect: bool,
    ) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(MonaError::state("stream client has been disposed"));
        }

        let connection = {
            let mut connections = self.inner.lock_connections();
            if let Some(existing) = connections.get(&key) {
                if existing.state().is_active() && existing.is_healthy() {
                    debug!(channel = %key, "Already subscribed");
                    return Ok(());
                }
            }
            if let Some(previous) = connections.remove(&key) {
                debug!(channel = %key, state = ?previous.state(), "Replacing connection");
                previous.teardown();
            }

            let connection = Connection::new(
                ConnectionParams {
                    key: key.clone(),
                    url: self.inner.config.url_for(path),
                    auto_reconnect,
                    in_background: self.is_in_background(),
                    on_event,
                    on_error,
                },
                Arc::clone(&self.inner.config),
                Arc::clone(&self.inner.transport),
                Arc::clone(&self.inner.board),
            );
            connections.insert(key.clone(), Arc::clone(&connection));
            connection
        };

        info!(channel = %key, auto_reconnect, "Subscribing");
        connection.establish();
        self.ensure_health_task();
        Ok(())
    }

    /// Subscribe using the key's own path with auto-reconnect.
    pub fn subscribe_channel(
        &self,
        key: ChannelKey,
        on_event: EventCallback,
        on_error: ErrorCallback,
    ) -> Result<()> {
        let path = key.path()?;
        self.subscribe(key, &path, on_event, on_error, true)
    }

    /// Tear down the connection for `key`. Idempotent.
    pub fn unsubscribe(&self, key: &ChannelKey) {
        let (removed, now_empty) = {
            let mut connections = self.inner.lock_connections();
            let removed = connections.remove(key);
            (removed, connections.is_empty())
        };
        if let Some(connection) = removed {
            connection.teardown();
            info!(channel = %key, "Unsubscribed");
        }
        if now_empty {
            self.inner.stop_health_task();
        }
    }

    /// Tear down every connection. Idempotent.
    pub fn dispose_all(&self) {
        self.inner.teardown_all();
    }

    /// Tear everything down and reject later subscribes.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.teardown_all();
    }

    /// Whether the periodic health pass is scheduled.
    pub fn is_health_task_running(&self) -> bool {
        self.inner
            .lock_health_task()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Enter background mode: open connections become background-maintained
    /// and start heartbeats. Repeated calls are no-ops.
    pub fn enter_background(&self) {
        if self.inner.in_background.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Entering background mode");
        for connection in self.inner.snapshot() {
            connection.enter_background();
        }
    }

    /// Leave background mode and run one health pass immediately.
    pub fn exit_background(&self) {
        if !self.inner.in_background.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Exiting background mode");
        for connection in self.inner.snapshot() {
            connection.exit_background();
        }
        self.run_health_check();
    }

    pub fn is_in_background(&self) -> bool {
        self.inner.in_background.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> usize {
        self.inner.lock_connections().len()
    }

    pub fn connection_state(&self, key: &ChannelKey) -> Option<ConnectionState> {
        self.inner.lock_connections().get(key).map(|c| c.state())
    }

    pub fn connection_health(&self, key: &ChannelKey) -> Option<ConnectionHealth> {
        self.inner.lock_connections().get(key).map(|c| c.health())
    }

    /// Current `{ChannelKey: state}` snapshot.
    pub fn states(&self) -> HashMap<ChannelKey, ConnectionState> {
        self.inner.board.borrow().clone()
    }

    /// Observe state snapshots as they change.
    pub fn subscribe_states(&self) -> watch::Receiver<HashMap<ChannelKey, ConnectionState>> {
        self.inner.board.subscribe()
    }

    /// Run one health pass. Returns the number of reconnects scheduled.
    pub fn run_health_check(&self) -> usize {
        self.inner.run_health_check()
    }

    fn ensure_health_task(&self) {
        let mut slot = self.inner.lock_health_task();
        if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.health_check_interval();
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.run_health_check();
            }
        }));
    }
}

impl ClientInner {
    fn lock_connections(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelKey, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_health_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.health_task.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.lock_connections().values().cloned().collect()
    }

    fn stop_health_task(&self) {
        if let Some(handle) = self.lock_health_task().take() {
            handle.abort();
        }
    }

    fn teardown_all(&self) {
        let drained: Vec<Arc<Connection>> = {
            let mut connections = self.lock_connections();
            connections.drain().map(|(_, c)| c).collect()
        };
        for connection in &drained {
            connection.teardown();
        }
        self.stop_health_task();
        if !drained.is_empty() {
            info!(count = drained.len(), "Disposed connections");
        }
    }

    fn run_health_check(&self) -> usize {
        let in_background = self.in_background.load(Ordering::SeqCst);
        let mut rescheduled = 0;

        for connection in self.snapshot() {
            if !connection.auto_reconnect() || connection.is_closed() {
                continue;
            }
            let health = connection.health();
            match health.verdict(&self.config) {
                HealthVerdict::Healthy => continue,
                HealthVerdict::TooManyErrors if in_background => {
                    debug!(
                        channel = %health.key,
                        errors = health.consecutive_errors,
                        "Backgrounded, not forcing reconnect"
                    );
                    continue;
                }
                verdict => {
                    if health.state.is_open() {
                        debug!(channel = %health.key, ?verdict, "Open but unhealthy");
                        connection.force_reconnect();
                        rescheduled += 1;
                    } else if health.state != ConnectionState::Connecting
                        && !connection.reconnect_pending()
                    {
                        debug!(channel = %health.key, ?verdict, "No reconnect pending");
                        connection.schedule_reconnect();
                        rescheduled += 1;
                    }
                }
            }
        }
        rescheduled
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.teardown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChannelPayload;
    use crate::test_utils::MockEventTransport;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn client(transport: &MockEventTransport) -> StreamClient {
        StreamClient::new(
            StreamConfig::new("https://rtdb.test"),
            Arc::new(transport.clone()),
        )
    }

    fn noop_callbacks() -> (EventCallback, ErrorCallback) {
        (Arc::new(|_| {}), Arc::new(|_| {}))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    const UPDATES_URL: &str = "https://rtdb.test/public/paymentUpdate/T1.json";

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_twice_opens_once() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");

        let (on_event, on_error) = noop_callbacks();
        client
            .subscribe_channel(key.clone(), on_event.clone(), on_error.clone())
            .unwrap();
        settle().await;
        client.subscribe_channel(key.clone(), on_event, on_error).unwrap();
        settle().await;

        assert_eq!(transport.open_count(UPDATES_URL), 1);
        assert_eq!(client.active_connections(), 1);
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_delivered_in_order() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        client
            .subscribe_channel(
                ChannelKey::payment_updates("T1"),
                Arc::new(move |payload: ChannelPayload| sink.lock().unwrap().push(payload)),
                Arc::new(|_| {}),
            )
            .unwrap();
        settle().await;

        transport.push_data(UPDATES_URL, r#"{"event":"progress_update"}"#);
        transport.push_data(UPDATES_URL, "null");
        transport.push_data(UPDATES_URL, "{broken");
        transport.push_data(
            UPDATES_URL,
            r#"{"path":"/","data":{"event":"transaction_completed"}}"#,
        );
        settle().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1].to_json().unwrap()["event"],
            "transaction_completed"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_counts_errors_and_backs_off() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");
        let errors = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&errors);

        client
            .subscribe_channel(
                key.clone(),
                Arc::new(|_| {}),
                Arc::new(move |_| *counter.lock().unwrap() += 1),
            )
            .unwrap();
        settle().await;

        transport.push_error(UPDATES_URL, MonaError::Transport("reset".into()));
        settle().await;
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Error));
        assert_eq!(*errors.lock().unwrap(), 1);

        // error base 5s * min(1 * 2, 8)
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(transport.open_count(UPDATES_URL), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), 2);
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Connected));
        assert_eq!(client.connection_health(&key).unwrap().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_connection_reconnects_exactly_once() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let (on_event, on_error) = noop_callbacks();
        client
            .subscribe_channel(ChannelKey::payment_updates("T1"), on_event, on_error)
            .unwrap();
        settle().await;

        // health ticks at 30s steps; 330s is the first with idle > 300s
        tokio::time::sleep(Duration::from_secs(329)).await;
        assert_eq!(transport.open_count(UPDATES_URL), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), 2);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(transport.open_count(UPDATES_URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_intervals_keep_timers_running() {
        let transport = MockEventTransport::new();
        let config = StreamConfig::new("https://rtdb.test")
            .with_health_check_interval(0)
            .with_heartbeat_interval(0)
            .with_stale_after(5);
        let client = StreamClient::new(config, Arc::new(transport.clone()));
        let key = ChannelKey::payment_updates("T1");
        let (on_event, on_error) = noop_callbacks();
        client.subscribe_channel(key.clone(), on_event, on_error).unwrap();
        settle().await;

        // one-second health passes still catch the stale stream
        tokio::time::sleep(Duration::from_secs(12)).await;
        settle().await;
        assert!(transport.open_count(UPDATES_URL) >= 2);
        assert!(client.is_health_task_running());

        // one-second heartbeats keep a background connection fresh
        client.enter_background();
        let opens = transport.open_count(UPDATES_URL);
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), opens);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_heartbeat_prevents_staleness() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");
        let (on_event, on_error) = noop_callbacks();
        client.subscribe_channel(key.clone(), on_event, on_error).unwrap();
        settle().await;

        client.enter_background();
        assert_eq!(
            client.connection_state(&key),
            Some(ConnectionState::BackgroundMaintained)
        );

        tokio::time::sleep(Duration::from_secs(900)).await;
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), 1);
        assert!(client.connection_health(&key).unwrap().idle_for <= Duration::from_secs(10));

        client.exit_background();
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_schedules_reconnect() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");
        let (on_event, on_error) = noop_callbacks();
        client.subscribe_channel(key.clone(), on_event, on_error).unwrap();
        settle().await;

        transport.push_frame(UPDATES_URL, crate::stream::SseFrame::named("cancel", ""));
        settle().await;
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Disconnected));

        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_auto_reconnect_stays_down() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");
        let (on_event, on_error) = noop_callbacks();
        client
            .subscribe(key.clone(), "/public/paymentUpdate/T1.json", on_event, on_error, false)
            .unwrap();
        settle().await;

        transport.close(UPDATES_URL);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.open_count(UPDATES_URL), 1);
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_twice_leaves_nothing() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let (on_event, on_error) = noop_callbacks();
        client
            .subscribe_channel(
                ChannelKey::payment_updates("T1"),
                on_event.clone(),
                on_error.clone(),
            )
            .unwrap();
        client
            .subscribe_channel(ChannelKey::custom_tab_close(), on_event.clone(), on_error.clone())
            .unwrap();
        settle().await;

        client.unsubscribe(&ChannelKey::custom_tab_close());
        client.unsubscribe(&ChannelKey::custom_tab_close());
        client.dispose_all();
        client.dispose_all();
        assert_eq!(client.active_connections(), 0);
        assert!(client.states().is_empty());

        client.dispose();
        client.dispose();
        let err = client
            .subscribe_channel(ChannelKey::payment_updates("T1"), on_event, on_error)
            .unwrap_err();
        assert!(matches!(err, MonaError::State(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_connection_is_replaced() {
        let transport = MockEventTransport::new();
        let client = client(&transport);
        let key = ChannelKey::payment_updates("T1");
        transport.fail_next_open(UPDATES_URL, MonaError::Transport("down".into()));
        let (on_event, on_error) = noop_callbacks();
        client
            .subscribe_channel(key.clone(), on_event.clone(), on_error.clone())
            .unwrap();
        settle().await;
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Error));

        // errored connection is not active, so a new subscribe replaces it
        client.subscribe_channel(key.clone(), on_event, on_error).unwrap();
        settle().await;
        assert_eq!(transport.open_count(UPDATES_URL), 2);
        assert_eq!(client.connection_state(&key), Some(ConnectionState::Connected));
        assert_eq!(client.active_connections(), 1);
    }
}
