//! Connection lifecycle: lazy connect, readiness wait, channel monitoring,
//! and reconnection with capped, jittered backoff.
//!
//! Concurrency model: all shared state sits behind one mutex that is never
//! held across an await. Connect attempts are deduplicated through a single
//! shared future (at most one in flight); the reconnect timer is a single
//! slot. After `close()` the manager refuses every transition back to a live
//! state.

use crate::backoff::ReconnectBackoff;
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::{ClientError, Code};
use crate::events::{ClientEvent, EventBus};
use crate::sleeper::Sleeper;
use crate::transport::{Channel, ChannelFactory, ChannelState};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Delay before the first channel probe after a successful connect.
const FIRST_PROBE_DELAY: Duration = Duration::from_secs(5);
/// Probe interval while the channel reports `Ready`.
const READY_PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// Probe interval while the channel is settling (`Connecting`/`Idle`).
const SETTLING_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// High-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
        };
        f.write_str(text)
    }
}

type ConnectFuture = Shared<BoxFuture<'static, Result<(), ClientError>>>;

struct ConnState {
    state: ConnectionState,
    channel: Option<Arc<dyn Channel>>,
    reconnect_attempts: u32,
    last_connected_at: Option<u64>,
    last_error_at: Option<u64>,
    last_error: Option<ClientError>,
    pending_connect: Option<ConnectFuture>,
    reconnect_timer: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

struct Inner {
    config: Arc<ClientConfig>,
    factory: Arc<dyn ChannelFactory>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    backoff: ReconnectBackoff,
    conn: Mutex<ConnState>,
    shutting_down: AtomicBool,
}

/// Owns the transport handle and drives the connection state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<ClientConfig>,
        factory: Arc<dyn ChannelFactory>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let backoff =
            ReconnectBackoff::new(config.initial_reconnect_delay, config.max_reconnect_delay);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                events,
                clock,
                sleeper,
                backoff,
                conn: Mutex::new(ConnState {
                    state: ConnectionState::Disconnected,
                    channel: None,
                    reconnect_attempts: 0,
                    last_connected_at: None,
                    last_error_at: None,
                    last_error: None,
                    pending_connect: None,
                    reconnect_timer: None,
                    monitor: None,
                }),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Connect if necessary. Concurrent callers share one connect attempt;
    /// returns whether the manager ended up `CONNECTED`.
    pub async fn ensure_connected(&self) -> bool {
        if self.is_shutting_down() {
            return false;
        }
        {
            let conn = self.lock();
            if conn.state == ConnectionState::Connected && conn.channel.is_some() {
                return true;
            }
        }
        let pending = self.connect_shared();
        let _ = pending.await;
        self.is_connected()
    }

    pub fn is_connected(&self) -> bool {
        let conn = self.lock();
        conn.state == ConnectionState::Connected && conn.channel.is_some()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().reconnect_attempts
    }

    pub fn last_connected_at(&self) -> Option<u64> {
        self.lock().last_connected_at
    }

    pub fn last_error_at(&self) -> Option<u64> {
        self.lock().last_error_at
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.lock().last_error.clone()
    }

    /// The current transport handle, when connected.
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.lock().channel.clone()
    }

    /// Drop the handle after a connection-level failure and schedule a
    /// reconnect. A no-op unless currently connected.
    pub fn handle_connection_lost(&self) {
        let channel = {
            let mut conn = self.lock();
            if conn.state != ConnectionState::Connected {
                return;
            }
            conn.state = ConnectionState::Disconnected;
            conn.channel.take()
        };
        tracing::warn!(service = %self.inner.config.service_name, "connection lost");
        self.inner.events.emit(&ClientEvent::Disconnected);
        if let Some(channel) = channel {
            channel.close();
        }
        self.schedule_reconnect();
    }

    /// Stop everything: cancel timers, release the handle, refuse future
    /// transitions. Idempotent.
    pub fn close(&self) {
        let already = self.inner.shutting_down.swap(true, Ordering::SeqCst);
        let (channel, timer, monitor) = {
            let mut conn = self.lock();
            conn.state = ConnectionState::Disconnected;
            (conn.channel.take(), conn.reconnect_timer.take(), conn.monitor.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(monitor) = monitor {
            monitor.abort();
        }
        if let Some(channel) = channel {
            channel.close();
        }
        if !already {
            tracing::info!(service = %self.inner.config.service_name, "client closed");
            self.inner.events.emit(&ClientEvent::Disconnected);
        }
    }

    /// Join (or start) the single in-flight connect attempt.
    fn connect_shared(&self) -> ConnectFuture {
        let mut conn = self.lock();
        if let Some(pending) = &conn.pending_connect {
            return pending.clone();
        }
        let this = self.clone();
        // The attempt runs as its own task so it survives caller cancellation;
        // clearing the slot is the task's final action.
        let task = tokio::spawn(async move {
            let result = this.connect().await;
            this.lock().pending_connect = None;
            result
        });
        let pending: ConnectFuture = async move {
            match task.await {
                Ok(result) => result,
                Err(_) => Err(ClientError::new(Code::Internal, "connect task failed")),
            }
        }
        .boxed()
        .shared();
        conn.pending_connect = Some(pending.clone());
        pending
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let service = self.inner.config.service_name.clone();
        {
            let mut conn = self.lock();
            // Checked under the lock: close() flips the flag before taking it,
            // so a racing shutdown can never be overwritten with a live state.
            if self.is_shutting_down() {
                return Err(ClientError::shutting_down(&service));
            }
            conn.state = if conn.reconnect_attempts > 0 {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            };
        }
        self.inner.events.emit(&ClientEvent::Connecting);
        tracing::info!(service = %service, url = %self.inner.config.grpc_url, "connecting");

        match self.establish().await {
            Ok(channel) => {
                let now = self.inner.clock.now_millis();
                {
                    let mut conn = self.lock();
                    if self.is_shutting_down() {
                        // close() raced the handshake; do not resurrect.
                        conn.state = ConnectionState::Disconnected;
                        channel.close();
                        return Err(ClientError::shutting_down(&service));
                    }
                    conn.channel = Some(channel);
                    conn.state = ConnectionState::Connected;
                    conn.last_connected_at = Some(now);
                    conn.reconnect_attempts = 0;
                    conn.last_error = None;
                }
                self.inner.events.emit(&ClientEvent::Connected);
                tracing::info!(service = %service, "connected");
                self.start_monitor();
                Ok(())
            }
            Err(err) => {
                {
                    let mut conn = self.lock();
                    conn.last_error_at = Some(self.inner.clock.now_millis());
                    conn.last_error = Some(err.clone());
                    conn.state = ConnectionState::Disconnected;
                }
                tracing::warn!(service = %service, error = %err, "connection attempt failed");
                self.inner.events.emit(&ClientEvent::Error(err.clone()));
                self.schedule_reconnect();
                Err(err)
            }
        }
    }

    async fn establish(&self) -> Result<Arc<dyn Channel>, ClientError> {
        let options = self.inner.config.transport_options();
        let channel = self.inner.factory.create(&options).map_err(ClientError::from)?;
        match channel.wait_for_ready(self.inner.config.timeout).await {
            Ok(()) => Ok(channel),
            Err(status) => {
                channel.close();
                Err(ClientError::from(status))
            }
        }
    }

    /// Background probe of the channel state. Exits on shutdown, on a lost
    /// handle, or after handing a degraded channel to
    /// [`ConnectionManager::handle_connection_lost`].
    fn start_monitor(&self) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.inner.sleeper.sleep(FIRST_PROBE_DELAY).await;
            loop {
                if this.is_shutting_down() {
                    return;
                }
                let channel = this.lock().channel.clone();
                let Some(channel) = channel else { return };
                match channel.state() {
                    ChannelState::Ready => {
                        this.inner.sleeper.sleep(READY_PROBE_INTERVAL).await;
                    }
                    ChannelState::TransientFailure | ChannelState::Shutdown => {
                        tracing::warn!(
                            service = %this.inner.config.service_name,
                            "channel degraded"
                        );
                        this.handle_connection_lost();
                        return;
                    }
                    _ => {
                        this.inner.sleeper.sleep(SETTLING_PROBE_INTERVAL).await;
                    }
                }
            }
        });
        if let Some(old) = self.lock().monitor.replace(handle) {
            old.abort();
        }
    }

    /// Arm the single reconnect timer, honoring the attempt budget.
    fn schedule_reconnect(&self) {
        if self.is_shutting_down() {
            return;
        }
        let mut conn = self.lock();
        if conn.reconnect_timer.is_some() {
            return;
        }
        if let Some(max) = self.inner.config.max_reconnect_attempts {
            if conn.reconnect_attempts >= max {
                tracing::warn!(
                    service = %self.inner.config.service_name,
                    attempts = conn.reconnect_attempts,
                    "max reconnect attempts reached; staying disconnected"
                );
                return;
            }
        }
        let delay = self.inner.backoff.delay(conn.reconnect_attempts);
        conn.reconnect_attempts += 1;
        tracing::info!(
            service = %self.inner.config.service_name,
            attempt = conn.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        let this = self.clone();
        conn.reconnect_timer = Some(tokio::spawn(async move {
            this.inner.sleeper.sleep(delay).await;
            this.lock().reconnect_timer = None;
            if this.is_shutting_down() {
                return;
            }
            // connect() schedules the next attempt itself on failure.
            let _ = this.connect_shared().await;
        }));
    }

    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.inner.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("service", &self.inner.config.service_name)
            .field("state", &self.state())
            .finish()
    }
}
