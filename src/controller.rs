//! The top-level facade: drives the CONNECT/AUTH/PING handshake, owns every other
//! component for the lifetime of one connection, and multiplexes heartbeat-loss and
//! peer-initiated close into listener events (spec §4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::app_host::ApplicationHost;
use crate::config::CastClientConfig;
use crate::connection::{is_close, ConnectionChannel, RemoteCloseWatcher};
use crate::device_auth;
use crate::errors::{Error, Result};
use crate::heartbeat::HeartbeatEngine;
use crate::proxies::receiver::Status;
use crate::receiver::ReceiverChannel;
use crate::transport::{CastStream, ListenerId, SocketChannel};
use crate::wire::{CastMessagePayload, Envelope};

pub const DEFAULT_SENDER_ID_PREFIX: &str = "client";
pub const DEFAULT_RECEIVER_ID: &str = "receiver-0";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Joining,
    Open,
    Closing,
}

/// Sink for the three events the controller promises to deliver at most once per
/// transition (spec §4.6). Every method has a no-op default so callers only
/// implement the events they care about.
pub trait ConnectionListener: Send + Sync {
    fn connection_dead(&self) {}
    fn remote_connection_closed(&self) {}
    fn device_status_updated(&self, _status: Status) {}
}

struct ActiveConnection {
    channel: SocketChannel,
    heartbeat: HeartbeatEngine,
    remote_close: RemoteCloseWatcher,
    status_listener: ListenerId,
    monitor_stop: crossbeam_channel::Sender<()>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    monitor_thread_id: std::thread::ThreadId,
}

/// The state background threads need to act autonomously: a heartbeat thread
/// declaring the channel dead, or the monitor thread observing a peer `CLOSE`, each
/// reach the same shared core to tear the connection down and notify listeners,
/// without waiting for the embedder to call back in (spec §4.4, §4.6, §7).
struct ConnectionCore {
    state: Mutex<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
    notified_dead: AtomicBool,
    notified_remote_closed: AtomicBool,
}

impl ConnectionCore {
    fn new() -> ConnectionCore {
        ConnectionCore {
            state: Mutex::new(ConnectionState::Disconnected),
            active: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            notified_dead: AtomicBool::new(false),
            notified_remote_closed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state mutex poisoned")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    /// Called directly from the heartbeat thread once it notices its own silence.
    fn fire_dead(&self) {
        if self.notified_dead.swap(true, Ordering::AcqRel) {
            return;
        }
        log::warn!("heartbeat window elapsed with no evidence of liveness");
        self.teardown();
        for listener in self.listeners.lock().expect("listener vec poisoned").iter() {
            listener.connection_dead();
        }
    }

    /// Called directly from the monitor thread once it observes a peer `CLOSE`.
    fn fire_remote_closed(&self) {
        if self.notified_remote_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("device closed the connection namespace");
        self.teardown();
        for listener in self.listeners.lock().expect("listener vec poisoned").iter() {
            listener.remote_connection_closed();
        }
    }

    /// Tears down the active connection, if any. Idempotent: a second caller racing
    /// in just finds `active` already taken. Never joins the monitor thread from
    /// inside itself — `fire_remote_closed` runs on that very thread.
    fn teardown(&self) {
        self.set_state(ConnectionState::Closing);
        if let Some(conn) = self.active.lock().expect("active mutex poisoned").take() {
            let _ = conn.monitor_stop.try_send(());

            let joining_from_monitor_thread = std::thread::current().id() == conn.monitor_thread_id;
            if !joining_from_monitor_thread {
                if let Some(handle) = conn.monitor_handle.lock().expect("monitor handle mutex poisoned").take() {
                    let _ = handle.join();
                }
            }

            conn.channel.remove_listener(conn.status_listener);
            conn.channel.remove_listener(conn.remote_close.listener_id());
            conn.heartbeat.stop();
            conn.channel.close();
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// A connection to one Cast device. Construct with [`CastDeviceController::v2`];
/// `connect`/`disconnect` may be called repeatedly — each `connect()` builds a fresh
/// socket channel and its satellite components from scratch (closure is terminal,
/// per spec §1's non-goal on automatic reconnection).
pub struct CastDeviceController {
    host: String,
    port: u16,
    config: CastClientConfig,
    sender_id: String,
    core: Arc<ConnectionCore>,
}

impl CastDeviceController {
    /// `tls_override`, when given, takes precedence over `config.use_tls`.
    pub fn v2(
        device_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        config: CastClientConfig,
        tls_override: Option<bool>,
    ) -> CastDeviceController {
        let device_id = device_id.into();
        let mut config = config;
        if let Some(tls) = tls_override {
            config.use_tls = tls;
        }

        log::debug!("constructing cast device controller for {device_id}");

        CastDeviceController {
            host: host.into(),
            port,
            config,
            sender_id: format!("{DEFAULT_SENDER_ID_PREFIX}-{}", Uuid::new_v4()),
            core: Arc::new(ConnectionCore::new()),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.core.listeners.lock().expect("listener vec poisoned").push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ConnectionListener>) {
        self.core
            .listeners
            .lock()
            .expect("listener vec poisoned")
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    /// True if the channel is open. Heartbeat-dead and remote-close detection run
    /// autonomously on their own background threads (spec §4.4/§4.6/§7), so this is
    /// a plain state read rather than a point where liveness gets checked.
    pub fn is_connected(&self) -> bool {
        self.core.state() == ConnectionState::Open
    }

    /// Runs the full CONNECT/AUTH/PING handshake against a single shared deadline
    /// (spec §4.6): "if any step exceeds it, the controller closes the partially
    /// built socket and fails with Timeout".
    pub fn connect(&self, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let deadline = Instant::now() + timeout;

        if self.is_connected() {
            return Ok(());
        }

        self.core.set_state(ConnectionState::Connecting);

        let stream = CastStream::connect(&self.host, self.port, &self.config)
            .map_err(|e| self.fail_connect(e))?;
        let channel = SocketChannel::spawn(stream);

        self.core.set_state(ConnectionState::Authenticating);
        let remaining = remaining_or_timeout(deadline)?;
        if let Err(e) = device_auth::authenticate(
            channel.clone(),
            &self.sender_id,
            DEFAULT_RECEIVER_ID,
            remaining,
        ) {
            channel.close();
            self.core.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        self.core.set_state(ConnectionState::Joining);
        let connection = ConnectionChannel::new(channel.clone(), &self.sender_id, DEFAULT_RECEIVER_ID);
        if let Err(e) = connection.connect() {
            channel.close();
            self.core.set_state(ConnectionState::Disconnected);
            return Err(e);
        }

        self.core.notified_dead.store(false, Ordering::Release);
        self.core.notified_remote_closed.store(false, Ordering::Release);

        let heartbeat_core = Arc::clone(&self.core);
        let heartbeat = HeartbeatEngine::start(
            channel.clone(),
            self.sender_id.clone(),
            DEFAULT_RECEIVER_ID.to_owned(),
            self.config.heartbeat_interval,
            self.config.heartbeat_window(),
            move || heartbeat_core.fire_dead(),
        );

        let remote_close = RemoteCloseWatcher::attach(&channel);
        let close_messages = remote_close.receiver();
        let (status_tx, status_rx) = crossbeam_channel::unbounded();
        let status_listener = channel.add_listener(crate::receiver::NAMESPACE, status_tx);

        let (monitor_stop_tx, monitor_stop_rx) = crossbeam_channel::bounded(0);
        let monitor_core = Arc::clone(&self.core);
        let monitor_handle = std::thread::Builder::new()
            .name("cast-client-monitor".to_owned())
            .spawn(move || Self::monitor_loop(monitor_stop_rx, status_rx, close_messages, monitor_core))
            .expect("failed to spawn cast-client monitor thread");
        let monitor_thread_id = monitor_handle.thread().id();

        *self.core.active.lock().expect("active mutex poisoned") = Some(ActiveConnection {
            channel,
            heartbeat,
            remote_close,
            status_listener,
            monitor_stop: monitor_stop_tx,
            monitor_handle: Mutex::new(Some(monitor_handle)),
            monitor_thread_id,
        });

        self.core.set_state(ConnectionState::Open);
        Ok(())
    }

    fn fail_connect(&self, e: Error) -> Error {
        self.core.set_state(ConnectionState::Disconnected);
        e
    }

    /// Forwards unsolicited `RECEIVER_STATUS` pushes to `device_status_updated`
    /// listeners, and reacts to a peer-initiated `CLOSE` the moment it is dispatched
    /// by calling [`ConnectionCore::fire_remote_closed`] directly — no caller needs
    /// to poll for either condition (spec §4.6, §7).
    fn monitor_loop(
        stop: crossbeam_channel::Receiver<()>,
        status_updates: crossbeam_channel::Receiver<crate::wire::CastMessage>,
        close_messages: crossbeam_channel::Receiver<crate::wire::CastMessage>,
        core: Arc<ConnectionCore>,
    ) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => return,
                recv(status_updates) -> message => {
                    let Ok(message) = message else { return };
                    if let Some(status) = Self::parse_unsolicited_status(&message) {
                        for listener in core.listeners.lock().expect("listener vec poisoned").iter() {
                            listener.device_status_updated(status.clone());
                        }
                    }
                }
                recv(close_messages) -> message => {
                    let Ok(message) = message else { return };
                    if is_close(&message) {
                        core.fire_remote_closed();
                        return;
                    }
                }
            }
        }
    }

    fn parse_unsolicited_status(message: &crate::wire::CastMessage) -> Option<Status> {
        let CastMessagePayload::String(payload) = &message.payload else {
            return None;
        };
        let envelope = Envelope::parse(payload).ok()?;
        if !envelope.has_type("RECEIVER_STATUS") || envelope.request_id.is_some() {
            return None;
        }
        let reply: crate::proxies::receiver::StatusReply = envelope.into_typed().ok()?;
        Some(reply.status)
    }

    /// Sends `CLOSE`, stops the heartbeat engine, and closes the socket channel.
    /// Idempotent.
    pub fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            self.core.teardown();
            return Ok(());
        }

        self.core.set_state(ConnectionState::Closing);
        if let Some(conn) = self.core.active.lock().expect("active mutex poisoned").as_ref() {
            let connection = ConnectionChannel::new(conn.channel.clone(), &self.sender_id, DEFAULT_RECEIVER_ID);
            let _ = connection.close();
        }
        self.core.teardown();
        Ok(())
    }

    fn receiver_channel(&self) -> Result<ReceiverChannel> {
        let active = self.core.active.lock().expect("active mutex poisoned");
        let conn = active
            .as_ref()
            .ok_or_else(|| Error::IllegalState("not connected".to_owned()))?;
        Ok(ReceiverChannel::new(conn.channel.clone(), &self.sender_id, DEFAULT_RECEIVER_ID))
    }

    pub fn get_device_status(&self, timeout: Option<Duration>) -> Result<Status> {
        self.receiver_channel()?.get_status(timeout)
    }

    pub fn mute_device(&self, timeout: Option<Duration>) -> Result<Status> {
        self.receiver_channel()?.set_muted(true, timeout)
    }

    pub fn unmute_device(&self, timeout: Option<Duration>) -> Result<Status> {
        self.receiver_channel()?.set_muted(false, timeout)
    }

    pub fn change_device_volume(&self, level: f32, timeout: Option<Duration>) -> Result<Status> {
        self.receiver_channel()?.set_volume_level(level, timeout)
    }

    pub fn is_app_available(&self, app_id: &str, timeout: Option<Duration>) -> Result<bool> {
        self.receiver_channel()?.is_app_available(app_id, timeout)
    }

    pub fn get_apps_availability(
        &self,
        app_ids: &[&str],
        timeout: Option<Duration>,
    ) -> Result<std::collections::HashMap<String, bool>> {
        self.receiver_channel()?.get_app_availability(app_ids, timeout)
    }

    /// Builds an [`ApplicationHost`] bound to the current connection. Returns
    /// [`Error::IllegalState`] if not connected.
    pub fn application_host(&self) -> Result<ApplicationHost> {
        let active = self.core.active.lock().expect("active mutex poisoned");
        let conn = active
            .as_ref()
            .ok_or_else(|| Error::IllegalState("not connected".to_owned()))?;
        Ok(ApplicationHost::new(conn.channel.clone(), self.sender_id.clone()))
    }
}

fn remaining_or_timeout(deadline: Instant) -> Result<Duration> {
    let now = Instant::now();
    if now >= deadline {
        return Err(Error::Timeout(Duration::from_secs(0)));
    }
    Ok(deadline - now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        let controller = CastDeviceController::v2(
            "device-1",
            "127.0.0.1",
            8009,
            CastClientConfig::default(),
            Some(false),
        );
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(!controller.is_connected());
    }

    #[test]
    fn sender_id_is_a_stable_uuid_for_the_session() {
        let controller = CastDeviceController::v2(
            "device-1",
            "127.0.0.1",
            8009,
            CastClientConfig::default(),
            None,
        );
        assert_eq!(controller.sender_id, controller.sender_id.clone());
        assert!(controller.sender_id.starts_with(DEFAULT_SENDER_ID_PREFIX));
    }

    #[test]
    fn fire_dead_notifies_listeners_exactly_once() {
        struct Counter(Mutex<u32>);
        impl ConnectionListener for Counter {
            fn connection_dead(&self) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let core = ConnectionCore::new();
        let counter = Arc::new(Counter(Mutex::new(0)));
        core.listeners
            .lock()
            .unwrap()
            .push(counter.clone() as Arc<dyn ConnectionListener>);

        core.fire_dead();
        core.fire_dead();

        assert_eq!(*counter.0.lock().unwrap(), 1);
    }
}
