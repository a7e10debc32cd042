//! The heartbeat engine: a PING loop plus a PONG watchdog, running on a dedicated
//! thread (spec §4.4).
//!
//! The teacher's `channels::heartbeat::HeartbeatChannel` only answers PINGs reactively
//! from inside the caller's receive loop; this generalizes it into an independent
//! scheduler using `crossbeam_channel::tick()` raced against a stop channel via
//! `select!`, which is the idiomatic cooperative-cancellation primitive for a
//! polling/ticking worker thread built on `crossbeam-channel` (already a teacher
//! dependency, see `Cargo.toml`). The loop also checks its own dead-window after every
//! tick/pong and calls `on_dead` itself, so a device going silent is noticed without
//! any caller ever having to ask (spec §4.4, §8: "a Requestor/engine detects and acts
//! autonomously").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use serde::Serialize;

use crate::errors::Result;
use crate::transport::{ListenerId, SocketChannel};
use crate::wire::{CastMessage, CastMessagePayload, Envelope};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

/// Shared by [`HeartbeatEngine::is_dead`] and the autonomous `run` loop: true once
/// the channel has gone silent for longer than `window`, measuring from the last
/// PONG if one ever arrived, otherwise from `started_at`.
fn silence_exceeds(last_pong_millis: &AtomicU64, started_at: Instant, window: Duration) -> bool {
    let last = last_pong_millis.load(Ordering::Acquire);
    if last == 0 {
        started_at.elapsed() > window
    } else {
        let elapsed = started_at.elapsed().as_millis() as u64;
        elapsed.saturating_sub(last) > window.as_millis() as u64
    }
}

#[derive(Serialize)]
struct Ping {}

#[derive(Serialize)]
struct Pong {}

/// Tracks liveness and drives the PING loop for one connection. Dropping this (or
/// calling [`HeartbeatEngine::stop`]) stops the background thread; it does not close
/// the underlying [`SocketChannel`].
pub struct HeartbeatEngine {
    stop: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: std::thread::ThreadId,
    last_pong_millis: Arc<AtomicU64>,
    started_at: Instant,
    channel: SocketChannel,
    listener_id: ListenerId,
}

impl HeartbeatEngine {
    /// Starts the PING loop immediately. `sender_id`/`destination_id` address the
    /// heartbeat messages (usually `sender-0`/`receiver-0`, see spec glossary).
    /// `dead_window` is the silence threshold; once exceeded the loop calls
    /// `on_dead` itself and exits, rather than waiting for some other caller to poll
    /// [`HeartbeatEngine::is_dead`] (spec §4.4, §4.6).
    pub fn start(
        channel: SocketChannel,
        sender_id: String,
        destination_id: String,
        interval: Duration,
        dead_window: Duration,
        on_dead: impl Fn() + Send + Sync + 'static,
    ) -> HeartbeatEngine {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let last_pong_millis = Arc::new(AtomicU64::new(0));
        let started_at = Instant::now();

        let (pong_tx, pong_rx) = crossbeam_channel::unbounded();
        let listener_id = channel.add_listener(NAMESPACE, pong_tx);

        let handle = {
            let last_pong_millis = Arc::clone(&last_pong_millis);
            let channel = channel.clone();
            let on_dead: Box<dyn Fn() + Send + Sync> = Box::new(on_dead);
            std::thread::Builder::new()
                .name("cast-client-heartbeat".to_owned())
                .spawn(move || {
                    Self::run(
                        channel,
                        sender_id,
                        destination_id,
                        interval,
                        dead_window,
                        stop_rx,
                        pong_rx,
                        last_pong_millis,
                        started_at,
                        on_dead,
                    )
                })
                .expect("failed to spawn cast-client heartbeat thread")
        };
        let thread_id = handle.thread().id();

        HeartbeatEngine {
            stop: stop_tx,
            handle: Mutex::new(Some(handle)),
            thread_id,
            last_pong_millis,
            started_at,
            channel,
            listener_id,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        channel: SocketChannel,
        sender_id: String,
        destination_id: String,
        interval: Duration,
        dead_window: Duration,
        stop: Receiver<()>,
        pongs: Receiver<CastMessage>,
        last_pong_millis: Arc<AtomicU64>,
        started_at: Instant,
        on_dead: Box<dyn Fn() + Send + Sync>,
    ) {
        let ticks = crossbeam_channel::tick(interval.min(dead_window));

        loop {
            select! {
                recv(stop) -> _ => {
                    log::debug!("heartbeat engine stopping");
                    return;
                }
                recv(ticks) -> _ => {
                    if let Err(e) = Self::send_ping(&channel, &sender_id, &destination_id) {
                        log::warn!("failed to send heartbeat PING: {e}");
                    }
                }
                recv(pongs) -> message => {
                    if let Ok(message) = message {
                        if Self::is_pong(&message) {
                            let elapsed = started_at.elapsed().as_millis() as u64;
                            last_pong_millis.store(elapsed, Ordering::Release);
                        }
                    }
                }
            }

            if silence_exceeds(&last_pong_millis, started_at, dead_window) {
                log::warn!("heartbeat channel silent for longer than {dead_window:?}, declaring it dead");
                on_dead();
                return;
            }
        }
    }

    fn send_ping(channel: &SocketChannel, sender_id: &str, destination_id: &str) -> Result<()> {
        let payload = Envelope::build_request("PING", None, &Ping {})?;
        let message = CastMessage::new(
            NAMESPACE,
            sender_id,
            destination_id,
            CastMessagePayload::String(payload),
        );
        channel.send(&message)
    }

    fn is_pong(message: &CastMessage) -> bool {
        match &message.payload {
            CastMessagePayload::String(s) => Envelope::parse(s)
                .map(|e| e.has_type("PONG"))
                .unwrap_or(false),
            CastMessagePayload::Binary(_) => false,
        }
    }

    /// Milliseconds since the engine started that the most recent PONG arrived at, or
    /// `None` if none has arrived yet.
    pub fn millis_since_last_pong(&self) -> Option<u64> {
        let last = self.last_pong_millis.load(Ordering::Acquire);
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        if last == 0 {
            None
        } else {
            Some(elapsed.saturating_sub(last))
        }
    }

    /// True once the channel has gone silent for longer than the configured liveness
    /// window (spec §4.4's dead-channel detection).
    pub fn is_dead(&self, window: Duration) -> bool {
        silence_exceeds(&self.last_pong_millis, self.started_at, window)
    }

    /// Stops the loop and joins its thread. A no-op join if called from inside
    /// `on_dead` itself (the loop thread stopping itself right after it fires that
    /// callback) — a thread cannot join itself.
    pub fn stop(&self) {
        let _ = self.stop.try_send(());
        let joining_from_own_thread = std::thread::current().id() == self.thread_id;
        if !joining_from_own_thread {
            if let Some(handle) = self.handle.lock().expect("heartbeat handle mutex poisoned").take() {
                let _ = handle.join();
            }
        }
        self.channel.remove_listener(self.listener_id);
    }
}

impl Drop for HeartbeatEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_pong_recognizes_the_pong_envelope() {
        let message = CastMessage::new(
            NAMESPACE,
            "receiver-0",
            "sender-0",
            CastMessagePayload::String(r#"{"type":"PONG"}"#.to_owned()),
        );
        assert!(HeartbeatEngine::is_pong(&message));
    }

    #[test]
    fn is_pong_rejects_other_envelopes() {
        let message = CastMessage::new(
            NAMESPACE,
            "receiver-0",
            "sender-0",
            CastMessagePayload::String(r#"{"type":"PING"}"#.to_owned()),
        );
        assert!(!HeartbeatEngine::is_pong(&message));
    }

    #[test]
    fn pong_builder_serializes_to_an_empty_object() {
        let json = Envelope::build_request("PONG", None, &Pong {}).unwrap();
        let envelope = Envelope::parse(&json).unwrap();
        assert!(envelope.has_type("PONG"));
    }

    #[test]
    fn engine_autonomously_fires_on_dead_once_the_channel_goes_silent() {
        let channel = crate::transport::test_loopback_channel();
        let declared_dead = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&declared_dead);

        let engine = HeartbeatEngine::start(
            channel,
            "sender-0".to_owned(),
            "receiver-0".to_owned(),
            Duration::from_millis(10),
            Duration::from_millis(30),
            move || flag.store(true, Ordering::Release),
        );

        std::thread::sleep(Duration::from_millis(200));
        assert!(
            declared_dead.load(Ordering::Acquire),
            "the heartbeat loop should notice its own silence and call on_dead without \
             any caller ever polling is_dead"
        );
        engine.stop();
    }
}
