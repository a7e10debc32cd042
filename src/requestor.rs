//! Request/response correlation over the push-based transport (spec §4.5).
//!
//! Two flavors, matching the two ways a Cast reply can be tied back to its request:
//! [`StringRequestor`] correlates on the JSON envelope's `requestId` (connection,
//! heartbeat, receiver, media, application namespaces); [`BinaryRequestor`] correlates
//! only on namespace, because the device-auth exchange has no request id field at all
//! (spec §4.6). Both are single-use: one call, one registration, one deregistration,
//! whether it resolves by reply or by timing out — never fewer, never retried
//! automatically by the crate.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::errors::{Error, Result};
use crate::transport::SocketChannel;
use crate::wire::{CastMessage, CastMessagePayload, Envelope};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct Slot {
    reply: Mutex<Option<CastMessage>>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Arc<Slot> {
        Arc::new(Slot {
            reply: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    fn fulfil(&self, message: CastMessage) {
        let mut reply = self.reply.lock().expect("requestor slot mutex poisoned");
        *reply = Some(message);
        self.ready.notify_one();
    }

    fn wait(&self, timeout: Duration) -> Option<CastMessage> {
        let reply = self.reply.lock().expect("requestor slot mutex poisoned");
        let (mut reply, result) = self
            .ready
            .wait_timeout_while(reply, timeout, |r| r.is_none())
            .expect("requestor slot mutex poisoned");
        if result.timed_out() {
            return None;
        }
        reply.take()
    }
}

/// Correlates JSON-envelope requests and replies by `requestId` on a single
/// namespace. One instance per namespace (connection, heartbeat, receiver, media, or
/// an application's transport-scoped namespace).
pub struct StringRequestor {
    channel: SocketChannel,
    namespace: String,
    sender_id: String,
    destination_id: String,
    request_ids: crate::wire::RequestIdGenerator,
    pending: Arc<Mutex<std::collections::HashMap<u32, Arc<Slot>>>>,
    listener: crate::transport::ListenerId,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl StringRequestor {
    pub fn new(
        channel: SocketChannel,
        namespace: impl Into<String>,
        sender_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> StringRequestor {
        let namespace = namespace.into();
        let pending: Arc<Mutex<std::collections::HashMap<u32, Arc<Slot>>>> =
            Arc::new(Mutex::new(std::collections::HashMap::new()));

        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = channel.add_listener(&namespace, tx);

        let handle = {
            let pending = Arc::clone(&pending);
            std::thread::Builder::new()
                .name("cast-client-requestor".to_owned())
                .spawn(move || {
                    while let Ok(message) = rx.recv() {
                        let request_id = match &message.payload {
                            CastMessagePayload::String(s) => {
                                Envelope::parse(s).ok().and_then(|e| e.request_id)
                            }
                            CastMessagePayload::Binary(_) => None,
                        };

                        let Some(request_id) = request_id else { continue };
                        let slot = pending.lock().expect("pending map poisoned").remove(&request_id);
                        if let Some(slot) = slot {
                            slot.fulfil(message);
                        }
                    }
                })
                .expect("failed to spawn cast-client requestor thread")
        };

        StringRequestor {
            channel,
            namespace,
            sender_id: sender_id.into(),
            destination_id: destination_id.into(),
            request_ids: crate::wire::RequestIdGenerator::new(),
            pending,
            listener,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Sends `body` as `message_type` and blocks for a reply sharing its request id,
    /// up to `timeout`. On timeout the pending registration is removed so a
    /// late-arriving reply is silently dropped rather than mis-delivered to a future
    /// call that reuses the same request id (spec §4.5).
    pub fn request<T: Serialize>(
        &self,
        message_type: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<CastMessage> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let request_id = self.request_ids.next();
        let slot = Slot::new();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(request_id, Arc::clone(&slot));

        let payload = Envelope::build_request(message_type, Some(request_id), body)?;
        let message = CastMessage::new(
            self.namespace.clone(),
            self.sender_id.clone(),
            self.destination_id.clone(),
            CastMessagePayload::String(payload),
        );

        if let Err(e) = self.channel.send(&message) {
            self.pending.lock().expect("pending map poisoned").remove(&request_id);
            return Err(e);
        }

        match slot.wait(timeout) {
            Some(reply) => Ok(reply),
            None => {
                self.pending.lock().expect("pending map poisoned").remove(&request_id);
                Err(Error::Timeout(timeout))
            }
        }
    }

    /// Sends `body` without registering for (or waiting on) a reply — used for
    /// fire-and-forget messages like `CONNECT`/`CLOSE` and PONG acknowledgements.
    pub fn send<T: Serialize>(&self, message_type: &str, body: &T) -> Result<()> {
        let payload = Envelope::build_request(message_type, None, body)?;
        let message = CastMessage::new(
            self.namespace.clone(),
            self.sender_id.clone(),
            self.destination_id.clone(),
            CastMessagePayload::String(payload),
        );
        self.channel.send(&message)
    }
}

impl Drop for StringRequestor {
    /// Deregisters this requestor's listener and joins its background thread. Once
    /// the registry's sender is dropped, the thread's `rx.recv()` returns `Err` and
    /// the loop exits on its own (spec §4.5/§8: "deregisters itself before
    /// returning — no leak").
    fn drop(&mut self) {
        self.channel.remove_listener(self.listener);
        if let Some(handle) = self.handle.lock().expect("requestor handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// Correlates a binary-payload exchange purely by namespace: used only for the
/// device-auth handshake (spec §4.6), which has exactly one outstanding request at a
/// time and no request-id field to key on.
pub struct BinaryRequestor {
    channel: SocketChannel,
    namespace: String,
    sender_id: String,
    destination_id: String,
    slot: Arc<Slot>,
    listener: crate::transport::ListenerId,
    handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl BinaryRequestor {
    pub fn new(
        channel: SocketChannel,
        namespace: impl Into<String>,
        sender_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) -> BinaryRequestor {
        let namespace = namespace.into();
        let slot = Slot::new();

        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = channel.add_listener(&namespace, tx);

        let handle = {
            let slot = Arc::clone(&slot);
            std::thread::Builder::new()
                .name("cast-client-auth-requestor".to_owned())
                .spawn(move || {
                    if let Ok(message) = rx.recv() {
                        slot.fulfil(message);
                    }
                })
                .expect("failed to spawn cast-client auth requestor thread")
        };

        BinaryRequestor {
            channel,
            namespace,
            sender_id: sender_id.into(),
            destination_id: destination_id.into(),
            slot,
            listener,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Sends a single binary-payload request and blocks for the single reply on this
    /// namespace. Single-use: construct a fresh [`BinaryRequestor`] per auth attempt.
    pub fn request(&self, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>> {
        let message = CastMessage::new(
            self.namespace.clone(),
            self.sender_id.clone(),
            self.destination_id.clone(),
            CastMessagePayload::Binary(payload),
        );
        self.channel.send(&message)?;

        match self.slot.wait(timeout) {
            Some(reply) => match reply.payload {
                CastMessagePayload::Binary(b) => Ok(b),
                CastMessagePayload::String(_) => {
                    Err(Error::Namespace(self.namespace.clone()))
                }
            },
            None => Err(Error::Timeout(timeout)),
        }
    }
}

impl Drop for BinaryRequestor {
    fn drop(&mut self) {
        self.channel.remove_listener(self.listener);
        if let Some(handle) = self.handle.lock().expect("requestor handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_a_string_requestor_joins_its_background_thread_without_hanging() {
        let channel = crate::transport::test_loopback_channel();
        let requestor = StringRequestor::new(channel, "ns-a", "sender-0", "receiver-0");

        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        std::thread::spawn(move || {
            drop(requestor);
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("dropping the requestor should deregister its listener and join its thread, not leak it");
    }

    #[test]
    fn dropping_a_binary_requestor_joins_its_background_thread_without_hanging() {
        let channel = crate::transport::test_loopback_channel();
        let requestor = BinaryRequestor::new(channel, "ns-auth", "sender-0", "receiver-0");

        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        std::thread::spawn(move || {
            drop(requestor);
            let _ = done_tx.send(());
        });

        done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("dropping the requestor should deregister its listener and join its thread, not leak it");
    }

    #[test]
    fn times_out_when_nothing_replies() {
        let slot = Slot::new();
        let reply = slot.wait(Duration::from_millis(20));
        assert!(reply.is_none());
    }

    #[test]
    fn fulfilling_a_slot_wakes_the_waiter() {
        let slot = Slot::new();
        let message = CastMessage::new(
            "ns",
            "sender-0",
            "receiver-0",
            CastMessagePayload::String(r#"{"type":"PONG","requestId":1}"#.to_owned()),
        );

        let waiter_slot = Arc::clone(&slot);
        let handle = std::thread::spawn(move || waiter_slot.wait(Duration::from_secs(5)));

        std::thread::sleep(Duration::from_millis(10));
        slot.fulfil(message.clone());

        let received = handle.join().unwrap().unwrap();
        assert_eq!(received.namespace, message.namespace);
    }
}
