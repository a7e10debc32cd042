//! The `tp.connection` namespace: joining/leaving a device (or an application's
//! virtual sub-channel) and observing a peer-initiated close (spec §4.6).

use crossbeam_channel::Receiver;

use crate::errors::Result;
use crate::proxies::connection::ConnectRequest;
use crate::requestor::StringRequestor;
use crate::transport::SocketChannel;
use crate::wire::{CastMessagePayload, Envelope};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";

/// Sends `CONNECT`/`CLOSE` on the connection namespace. No reply is expected for
/// either message (spec §4.6 step 3: "No response is expected"), so this wraps
/// [`StringRequestor::send`] rather than `request`.
pub struct ConnectionChannel {
    requestor: StringRequestor,
}

impl ConnectionChannel {
    pub fn new(channel: SocketChannel, sender_id: &str, destination_id: &str) -> ConnectionChannel {
        ConnectionChannel {
            requestor: StringRequestor::new(channel, NAMESPACE, sender_id, destination_id),
        }
    }

    pub fn connect(&self) -> Result<()> {
        self.requestor.send("CONNECT", &ConnectRequest::default())
    }

    pub fn close(&self) -> Result<()> {
        self.requestor.send("CLOSE", &serde_json::json!({}))
    }
}

/// Subscribes to the connection namespace and reports whether the most recently
/// observed message was a peer-initiated `CLOSE`, without blocking the caller.
/// [`RemoteCloseWatcher::poll_closed`] drains its queue on demand; [`Self::receiver`]
/// exposes the same queue for a `select!` loop to watch directly, so a peer-initiated
/// `CLOSE` can be noticed the moment it arrives rather than waiting for the next poll
/// (spec §4.6, §7: "remote_connection_closed() is an autonomous push-driven
/// notification").
pub struct RemoteCloseWatcher {
    messages: Receiver<crate::wire::CastMessage>,
    listener: crate::transport::ListenerId,
}

impl RemoteCloseWatcher {
    pub fn attach(channel: &SocketChannel) -> RemoteCloseWatcher {
        let (tx, rx) = crossbeam_channel::unbounded();
        let listener = channel.add_listener(NAMESPACE, tx);
        RemoteCloseWatcher {
            messages: rx,
            listener,
        }
    }

    /// Drains any pending connection-namespace messages and returns `true` if any of
    /// them was a `CLOSE`.
    pub fn poll_closed(&self) -> bool {
        let mut closed = false;
        while let Ok(message) = self.messages.try_recv() {
            if is_close(&message) {
                closed = true;
            }
        }
        closed
    }

    /// The listener id this watcher registered, for a caller that tears it down.
    pub fn listener_id(&self) -> crate::transport::ListenerId {
        self.listener
    }

    /// The raw receiver backing this watcher, for a `select!` loop that wants to
    /// react to a `CLOSE` as soon as it is dispatched instead of polling.
    pub fn receiver(&self) -> Receiver<crate::wire::CastMessage> {
        self.messages.clone()
    }
}

/// True if `message` is a `CLOSE` envelope on the connection namespace.
pub(crate) fn is_close(message: &crate::wire::CastMessage) -> bool {
    if let CastMessagePayload::String(s) = &message.payload {
        if let Ok(envelope) = Envelope::parse(s) {
            return envelope.has_type("CLOSE");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CastMessage;

    #[test]
    fn remote_close_watcher_ignores_non_close_messages() {
        let registry = crate::transport::ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        registry.add(NAMESPACE, tx);
        registry.dispatch(&CastMessage::new(
            NAMESPACE,
            "receiver-0",
            "sender-0",
            CastMessagePayload::String(r#"{"type":"CONNECT"}"#.to_owned()),
        ));

        let watcher = RemoteCloseWatcher {
            messages: rx,
            listener: crate::transport::listener::ListenerId(0),
        };
        assert!(!watcher.poll_closed());
    }
}
