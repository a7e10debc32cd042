//! The listener registry: namespace-keyed fan-out of incoming [`CastMessage`]s to
//! subscribers, plus a wildcard set for subscribers that want everything (spec §4.3).
//!
//! Grounded in the teacher's `can_handle`/`parse` per-channel pattern
//! (`channels::connection::ConnectionChannel` et al.), generalized from "each channel
//! struct checks every incoming message in a loop" to "each channel registers once and
//! is pushed to" — the push-based model spec §4.3 requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::Sender;

use crate::wire::CastMessage;

/// Identifies a registered listener so it can be removed later. Opaque and
/// monotonically increasing; never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

#[derive(Default)]
struct Registry {
    by_namespace: HashMap<String, Vec<(ListenerId, Sender<CastMessage>)>>,
    wildcard: Vec<(ListenerId, Sender<CastMessage>)>,
    socket_error: Vec<(ListenerId, Sender<()>)>,
}

/// Registers and dispatches to namespace-scoped or wildcard listeners. Safe to share
/// across the reader thread (which calls [`ListenerRegistry::dispatch`]) and any number
/// of caller threads (which call `add`/`remove`).
pub struct ListenerRegistry {
    next_id: AtomicU64,
    registry: Mutex<Registry>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        ListenerRegistry {
            next_id: AtomicU64::new(1),
            registry: Mutex::new(Registry::default()),
        }
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to messages on a single namespace.
    pub fn add(&self, namespace: &str, sender: Sender<CastMessage>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.lock().expect("listener registry poisoned");
        registry
            .by_namespace
            .entry(namespace.to_owned())
            .or_default()
            .push((id, sender));
        id
    }

    /// Subscribes to every message regardless of namespace (used by the raw/catch-all
    /// listener spec §4.3 describes for unrecognized namespaces).
    pub fn add_wildcard(&self, sender: Sender<CastMessage>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.lock().expect("listener registry poisoned");
        registry.wildcard.push((id, sender));
        id
    }

    /// Subscribes to the channel-dead notification the reader thread raises exactly
    /// once when it observes a framing or socket error (spec §4.3).
    pub fn add_socket_error_listener(&self, sender: Sender<()>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry.lock().expect("listener registry poisoned");
        registry.socket_error.push((id, sender));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        let mut registry = self.registry.lock().expect("listener registry poisoned");
        for listeners in registry.by_namespace.values_mut() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
        registry.wildcard.retain(|(listener_id, _)| *listener_id != id);
        registry.socket_error.retain(|(listener_id, _)| *listener_id != id);
    }

    /// Notifies every registered socket-error listener. Called by the reader thread
    /// once, right before it stops (spec §4.3).
    pub fn notify_socket_error(&self) {
        let registry = self.registry.lock().expect("listener registry poisoned");
        for (_, sender) in &registry.socket_error {
            let _ = sender.send(());
        }
    }

    /// Delivers `message` to every listener on its namespace, then to every wildcard
    /// listener. A message whose namespace has no registered listener and with no
    /// wildcard listeners registered is simply dropped (spec §4.3: unclaimed messages
    /// are not an error).
    pub fn dispatch(&self, message: &CastMessage) {
        let registry = self.registry.lock().expect("listener registry poisoned");

        let mut delivered = false;
        if let Some(listeners) = registry.by_namespace.get(&message.namespace) {
            for (_, sender) in listeners {
                if sender.send(message.clone()).is_ok() {
                    delivered = true;
                }
            }
        }

        for (_, sender) in &registry.wildcard {
            let _ = sender.send(message.clone());
            delivered = true;
        }

        if !delivered {
            log::trace!("no listener for namespace {}, dropping message", message.namespace);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CastMessagePayload;

    fn message(namespace: &str) -> CastMessage {
        CastMessage::new(
            namespace,
            "sender-0",
            "receiver-0",
            CastMessagePayload::String("{}".to_owned()),
        )
    }

    #[test]
    fn dispatches_only_to_matching_namespace() {
        let registry = ListenerRegistry::new();
        let (tx_a, rx_a) = crossbeam_channel::unbounded();
        let (tx_b, rx_b) = crossbeam_channel::unbounded();
        registry.add("ns-a", tx_a);
        registry.add("ns-b", tx_b);

        registry.dispatch(&message("ns-a"));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn wildcard_listener_sees_every_message() {
        let registry = ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        registry.add_wildcard(tx);

        registry.dispatch(&message("ns-a"));
        registry.dispatch(&message("ns-b"));

        assert_eq!(rx.try_recv().unwrap().namespace, "ns-a");
        assert_eq!(rx.try_recv().unwrap().namespace, "ns-b");
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let registry = ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = registry.add("ns-a", tx);
        registry.remove(id);

        registry.dispatch(&message("ns-a"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn socket_error_listeners_are_notified_on_demand() {
        let registry = ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        registry.add_socket_error_listener(tx);

        registry.notify_socket_error();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn removed_socket_error_listener_stops_receiving() {
        let registry = ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let id = registry.add_socket_error_listener(tx);
        registry.remove(id);

        registry.notify_socket_error();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn same_namespace_delivers_to_every_listener() {
        let registry = ListenerRegistry::new();
        let (tx1, rx1) = crossbeam_channel::unbounded();
        let (tx2, rx2) = crossbeam_channel::unbounded();
        registry.add("ns-a", tx1);
        registry.add("ns-a", tx2);

        registry.dispatch(&message("ns-a"));

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
