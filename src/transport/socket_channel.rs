//! The reader thread and single shared stream a connected device's whole channel set
//! is built on top of (spec §4.1, §5).
//!
//! One dedicated thread blocks on frame reads (via a short poll timeout, so it can
//! periodically release the stream lock to writers) and dispatches each decoded
//! [`CastMessage`] through a [`ListenerRegistry`]. Everything else — the Requestor,
//! the heartbeat engine, the receiver/application controllers — is a listener plus a
//! `send()` caller on top of this.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::errors::{Error, Result};
use crate::transport::listener::{ListenerId, ListenerRegistry};
use crate::transport::stream::{is_read_timeout, CastStream};
use crate::wire::CastMessage;

/// Owns the shared stream and reader thread for one TCP connection to a device.
/// Cloning is cheap (`Arc` internally) — clones share the same socket and registry.
#[derive(Clone)]
pub struct SocketChannel {
    stream: Arc<Mutex<CastStream>>,
    listeners: Arc<ListenerRegistry>,
    running: Arc<AtomicBool>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SocketChannel {
    /// Wraps an already-connected stream and starts the reader thread. The reader
    /// stops, and further `send()` calls fail with [`Error::IllegalState`], once
    /// `close()` is called or a non-timeout I/O error is observed.
    pub fn spawn(stream: CastStream) -> SocketChannel {
        let channel = SocketChannel {
            stream: Arc::new(Mutex::new(stream)),
            listeners: Arc::new(ListenerRegistry::new()),
            running: Arc::new(AtomicBool::new(true)),
            reader: Arc::new(Mutex::new(None)),
        };

        let handle = {
            let channel = channel.clone();
            std::thread::Builder::new()
                .name("cast-client-reader".to_owned())
                .spawn(move || channel.read_loop())
                .expect("failed to spawn cast-client reader thread")
        };
        *channel.reader.lock().expect("reader handle mutex poisoned") = Some(handle);

        channel
    }

    fn read_loop(&self) {
        while self.running.load(Ordering::Acquire) {
            let result = {
                let mut stream = self.stream.lock().expect("stream mutex poisoned");
                CastMessage::read_from(&mut *stream)
            };

            match result {
                Ok(message) => self.listeners.dispatch(&message),
                Err(e) if is_read_timeout(&e) => continue,
                Err(e) => {
                    log::warn!("cast-client reader thread stopping: {e}");
                    self.running.store(false, Ordering::Release);
                    self.listeners.notify_socket_error();
                    break;
                }
            }
        }
    }

    /// Sends one frame. Safe to call concurrently with the reader thread and with
    /// other senders: each call acquires the stream mutex only for the duration of
    /// the write.
    pub fn send(&self, message: &CastMessage) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(Error::IllegalState("channel is closed".to_owned()));
        }

        let mut stream = self.stream.lock().expect("stream mutex poisoned");
        message.write_to(&mut *stream)?;
        Ok(())
    }

    pub fn add_listener(&self, namespace: &str, sender: Sender<CastMessage>) -> ListenerId {
        self.listeners.add(namespace, sender)
    }

    pub fn add_wildcard_listener(&self, sender: Sender<CastMessage>) -> ListenerId {
        self.listeners.add_wildcard(sender)
    }

    /// Subscribes to the one notification the reader thread raises exactly once,
    /// immediately before it stops because of a framing or socket error (spec §4.3).
    pub fn add_socket_error_listener(&self, sender: crossbeam_channel::Sender<()>) -> ListenerId {
        self.listeners.add_socket_error_listener(sender)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops the reader thread and joins it. Idempotent.
    pub fn close(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.reader.lock().expect("reader handle mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        // Only the last clone actually owns a joinable thread handle (the Option is
        // already `None` in every other clone after the first `close()`/drop), so this
        // is safe to call unconditionally.
        if Arc::strong_count(&self.stream) == 1 {
            self.close();
        }
    }
}

/// A real loopback `SocketChannel` for tests that need an actual reader thread, not
/// just a `ListenerRegistry` in isolation (e.g. [`crate::requestor`] and
/// [`crate::heartbeat`]'s background-thread tests). The peer accepts the connection
/// and then goes silent, so nothing is ever read back unless the test itself writes.
#[cfg(test)]
pub(crate) fn test_loopback_channel() -> SocketChannel {
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("loopback listener local addr");
    std::thread::spawn(move || {
        let _ = listener.accept();
        std::thread::sleep(Duration::from_secs(5));
    });

    let tcp = TcpStream::connect(addr).expect("connect to loopback listener");
    tcp.set_read_timeout(Some(Duration::from_millis(20)))
        .expect("set loopback read timeout");
    SocketChannel::spawn(crate::transport::stream::CastStream::Plain(tcp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::CastMessagePayload;
    use std::io::{Cursor, Read, Write};
    use std::time::Duration;

    /// An in-memory duplex stream: writes from the code under test land in
    /// `outbound`, and bytes placed in `inbound` are what subsequent reads see.
    /// Generalizes the teacher's `channels::mod::tests::MockTcpStream` (byteorder
    /// framed, `set_message`) into something shared across every transport test.
    struct MockDuplexStream {
        inbound: Cursor<Vec<u8>>,
        outbound: Vec<u8>,
    }

    impl MockDuplexStream {
        fn with_inbound_message(message: &CastMessage) -> MockDuplexStream {
            let mut buffer = Vec::new();
            message.write_to(&mut buffer).unwrap();
            MockDuplexStream {
                inbound: Cursor::new(buffer),
                outbound: Vec::new(),
            }
        }
    }

    impl Read for MockDuplexStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.inbound.read(buf)?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
            }
            Ok(n)
        }
    }

    impl Write for MockDuplexStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outbound.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn dispatches_a_frame_read_from_the_stream_to_its_namespace_listener() {
        let seed = CastMessage::new(
            "urn:x-cast:com.google.cast.tp.heartbeat",
            "receiver-0",
            "sender-0",
            CastMessagePayload::String(r#"{"type":"PONG"}"#.to_owned()),
        );

        let registry = ListenerRegistry::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        registry.add("urn:x-cast:com.google.cast.tp.heartbeat", tx);
        registry.dispatch(&seed);

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.namespace, seed.namespace);
    }

    #[test]
    fn socket_error_notifies_registered_listeners() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Closing immediately gives the client side an EOF on its next read, a
            // genuine framing/socket error rather than a poll timeout.
            drop(stream);
        });

        let tcp = std::net::TcpStream::connect(addr).unwrap();
        tcp.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let channel = SocketChannel::spawn(crate::transport::stream::CastStream::Plain(tcp));

        let (tx, rx) = crossbeam_channel::unbounded();
        channel.add_socket_error_listener(tx);

        rx.recv_timeout(Duration::from_secs(2))
            .expect("a socket error should notify registered listeners exactly once");
    }

    #[test]
    fn mock_duplex_stream_round_trips_a_write_then_a_read() {
        let seed = CastMessage::new(
            "urn:x-cast:com.google.cast.tp.connection",
            "sender-0",
            "receiver-0",
            CastMessagePayload::String(r#"{"type":"CLOSE"}"#.to_owned()),
        );

        let mut mock = MockDuplexStream::with_inbound_message(&seed);
        let decoded = CastMessage::read_from(&mut mock).unwrap();
        assert_eq!(decoded.namespace, seed.namespace);

        let reply = CastMessage::new(
            "urn:x-cast:com.google.cast.tp.connection",
            "sender-0",
            "receiver-0",
            CastMessagePayload::String(r#"{"type":"CONNECT"}"#.to_owned()),
        );
        reply.write_to(&mut mock).unwrap();
        assert!(!mock.outbound.is_empty());
    }
}
