//! Application host: launches a receiver app, opens its virtual sub-channel, and
//! routes its namespace traffic to a caller-supplied controller (spec §4.8).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::connection::ConnectionChannel;
use crate::errors::{Error, Result};
use crate::proxies::receiver::Application;
use crate::receiver::ReceiverChannel;
use crate::requestor::StringRequestor;
use crate::transport::{ListenerId, SocketChannel};
use crate::wire::CastMessage;

/// The device-reported identity of a launched application, handed to the caller's
/// `factory` alongside its [`ApplicationWire`].
#[derive(Clone, Debug)]
pub struct ApplicationData {
    pub app_id: String,
    pub session_id: String,
    pub transport_id: String,
    pub namespaces: Vec<String>,
    pub display_name: String,
    pub status_text: String,
    pub is_idle_screen: bool,
    pub launched_from_cloud: bool,
}

impl From<Application> for ApplicationData {
    fn from(app: Application) -> Self {
        ApplicationData {
            app_id: app.app_id,
            session_id: app.session_id,
            transport_id: app.transport_id,
            namespaces: app.namespaces.into_iter().map(|n| n.name).collect(),
            display_name: app.display_name,
            status_text: app.status_text,
            is_idle_screen: app.is_idle_screen,
            launched_from_cloud: app.launched_from_cloud,
        }
    }
}

/// A caller-supplied controller for a launched application. Built by the `factory`
/// passed to [`ApplicationHost::launch_app`]; receives unsolicited (non-reply)
/// messages on any of the namespaces it was registered for.
pub trait AppController: Send + Sync {
    fn message_received(&self, message: CastMessage);
}

/// The handle an [`AppController`] uses to talk back to its application over the
/// shared socket channel, addressed to the app's `transportId` (spec §4.8 step 3).
///
/// Every call checks the shared `stopped` flag first: once [`ApplicationHost::stop_app`]
/// tears this application down, further use fails with [`Error::IllegalState`] rather
/// than silently sending to a channel nothing is listening on anymore (spec §4.8).
///
/// Cheap to clone: every field is either an `Arc`/`SocketChannel` handle or a small
/// string, so a controller can own one outright instead of borrowing it, which would
/// otherwise outlive the local variable `launch_app` builds it from.
#[derive(Clone)]
pub struct ApplicationWire {
    channel: SocketChannel,
    sender_id: String,
    transport_id: String,
    stopped: Arc<std::sync::atomic::AtomicBool>,
}

impl ApplicationWire {
    fn check_not_stopped(&self) -> Result<()> {
        if self.stopped.load(std::sync::atomic::Ordering::Acquire) {
            return Err(Error::IllegalState(
                "application controller has been stopped".to_owned(),
            ));
        }
        Ok(())
    }

    /// Fire-and-forget send on `namespace`.
    pub fn send<T: Serialize>(&self, namespace: &str, message_type: &str, body: &T) -> Result<()> {
        self.check_not_stopped()?;
        StringRequestor::new(self.channel.clone(), namespace, &self.sender_id, &self.transport_id)
            .send(message_type, body)
    }

    /// Request/response on `namespace`, correlated by `requestId`.
    pub fn request<T: Serialize>(
        &self,
        namespace: &str,
        message_type: &str,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<CastMessage> {
        self.check_not_stopped()?;
        StringRequestor::new(self.channel.clone(), namespace, &self.sender_id, &self.transport_id)
            .request(message_type, body, timeout)
    }
}

struct ActiveApp {
    data: ApplicationData,
    listener_ids: Vec<ListenerId>,
    stopped: Arc<std::sync::atomic::AtomicBool>,
}

/// Owns the "at most one launched application per channel" invariant (spec §4.8) and
/// the CONNECT/namespace bookkeeping a launch and stop each require.
pub struct ApplicationHost {
    channel: SocketChannel,
    sender_id: String,
    active: Mutex<Option<ActiveApp>>,
}

impl ApplicationHost {
    pub fn new(channel: SocketChannel, sender_id: impl Into<String>) -> ApplicationHost {
        ApplicationHost {
            channel,
            sender_id: sender_id.into(),
            active: Mutex::new(None),
        }
    }

    pub fn launch_app<C, F>(
        &self,
        receiver: &ReceiverChannel,
        app_id: &str,
        factory: F,
        timeout: Option<Duration>,
    ) -> Result<Arc<C>>
    where
        C: AppController + 'static,
        F: FnOnce(&ApplicationData, ApplicationWire) -> C,
    {
        {
            let active = self.active.lock().expect("app host mutex poisoned");
            if active.is_some() {
                return Err(Error::IllegalState(
                    "an application is already active on this channel".to_owned(),
                ));
            }
        }

        let status = receiver.launch(app_id, timeout)?;
        let application = status
            .applications
            .iter()
            .find(|app| app.app_id == app_id)
            .cloned_into_data()
            .ok_or_else(|| {
                Error::LaunchFailed {
                    app_id: app_id.to_owned(),
                    reason: "device status did not list the launched application".to_owned(),
                }
            })?;

        let app_connection = ConnectionChannel::new(
            self.channel.clone(),
            &self.sender_id,
            &application.transport_id,
        );
        app_connection.connect()?;

        let stopped = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let wire = ApplicationWire {
            channel: self.channel.clone(),
            sender_id: self.sender_id.clone(),
            transport_id: application.transport_id.clone(),
            stopped: Arc::clone(&stopped),
        };

        let controller = Arc::new(factory(&application, wire));

        let mut listener_ids = Vec::new();
        for namespace in &application.namespaces {
            let (tx, rx) = crossbeam_channel::unbounded();
            listener_ids.push(self.channel.add_listener(namespace, tx));

            let controller = Arc::clone(&controller);
            std::thread::Builder::new()
                .name("cast-client-app-listener".to_owned())
                .spawn(move || {
                    while let Ok(message) = rx.recv() {
                        controller.message_received(message);
                    }
                })
                .expect("failed to spawn cast-client app listener thread");
        }

        *self.active.lock().expect("app host mutex poisoned") = Some(ActiveApp {
            data: application,
            listener_ids,
            stopped,
        });

        Ok(controller)
    }

    pub fn stop_app(&self, receiver: &ReceiverChannel, timeout: Option<Duration>) -> Result<()> {
        let active = self.active.lock().expect("app host mutex poisoned").take();
        let Some(active) = active else {
            return Err(Error::IllegalState("no application is active".to_owned()));
        };

        let result = receiver.stop(&active.data.session_id, timeout);

        for id in active.listener_ids {
            self.channel.remove_listener(id);
        }
        active.stopped.store(true, std::sync::atomic::Ordering::Release);

        result.map(|_| ())
    }

    pub fn active_application(&self) -> Option<ApplicationData> {
        self.active
            .lock()
            .expect("app host mutex poisoned")
            .as_ref()
            .map(|a| a.data.clone())
    }
}

trait IntoApplicationData {
    fn cloned_into_data(self) -> Option<ApplicationData>;
}

impl IntoApplicationData for Option<&Application> {
    fn cloned_into_data(self) -> Option<ApplicationData> {
        self.map(|app| ApplicationData::from(app.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingController {
        received: Mutex<Vec<String>>,
    }

    impl AppController for RecordingController {
        fn message_received(&self, message: CastMessage) {
            self.received.lock().unwrap().push(message.namespace);
        }
    }

    #[test]
    fn application_data_maps_namespaces_by_name() {
        let app = Application {
            app_id: "CC1AD845".to_owned(),
            session_id: "session-1".to_owned(),
            transport_id: "transport-1".to_owned(),
            namespaces: vec![crate::proxies::receiver::AppNamespace {
                name: "urn:x-cast:com.google.cast.media".to_owned(),
            }],
            display_name: "Default Media Receiver".to_owned(),
            status_text: "Ready".to_owned(),
            is_idle_screen: false,
            launched_from_cloud: false,
        };

        let data = ApplicationData::from(app);
        assert_eq!(data.namespaces, vec!["urn:x-cast:com.google.cast.media"]);
    }

    #[test]
    fn recording_controller_records_namespace() {
        let controller = RecordingController {
            received: Mutex::new(Vec::new()),
        };
        controller.message_received(CastMessage::new(
            "urn:x-cast:com.google.cast.media",
            "receiver-0",
            "sender-0",
            crate::wire::CastMessagePayload::String("{}".to_owned()),
        ));
        assert_eq!(controller.received.lock().unwrap().len(), 1);
    }
}
