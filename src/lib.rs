#![deny(warnings)]
//! Client library for the Google Cast V2 device-control protocol used by
//! Chromecast and Google Home devices.
//!
//! A [`CastDeviceController`] owns one TCP(+TLS) connection: it drives the
//! CONNECT/AUTH/CONNECT(transport)/PING handshake, keeps a heartbeat alive in the
//! background, and dispatches unsolicited device pushes to whatever
//! [`ConnectionListener`]s are registered. Device discovery (mDNS/Zeroconf) is out
//! of scope for this crate; [`DiscoveredDevice`] is the contract a discovery
//! mechanism is expected to hand back.
//!
//! ```no_run
//! use cast_client::{CastClientConfig, CastDeviceController};
//!
//! let controller = CastDeviceController::v2(
//!     "chromecast-abc123",
//!     "192.168.1.2",
//!     8009,
//!     CastClientConfig::default(),
//!     None,
//! );
//! controller.connect(None)?;
//! let status = controller.get_device_status(None)?;
//! log::debug!("{status:?}");
//! # Ok::<(), cast_client::errors::Error>(())
//! ```

mod app_host;
mod config;
mod connection;
mod device_auth;
mod discovery;
mod heartbeat;
mod media;
mod proxies;
mod receiver;
mod requestor;
mod transport;
mod wire;

pub mod controller;
pub mod errors;

pub use app_host::{ApplicationData, ApplicationHost, ApplicationWire, AppController};
pub use config::{CastClientConfig, CertFingerprint};
pub use controller::{
    CastDeviceController, ConnectionListener, ConnectionState, DEFAULT_RECEIVER_ID,
    DEFAULT_SENDER_ID_PREFIX,
};
pub use discovery::DiscoveredDevice;
pub use errors::{Error, Result};
pub use media::MediaController;
pub use receiver::ReceiverChannel;

/// Request/response DTOs exchanged on the `receiver` and `media` namespaces.
pub mod model {
    pub use crate::proxies::media::{CustomData, Image, Media, Metadata, Status as MediaStatus};
    pub use crate::proxies::receiver::{
        AppNamespace, Application, Status as ReceiverStatus, Volume,
    };
}
