//! A thin controller for the default media receiver app (`CC1AD845`), covering only
//! its message contract — load, basic transport controls, and status — per spec §1's
//! explicit "application logic beyond its message contract" exclusion.
//!
//! Grounded in the teacher's `channels::media` module (namespace constant, message
//! type names, `Media`/`CustomData` shape), rebuilt on top of [`ApplicationWire`]
//! instead of a direct `MessageManager` reference.

use std::sync::Mutex;
use std::time::Duration;

use crate::app_host::{AppController, ApplicationWire};
use crate::errors::{Error, Result};
use crate::proxies::media::{
    GetStatusRequest, LoadRequest, Media, PlaybackGenericRequest, PlaybackSeekRequest, Status,
    StatusReply,
};
use crate::wire::{CastMessage, CastMessagePayload, Envelope};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.media";

const ERROR_TYPES: &[&str] = &[
    "LOAD_FAILED",
    "LOAD_CANCELLED",
    "INVALID_PLAYER_STATE",
    "INVALID_REQUEST",
];

/// The default media receiver application controller. Tracks the most recently
/// reported `mediaSessionId` so transport controls (`play`/`pause`/`stop`/`seek`)
/// don't require the caller to thread it through themselves.
pub struct MediaController {
    wire: ApplicationWire,
    media_session_id: Mutex<Option<i32>>,
}

impl MediaController {
    pub fn new(wire: ApplicationWire) -> MediaController {
        MediaController {
            wire,
            media_session_id: Mutex::new(None),
        }
    }

    pub fn load(&self, media: Media, timeout: Option<Duration>) -> Result<Status> {
        let body = LoadRequest {
            media,
            current_time: 0.0,
            autoplay: true,
            custom_data: Default::default(),
        };
        let reply = self.wire.request(NAMESPACE, "LOAD", &body, timeout)?;
        self.decode_status(reply)
    }

    pub fn get_status(&self, timeout: Option<Duration>) -> Result<Status> {
        let media_session_id = *self.media_session_id.lock().expect("media session mutex poisoned");
        let body = GetStatusRequest { media_session_id };
        let reply = self.wire.request(NAMESPACE, "GET_STATUS", &body, timeout)?;
        self.decode_status(reply)
    }

    pub fn play(&self, timeout: Option<Duration>) -> Result<Status> {
        self.playback_generic("PLAY", timeout)
    }

    pub fn pause(&self, timeout: Option<Duration>) -> Result<Status> {
        self.playback_generic("PAUSE", timeout)
    }

    pub fn stop(&self, timeout: Option<Duration>) -> Result<Status> {
        self.playback_generic("STOP", timeout)
    }

    fn playback_generic(&self, message_type: &str, timeout: Option<Duration>) -> Result<Status> {
        let media_session_id = self.require_session()?;
        let body = PlaybackGenericRequest {
            media_session_id,
            custom_data: Default::default(),
        };
        let reply = self.wire.request(NAMESPACE, message_type, &body, timeout)?;
        self.decode_status(reply)
    }

    pub fn seek(&self, current_time: f32, timeout: Option<Duration>) -> Result<Status> {
        let media_session_id = self.require_session()?;
        let body = PlaybackSeekRequest {
            media_session_id,
            resume_state: None,
            current_time: Some(current_time),
            custom_data: Default::default(),
        };
        let reply = self.wire.request(NAMESPACE, "SEEK", &body, timeout)?;
        self.decode_status(reply)
    }

    fn require_session(&self) -> Result<i32> {
        self.media_session_id
            .lock()
            .expect("media session mutex poisoned")
            .ok_or_else(|| Error::IllegalState("no media session has been loaded yet".to_owned()))
    }

    fn decode_status(&self, reply: CastMessage) -> Result<Status> {
        let CastMessagePayload::String(payload) = &reply.payload else {
            return Err(Error::Namespace(NAMESPACE.to_owned()));
        };
        let envelope = Envelope::parse(payload)?;

        if ERROR_TYPES.contains(&envelope.message_type.as_str()) {
            return Err(Error::MediaRequest(envelope.message_type));
        }

        let decoded: StatusReply = envelope.into_typed()?;
        let status = decoded
            .status
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("media status reply carried no status entries".to_owned()))?;

        *self.media_session_id.lock().expect("media session mutex poisoned") =
            Some(status.media_session_id);

        Ok(status)
    }
}

impl AppController for MediaController {
    /// Unsolicited `MEDIA_STATUS` pushes update the tracked session id so transport
    /// controls keep working even if the caller never calls `get_status` again.
    fn message_received(&self, message: CastMessage) {
        let CastMessagePayload::String(payload) = &message.payload else {
            return;
        };
        let Ok(envelope) = Envelope::parse(payload) else {
            return;
        };
        if !envelope.has_type("MEDIA_STATUS") {
            return;
        }
        if let Ok(decoded) = envelope.into_typed::<StatusReply>() {
            if let Some(status) = decoded.status.into_iter().next() {
                *self.media_session_id.lock().expect("media session mutex poisoned") =
                    Some(status.media_session_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_types_are_recognized() {
        for t in ERROR_TYPES {
            assert!(ERROR_TYPES.contains(t));
        }
        assert!(!ERROR_TYPES.contains(&"MEDIA_STATUS"));
    }
}
