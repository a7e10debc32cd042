//! The `receiver` namespace: device-level status, volume, and application
//! lifecycle operations (spec §4.7).

use std::borrow::Cow;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::proxies::receiver::{
    AppAvailabilityReply, GetAppAvailabilityRequest, GetStatusRequest, InvalidRequestReply,
    LaunchErrorReply, LaunchRequest, SetVolumeRequest, Status, StatusReply, StopRequest, Volume,
};
use crate::requestor::StringRequestor;
use crate::transport::SocketChannel;
use crate::wire::{CastMessagePayload, Envelope};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.receiver";

pub struct ReceiverChannel {
    requestor: StringRequestor,
}

impl ReceiverChannel {
    pub fn new(channel: SocketChannel, sender_id: &str, destination_id: &str) -> ReceiverChannel {
        ReceiverChannel {
            requestor: StringRequestor::new(channel, NAMESPACE, sender_id, destination_id),
        }
    }

    pub fn get_status(&self, timeout: Option<Duration>) -> Result<Status> {
        let reply = self.requestor.request("GET_STATUS", &GetStatusRequest {}, timeout)?;
        Self::decode_status_reply(reply)
    }

    /// Sets the volume level, clamped to `[0.0, 1.0]` per spec §4.7's boundary
    /// behavior, leaving `muted` untouched.
    pub fn set_volume_level(&self, level: f32, timeout: Option<Duration>) -> Result<Status> {
        let clamped = level.clamp(0.0, 1.0);
        let body = SetVolumeRequest {
            volume: Volume {
                level: Some(clamped),
                muted: None,
                control_type: None,
                step_interval: None,
            },
        };
        let reply = self.requestor.request("SET_VOLUME", &body, timeout)?;
        Self::decode_status_reply(reply)
    }

    pub fn set_muted(&self, muted: bool, timeout: Option<Duration>) -> Result<Status> {
        let body = SetVolumeRequest {
            volume: Volume {
                level: None,
                muted: Some(muted),
                control_type: None,
                step_interval: None,
            },
        };
        let reply = self.requestor.request("SET_VOLUME", &body, timeout)?;
        Self::decode_status_reply(reply)
    }

    /// Launches `app_id`. On `LAUNCH_ERROR` returns [`Error::LaunchFailed`] rather
    /// than a status, per spec §4.7/§7.
    pub fn launch(&self, app_id: &str, timeout: Option<Duration>) -> Result<Status> {
        let body = LaunchRequest {
            app_id: Cow::Borrowed(app_id),
        };
        let reply = self.requestor.request("LAUNCH", &body, timeout)?;

        let CastMessagePayload::String(payload) = &reply.payload else {
            return Err(Error::Namespace(NAMESPACE.to_owned()));
        };
        let envelope = Envelope::parse(payload)?;

        if envelope.has_type("LAUNCH_ERROR") {
            let error: LaunchErrorReply = envelope.into_typed()?;
            return Err(Error::LaunchFailed {
                app_id: app_id.to_owned(),
                reason: error.reason.unwrap_or_else(|| "unknown reason".to_owned()),
            });
        }

        Self::decode_status_reply(reply)
    }

    /// Stops the application owning `session_id`. An unknown `session_id` yields
    /// [`Error::InvalidRequest`] (spec §4.7/§8).
    pub fn stop(&self, session_id: &str, timeout: Option<Duration>) -> Result<Status> {
        let body = StopRequest {
            session_id: Cow::Borrowed(session_id),
        };
        let reply = self.requestor.request("STOP", &body, timeout)?;

        let CastMessagePayload::String(payload) = &reply.payload else {
            return Err(Error::Namespace(NAMESPACE.to_owned()));
        };
        let envelope = Envelope::parse(payload)?;

        if envelope.has_type("INVALID_REQUEST") {
            let error: InvalidRequestReply = envelope.into_typed()?;
            return Err(Error::InvalidRequest(
                error.reason.unwrap_or_else(|| "unknown reason".to_owned()),
            ));
        }

        Self::decode_status_reply(reply)
    }

    pub fn get_app_availability(
        &self,
        app_ids: &[&str],
        timeout: Option<Duration>,
    ) -> Result<std::collections::HashMap<String, bool>> {
        let body = GetAppAvailabilityRequest {
            app_id: app_ids.iter().map(|id| Cow::Borrowed(*id)).collect(),
        };
        let reply = self
            .requestor
            .request("GET_APP_AVAILABILITY", &body, timeout)?;

        let CastMessagePayload::String(payload) = &reply.payload else {
            return Err(Error::Namespace(NAMESPACE.to_owned()));
        };
        let envelope = Envelope::parse(payload)?;
        let decoded: AppAvailabilityReply = envelope.into_typed()?;

        Ok(decoded
            .availability
            .into_iter()
            .map(|(id, value)| (id, value == "APP_AVAILABLE"))
            .collect())
    }

    pub fn is_app_available(&self, app_id: &str, timeout: Option<Duration>) -> Result<bool> {
        let availability = self.get_app_availability(&[app_id], timeout)?;
        Ok(availability.get(app_id).copied().unwrap_or(false))
    }

    fn decode_status_reply(reply: crate::wire::CastMessage) -> Result<Status> {
        let CastMessagePayload::String(payload) = &reply.payload else {
            return Err(Error::Namespace(NAMESPACE.to_owned()));
        };
        let envelope = Envelope::parse(payload)?;
        let decoded: StatusReply = envelope.into_typed()?;
        Ok(decoded.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_volume_is_clamped_before_building_the_request() {
        let body = SetVolumeRequest {
            volume: Volume {
                level: Some(1.7f32.clamp(0.0, 1.0)),
                muted: None,
                control_type: None,
                step_interval: None,
            },
        };
        assert_eq!(body.volume.level, Some(1.0));

        let body = SetVolumeRequest {
            volume: Volume {
                level: Some((-0.3f32).clamp(0.0, 1.0)),
                muted: None,
                control_type: None,
                step_interval: None,
            },
        };
        assert_eq!(body.volume.level, Some(0.0));
    }

    #[test]
    fn status_reply_round_trips_through_envelope() {
        let json = r#"{
            "type": "RECEIVER_STATUS",
            "requestId": 4,
            "status": {
                "applications": [],
                "isActiveInput": true,
                "isStandBy": false,
                "volume": {"level": 0.5, "muted": false}
            }
        }"#;
        let envelope = Envelope::parse(json).unwrap();
        let decoded: StatusReply = envelope.into_typed().unwrap();
        assert_eq!(decoded.status.volume.level, Some(0.5));
        assert!(decoded.status.is_active_input);
    }
}
