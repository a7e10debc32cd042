//! JSON DTOs carried by the envelope on each namespace. Grounded directly on the
//! teacher's `cast::proxies` module: same field names, same `#[serde(rename)]`s,
//! same nested shape — the request types here drop the `requestId`/`type` fields
//! (those are now stamped by [`crate::wire::Envelope::build_request`] instead of by
//! each struct carrying its own copies).

/// DTOs for the `tp.connection` namespace.
pub mod connection {
    use serde_derive::Serialize;

    #[derive(Serialize, Debug)]
    pub struct ConnectRequest {
        #[serde(rename = "userAgent")]
        pub user_agent: String,
    }

    impl Default for ConnectRequest {
        fn default() -> Self {
            ConnectRequest {
                user_agent: concat!("cast_client/", env!("CARGO_PKG_VERSION")).to_owned(),
            }
        }
    }
}

/// DTOs for the `receiver` namespace.
pub mod receiver {
    use std::borrow::Cow;

    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    pub struct LaunchRequest<'a> {
        #[serde(rename = "appId")]
        pub app_id: Cow<'a, str>,
    }

    #[derive(Serialize, Debug)]
    pub struct StopRequest<'a> {
        #[serde(rename = "sessionId")]
        pub session_id: Cow<'a, str>,
    }

    #[derive(Serialize, Debug)]
    pub struct GetStatusRequest {}

    #[derive(Serialize, Debug)]
    pub struct GetAppAvailabilityRequest<'a> {
        #[serde(rename = "appId")]
        pub app_id: Vec<Cow<'a, str>>,
    }

    #[derive(Serialize, Debug)]
    pub struct SetVolumeRequest {
        pub volume: Volume,
    }

    #[derive(Deserialize, Debug)]
    pub struct StatusReply {
        pub status: Status,
    }

    #[derive(Deserialize, Debug)]
    pub struct AppAvailabilityReply {
        pub availability: std::collections::HashMap<String, String>,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Status {
        #[serde(default)]
        pub applications: Vec<Application>,

        #[serde(rename = "isActiveInput", default)]
        pub is_active_input: bool,

        #[serde(rename = "isStandBy", default)]
        pub is_stand_by: bool,

        pub volume: Volume,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Application {
        #[serde(rename = "appId")]
        pub app_id: String,

        #[serde(rename = "sessionId")]
        pub session_id: String,

        #[serde(rename = "transportId", default)]
        pub transport_id: String,

        #[serde(default)]
        pub namespaces: Vec<AppNamespace>,

        #[serde(rename = "displayName", default)]
        pub display_name: String,

        #[serde(rename = "statusText", default)]
        pub status_text: String,

        #[serde(rename = "isIdleScreen", default)]
        pub is_idle_screen: bool,

        #[serde(rename = "launchedFromCloud", default)]
        pub launched_from_cloud: bool,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct AppNamespace {
        pub name: String,
    }

    /// The device's supported volume control, distinct from the current `level`
    /// (spec §3): `MASTER` can be set freely, `ATTENUATION` only relatively, `FIXED`
    /// not at all.
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum VolumeControlType {
        Master,
        Attenuation,
        Fixed,
    }

    /// Volume level and mute state. `level` ranges 0.0–1.0 (spec §4.7 edge case:
    /// callers that pass an out-of-range level get it clamped before the request is
    /// sent, rather than forwarded to the device as-is). `controlType`/`stepInterval`
    /// are device-reported and only ever present on replies, never on an outgoing
    /// `SET_VOLUME` body (left `None` there and skipped rather than sent).
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
    pub struct Volume {
        pub level: Option<f32>,
        pub muted: Option<bool>,

        #[serde(rename = "controlType", skip_serializing_if = "Option::is_none", default)]
        pub control_type: Option<VolumeControlType>,

        #[serde(rename = "stepInterval", skip_serializing_if = "Option::is_none", default)]
        pub step_interval: Option<f64>,
    }

    #[derive(Deserialize, Debug)]
    pub struct LaunchErrorReply {
        pub reason: Option<String>,
    }

    #[derive(Deserialize, Debug)]
    pub struct InvalidRequestReply {
        pub reason: Option<String>,
    }
}

/// DTOs for the `media` namespace.
pub mod media {
    use serde_derive::{Deserialize, Serialize};

    #[derive(Serialize, Debug)]
    pub struct GetStatusRequest {
        #[serde(rename = "mediaSessionId", skip_serializing_if = "Option::is_none")]
        pub media_session_id: Option<i32>,
    }

    #[derive(Serialize, Debug)]
    pub struct LoadRequest {
        pub media: Media,

        #[serde(rename = "currentTime")]
        pub current_time: f64,

        pub autoplay: bool,

        #[serde(rename = "customData")]
        pub custom_data: CustomData,
    }

    #[derive(Serialize, Debug)]
    pub struct PlaybackGenericRequest {
        #[serde(rename = "mediaSessionId")]
        pub media_session_id: i32,

        #[serde(rename = "customData")]
        pub custom_data: CustomData,
    }

    #[derive(Serialize, Debug)]
    pub struct PlaybackSeekRequest {
        #[serde(rename = "mediaSessionId")]
        pub media_session_id: i32,

        #[serde(rename = "resumeState", skip_serializing_if = "Option::is_none")]
        pub resume_state: Option<String>,

        #[serde(rename = "currentTime", skip_serializing_if = "Option::is_none")]
        pub current_time: Option<f32>,

        #[serde(rename = "customData")]
        pub custom_data: CustomData,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    pub struct Media {
        #[serde(rename = "contentId")]
        pub content_id: String,
        #[serde(rename = "streamType", default)]
        pub stream_type: String,
        #[serde(rename = "contentType")]
        pub content_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub metadata: Option<Metadata>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub duration: Option<f32>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, Default)]
    pub struct Metadata {
        #[serde(rename = "metadataType", default)]
        pub metadata_type: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", rename = "subtitle")]
        pub subtitle: Option<String>,
        #[serde(default)]
        pub images: Vec<Image>,
    }

    #[derive(Serialize, Deserialize, Debug, Clone)]
    pub struct Image {
        pub url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub height: Option<u32>,
    }

    #[derive(Serialize, Debug, Default)]
    pub struct CustomData {}

    #[derive(Deserialize, Debug)]
    pub struct StatusReply {
        #[serde(default)]
        pub status: Vec<Status>,
    }

    #[derive(Deserialize, Debug)]
    pub struct Status {
        #[serde(rename = "mediaSessionId")]
        pub media_session_id: i32,
        #[serde(default)]
        pub media: Option<Media>,
        #[serde(rename = "playbackRate")]
        pub playback_rate: f32,
        #[serde(rename = "playerState")]
        pub player_state: String,
        #[serde(rename = "idleReason", default)]
        pub idle_reason: Option<String>,
        #[serde(rename = "currentTime", default)]
        pub current_time: Option<f32>,
        #[serde(rename = "supportedMediaCommands", default)]
        pub supported_media_commands: u32,
    }

    #[derive(Deserialize, Debug)]
    pub struct LoadFailedReply {}

    #[derive(Deserialize, Debug)]
    pub struct LoadCancelledReply {}

    #[derive(Deserialize, Debug)]
    pub struct InvalidPlayerStateReply {}

    #[derive(Deserialize, Debug)]
    pub struct InvalidRequestReply {
        pub reason: Option<String>,
    }
}

#[cfg(test)]
mod tests {
    use super::receiver::{Volume, VolumeControlType};

    #[test]
    fn volume_deserializes_partial_objects() {
        let volume: Volume = serde_json::from_str(r#"{"level":0.5}"#).unwrap();
        assert_eq!(volume.level, Some(0.5));
        assert_eq!(volume.muted, None);
        assert_eq!(volume.control_type, None);
        assert_eq!(volume.step_interval, None);
    }

    #[test]
    fn volume_deserializes_control_type_and_step_interval() {
        let volume: Volume = serde_json::from_str(
            r#"{"level":0.5,"muted":false,"controlType":"ATTENUATION","stepInterval":0.05}"#,
        )
        .unwrap();
        assert_eq!(volume.control_type, Some(VolumeControlType::Attenuation));
        assert_eq!(volume.step_interval, Some(0.05));
    }

    #[test]
    fn volume_omits_control_type_and_step_interval_when_absent() {
        let volume = Volume {
            level: Some(0.5),
            muted: None,
            control_type: None,
            step_interval: None,
        };
        let json = serde_json::to_string(&volume).unwrap();
        assert!(!json.contains("controlType"));
        assert!(!json.contains("stepInterval"));
    }
}
