//! The JSON envelope carried inside a [`crate::wire::CastMessagePayload::String`].
//!
//! Every namespace that isn't `tp.deviceauth` speaks this envelope: a `type` tag,
//! an optional `requestId` that correlates a reply to the call that produced it, and
//! an optional `responseType` some receiver replies duplicate the tag into. Grounded
//! in the teacher's `cast::proxies` DTO module, generalized from per-message structs
//! to the common envelope shape spec §4.2 describes.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Error, Result};

/// A parsed (or about-to-be-sent) JSON payload, plus enough of its shape to route
/// and correlate it without fully deserializing into a concrete response type.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub message_type: String,
    pub request_id: Option<u32>,
    raw: Value,
}

impl Envelope {
    /// Parses a JSON payload, requiring at minimum a string `type` field.
    pub fn parse(payload: &str) -> Result<Envelope> {
        let raw: Value = serde_json::from_str(payload)?;

        let message_type = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Internal("envelope missing \"type\"".to_owned()))?
            .to_owned();

        let request_id = raw.get("requestId").and_then(Value::as_u64).map(|n| n as u32);

        Ok(Envelope {
            message_type,
            request_id,
            raw,
        })
    }

    pub fn has_type(&self, message_type: &str) -> bool {
        self.message_type == message_type
    }

    /// Deserializes the full envelope body into a concrete response DTO.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.raw)?)
    }

    /// Builds a request envelope: serializes `body` (which must serialize to a JSON
    /// object), stamps in `type` and, if given, `requestId`.
    pub fn build_request<T: serde::Serialize>(
        message_type: &str,
        request_id: Option<u32>,
        body: &T,
    ) -> Result<String> {
        let mut value = serde_json::to_value(body)?;
        let object = value.as_object_mut().ok_or_else(|| {
            Error::Internal("request body must serialize to a JSON object".to_owned())
        })?;

        object.insert("type".to_owned(), Value::String(message_type.to_owned()));
        if let Some(id) = request_id {
            object.insert("requestId".to_owned(), Value::from(id));
        }

        Ok(serde_json::to_string(&value)?)
    }
}

/// Per-channel, monotonically increasing request id generator (spec §4.2: request
/// ids are unique only within the channel that issued them, not globally).
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        RequestIdGenerator {
            next: AtomicU32::new(1),
        }
    }

    /// Returns the next id, wrapping back to `1` after `2^31 - 1` (spec §3) rather
    /// than at `u32::MAX`.
    pub fn next(&self) -> u32 {
        const MAX: u32 = i32::MAX as u32;
        loop {
            let current = self.next.load(Ordering::Relaxed);
            let after = if current >= MAX { 1 } else { current + 1 };
            if self
                .next
                .compare_exchange_weak(current, after, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return current;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Ping {}

    #[test]
    fn parses_type_and_request_id() {
        let envelope = Envelope::parse(r#"{"type":"PONG","requestId":7}"#).unwrap();
        assert!(envelope.has_type("PONG"));
        assert_eq!(envelope.request_id, Some(7));
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(Envelope::parse(r#"{"requestId":7}"#).is_err());
    }

    #[test]
    fn build_request_stamps_type_and_id() {
        let json = Envelope::build_request("PING", None, &Ping {}).unwrap();
        let envelope = Envelope::parse(&json).unwrap();
        assert!(envelope.has_type("PING"));
        assert_eq!(envelope.request_id, None);

        let json = Envelope::build_request("GET_STATUS", Some(3), &Ping {}).unwrap();
        let envelope = Envelope::parse(&json).unwrap();
        assert_eq!(envelope.request_id, Some(3));
    }

    #[test]
    fn request_ids_increase_monotonically() {
        let generator = RequestIdGenerator::new();
        let a = generator.next();
        let b = generator.next();
        assert!(b > a);
    }

    #[test]
    fn request_ids_wrap_at_2_31_minus_1_back_to_1() {
        let generator = RequestIdGenerator {
            next: AtomicU32::new(i32::MAX as u32),
        };
        assert_eq!(generator.next(), i32::MAX as u32);
        assert_eq!(generator.next(), 1);
    }
}
