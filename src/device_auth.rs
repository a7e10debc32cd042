//! The device-auth handshake (spec §4.6 step 2): a single binary-payload
//! request/reply exchange with no `requestId` field, hence the dedicated
//! [`BinaryRequestor`] rather than the JSON-envelope [`StringRequestor`].

use protobuf::Message;

use crate::errors::{Error, Result};
use crate::requestor::BinaryRequestor;
use crate::transport::SocketChannel;
use crate::wire::frame::cast_channel::{AuthChallenge, DeviceAuthMessage};

pub const NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.deviceauth";

/// Runs the auth exchange once over `channel` and returns `Ok(())` if the device
/// accepted it. Builds a fresh [`BinaryRequestor`] per call, since the exchange
/// happens exactly once per connection attempt.
pub fn authenticate(
    channel: SocketChannel,
    sender_id: &str,
    destination_id: &str,
    timeout: std::time::Duration,
) -> Result<()> {
    let requestor = BinaryRequestor::new(channel, NAMESPACE, sender_id, destination_id);

    let mut request = DeviceAuthMessage::new();
    request.challenge = protobuf::MessageField::some(AuthChallenge::new());
    let payload = request.write_to_bytes()?;

    let reply_bytes = requestor.request(payload, timeout)?;
    let reply = DeviceAuthMessage::parse_from_bytes(&reply_bytes)?;

    if reply.error.is_some() {
        log::warn!("device rejected authentication");
        return Err(Error::Auth);
    }

    if reply.response.is_none() {
        return Err(Error::Auth);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_reply_with_no_response_and_no_error_is_still_rejected() {
        let mut reply = DeviceAuthMessage::new();
        reply.challenge = protobuf::MessageField::some(AuthChallenge::new());
        assert!(reply.response.is_none() && reply.error.is_none());
    }
}
