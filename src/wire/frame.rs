//! One wire frame: `be32(len) ‖ serialized CastMessage`.
//!
//! Reads and writes are each atomic at the frame level (spec §4.1); callers that
//! need atomic *sequences* of frames serialize through [`crate::transport::SocketChannel`].

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use protobuf::Message;

/// The generated `CastMessage` protobuf type, produced by `build.rs` from
/// `protobuf/cast_channel.proto` (spec §1: "the Cast framed-message protobuf schema
/// is assumed available as a generated codec").
mod generated {
    include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));
}

pub use generated::cast_channel;

/// Frames larger than this are rejected rather than allocated for, per spec §4.1's
/// recommended cap.
pub const MAX_FRAME_LEN: u32 = 65536;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    V2_1_0,
}

/// Payload carried by a [`CastMessage`]. Exactly one of `String`/`Binary` exists at
/// a time, matching the wire `payload_type` discriminant.
#[derive(Clone, Debug)]
pub enum CastMessagePayload {
    String(String),
    Binary(Vec<u8>),
}

/// The crate's in-memory view of a wire frame's contents — namespace, source and
/// destination ids, and payload. Mirrors the teacher's `message_manager::CastMessage`.
#[derive(Clone, Debug)]
pub struct CastMessage {
    pub namespace: String,
    pub source: String,
    pub destination: String,
    pub payload: CastMessagePayload,
}

impl CastMessage {
    pub fn new<S: Into<String>>(
        namespace: S,
        source: S,
        destination: S,
        payload: CastMessagePayload,
    ) -> Self {
        CastMessage {
            namespace: namespace.into(),
            source: source.into(),
            destination: destination.into(),
            payload,
        }
    }

    /// Reads exactly one frame: a 4-byte big-endian length, then that many bytes
    /// decoded as a `CastMessage` protobuf. Short reads surface as `io::Error` with
    /// `UnexpectedEof`, which callers treat as an end-of-stream/framing error.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<CastMessage> {
        let len = reader.read_u32::<BigEndian>()?;
        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame length {len} exceeds cap of {MAX_FRAME_LEN}"),
            ));
        }

        let mut buffer = vec![0u8; len as usize];
        reader.read_exact(&mut buffer)?;

        let raw = cast_channel::CastMessage::parse_from_bytes(&buffer)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let payload = match raw.payload_type() {
            cast_channel::cast_message::PayloadType::STRING => {
                CastMessagePayload::String(raw.payload_utf8().to_owned())
            }
            cast_channel::cast_message::PayloadType::BINARY => {
                CastMessagePayload::Binary(raw.payload_binary().to_owned())
            }
        };

        let message = CastMessage {
            namespace: raw.namespace().to_owned(),
            source: raw.source_id().to_owned(),
            destination: raw.destination_id().to_owned(),
            payload,
        };

        log::trace!(
            "frame received: ns={} src={} dst={}",
            message.namespace,
            message.source,
            message.destination
        );

        Ok(message)
    }

    /// Serializes this message and writes `be32(len) ‖ bytes` as a single frame.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut raw = cast_channel::CastMessage::new();
        raw.set_protocol_version(cast_channel::cast_message::ProtocolVersion::CASTV2_1_0);
        raw.set_source_id(self.source.clone());
        raw.set_destination_id(self.destination.clone());
        raw.set_namespace(self.namespace.clone());

        match &self.payload {
            CastMessagePayload::String(s) => {
                raw.set_payload_type(cast_channel::cast_message::PayloadType::STRING);
                raw.set_payload_utf8(s.clone());
            }
            CastMessagePayload::Binary(b) => {
                raw.set_payload_type(cast_channel::cast_message::PayloadType::BINARY);
                raw.set_payload_binary(b.clone());
            }
        }

        let body = raw
            .write_to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        writer.write_u32::<BigEndian>(body.len() as u32)?;
        writer.write_all(&body)?;
        writer.flush()?;

        log::trace!(
            "frame sent: ns={} src={} dst={}",
            self.namespace,
            self.source,
            self.destination
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_string_frame() {
        let message = CastMessage::new(
            "urn:x-cast:com.google.cast.tp.connection",
            "sender-0",
            "receiver-0",
            CastMessagePayload::String(r#"{"type":"CONNECT"}"#.to_owned()),
        );

        let mut buffer = Vec::new();
        message.write_to(&mut buffer).unwrap();

        let mut cursor = io::Cursor::new(buffer);
        let decoded = CastMessage::read_from(&mut cursor).unwrap();

        assert_eq!(decoded.namespace, message.namespace);
        assert_eq!(decoded.source, message.source);
        assert_eq!(decoded.destination, message.destination);
        match decoded.payload {
            CastMessagePayload::String(s) => assert_eq!(s, r#"{"type":"CONNECT"}"#),
            CastMessagePayload::Binary(_) => panic!("expected a string payload"),
        }
    }

    #[test]
    fn round_trips_a_binary_frame() {
        let message = CastMessage::new(
            "urn:x-cast:com.google.cast.tp.deviceauth",
            "sender-0",
            "receiver-0",
            CastMessagePayload::Binary(vec![1, 2, 3, 4]),
        );

        let mut buffer = Vec::new();
        message.write_to(&mut buffer).unwrap();

        let mut cursor = io::Cursor::new(buffer);
        let decoded = CastMessage::read_from(&mut cursor).unwrap();
        match decoded.payload {
            CastMessagePayload::Binary(b) => assert_eq!(b, vec![1, 2, 3, 4]),
            CastMessagePayload::String(_) => panic!("expected a binary payload"),
        }
    }

    #[test]
    fn short_read_is_an_error() {
        // Length prefix claims 10 bytes, body supplies none.
        let mut cursor = io::Cursor::new(vec![0u8, 0, 0, 10]);
        let result = CastMessage::read_from(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut buffer = Vec::new();
        buffer.write_u32::<BigEndian>(MAX_FRAME_LEN + 1).unwrap();
        let mut cursor = io::Cursor::new(buffer);
        let result = CastMessage::read_from(&mut cursor);
        assert!(result.is_err());
    }
}
