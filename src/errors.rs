//! Crate-wide error type.
//!
//! One variant per row of the error-kind table: transport failures tear the
//! channel down, protocol-level failures (`LaunchFailed`, `MediaRequest`) do not.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Socket open/read/write failure, malformed frame, or short frame. The channel
    /// that raised this is marked `CLOSED`.
    #[error("I/O error communicating with cast device: {0}")]
    Io(#[from] std::io::Error),

    /// No correlated reply arrived within the caller's deadline. The channel stays
    /// `OPEN`; the Requestor has already deregistered itself.
    #[error("No response received within {0:?}")]
    Timeout(std::time::Duration),

    /// The device rejected authentication, or the handshake was otherwise refused.
    #[error("Failed to authenticate with Cast device")]
    Auth,

    /// The device replied `LAUNCH_ERROR` to a `LAUNCH` request.
    #[error("Failed to launch application {app_id}: {reason}")]
    LaunchFailed { app_id: String, reason: String },

    /// A stopped application controller (or a pre-connect operation) was used.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A media-namespace response whose `type` is in the error set (`LOAD_FAILED`,
    /// `LOAD_CANCELLED`, `INVALID_PLAYER_STATE`, `INVALID_REQUEST`).
    #[error("Media request failed: {0}")]
    MediaRequest(String),

    /// The device replied `INVALID_REQUEST` to a receiver-namespace request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// TLS handshake or configuration failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid DNS name for TLS server name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Malformed protobuf frame body.
    #[error("protobuf error: {0}")]
    Protobuf(#[from] protobuf::Error),

    /// Malformed JSON envelope.
    #[error("(de)serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A frame or listener referenced a namespace that does not match what was
    /// expected.
    #[error("unexpected namespace: {0}")]
    Namespace(String),

    /// Catch-all for conditions the rest of the library has already described in the
    /// message (malformed envelopes, missing fields in an otherwise-valid response).
    #[error("{0}")]
    Internal(String),
}
