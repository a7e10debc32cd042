//! The frame codec and the JSON payload envelope — the two pieces of the wire
//! format that everything else in the crate builds on.

pub mod envelope;
pub mod frame;

pub use envelope::Envelope;
pub use frame::{CastMessage, CastMessagePayload, ProtocolVersion};
