//! # ship-core
//!
//! Wire types and envelope codec for the SHIP-Link session protocol.
//!
//! Everything that crosses the wire is defined here: the frame type tags, the
//! message body structs, and the JSON envelope that wraps exactly one message
//! per frame, together with the codec that enforces the envelope invariants.
//! This crate has zero dependencies on sockets, timers, or the async runtime;
//! the `ship-session` crate supplies the I/O on top of it.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `ship_core::Message` instead of `ship_core::protocol::envelope::Message`.
pub use protocol::envelope::{
    decode_envelope, decode_message, encode_message, Envelope, EnvelopeError, Message,
};
pub use protocol::messages::CmiType;
