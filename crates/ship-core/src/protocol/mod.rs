//! Protocol module containing message types and the envelope codec.

pub mod envelope;
pub mod messages;

pub use envelope::{decode_envelope, decode_message, encode_message, Envelope, EnvelopeError, Message};
pub use messages::*;
