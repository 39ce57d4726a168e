//! JSON envelope codec for Control and Data frames.
//!
//! Wire format:
//! ```text
//! {"<messageField>":[{ ...body... }]}
//! ```
//! An envelope is a JSON object with exactly one top-level field naming the
//! message kind; the field's value is a sequence holding exactly one body
//! object. [`decode_message`] enforces both invariants before dispatching to
//! the typed [`Message`] variant, so code above this layer never sees a
//! malformed envelope.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::{
    AccessMethods, AccessMethodsRequest, ConnectionClose, ConnectionHello, ConnectionPinError,
    ConnectionPinInput, ConnectionPinState, Data, MessageProtocolHandshake,
    MessageProtocolHandshakeError,
};

/// Errors that can occur during envelope encoding or decoding.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The payload was not valid JSON or a body had the wrong shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope did not contain exactly one known message field.
    #[error("envelope must have exactly one message field, found {0}")]
    FieldCount(usize),

    /// The message field's sequence did not contain exactly one element.
    #[error("message sequence must have exactly one element, found {0}")]
    ElementCount(usize),
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Wire-level envelope: at most one field is populated per message.
///
/// Field names are the wire names. Every value is a sequence that must hold
/// exactly one element; [`decode_envelope`] checks this and
/// [`From<Message>`](Envelope::from) produces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_hello: Option<Vec<ConnectionHello>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_protocol_handshake: Option<Vec<MessageProtocolHandshake>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_protocol_handshake_error: Option<Vec<MessageProtocolHandshakeError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_pin_state: Option<Vec<ConnectionPinState>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_pin_input: Option<Vec<ConnectionPinInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_pin_error: Option<Vec<ConnectionPinError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_methods_request: Option<Vec<AccessMethodsRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_methods: Option<Vec<AccessMethods>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_close: Option<Vec<ConnectionClose>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Data>>,
}

impl Envelope {
    /// Number of populated message fields.
    fn populated(&self) -> usize {
        usize::from(self.connection_hello.is_some())
            + usize::from(self.message_protocol_handshake.is_some())
            + usize::from(self.message_protocol_handshake_error.is_some())
            + usize::from(self.connection_pin_state.is_some())
            + usize::from(self.connection_pin_input.is_some())
            + usize::from(self.connection_pin_error.is_some())
            + usize::from(self.access_methods_request.is_some())
            + usize::from(self.access_methods.is_some())
            + usize::from(self.connection_close.is_some())
            + usize::from(self.data.is_some())
    }
}

// ── Typed message union ───────────────────────────────────────────────────────

/// All valid session-layer messages, discriminated by envelope field.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(ConnectionHello),
    ProtocolHandshake(MessageProtocolHandshake),
    ProtocolHandshakeError(MessageProtocolHandshakeError),
    PinState(ConnectionPinState),
    PinInput(ConnectionPinInput),
    PinError(ConnectionPinError),
    AccessMethodsRequest(AccessMethodsRequest),
    AccessMethods(AccessMethods),
    Close(ConnectionClose),
    Data(Data),
}

impl Message {
    /// Returns the wire field name for this message kind.
    ///
    /// Used in log output and error text so that message bodies (which may
    /// carry a PIN) are never printed by accident.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "connectionHello",
            Message::ProtocolHandshake(_) => "messageProtocolHandshake",
            Message::ProtocolHandshakeError(_) => "messageProtocolHandshakeError",
            Message::PinState(_) => "connectionPinState",
            Message::PinInput(_) => "connectionPinInput",
            Message::PinError(_) => "connectionPinError",
            Message::AccessMethodsRequest(_) => "accessMethodsRequest",
            Message::AccessMethods(_) => "accessMethods",
            Message::Close(_) => "connectionClose",
            Message::Data(_) => "data",
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        let mut envelope = Envelope::default();
        match message {
            Message::Hello(body) => envelope.connection_hello = Some(vec![body]),
            Message::ProtocolHandshake(body) => {
                envelope.message_protocol_handshake = Some(vec![body])
            }
            Message::ProtocolHandshakeError(body) => {
                envelope.message_protocol_handshake_error = Some(vec![body])
            }
            Message::PinState(body) => envelope.connection_pin_state = Some(vec![body]),
            Message::PinInput(body) => envelope.connection_pin_input = Some(vec![body]),
            Message::PinError(body) => envelope.connection_pin_error = Some(vec![body]),
            Message::AccessMethodsRequest(body) => {
                envelope.access_methods_request = Some(vec![body])
            }
            Message::AccessMethods(body) => envelope.access_methods = Some(vec![body]),
            Message::Close(body) => envelope.connection_close = Some(vec![body]),
            Message::Data(body) => envelope.data = Some(vec![body]),
        }
        envelope
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one envelope from raw JSON into its typed message.
///
/// # Errors
///
/// Returns [`EnvelopeError`] if the JSON is malformed, the envelope does not
/// have exactly one known message field, or the field's sequence does not
/// hold exactly one element.
pub fn decode_message(payload: &[u8]) -> Result<Message, EnvelopeError> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    decode_envelope(envelope)
}

/// Dispatches an already-parsed [`Envelope`] to its single typed message.
///
/// # Errors
///
/// Returns [`EnvelopeError::FieldCount`] when zero or several message fields
/// are populated, and [`EnvelopeError::ElementCount`] when the populated
/// field's sequence is not exactly one element long.
pub fn decode_envelope(envelope: Envelope) -> Result<Message, EnvelopeError> {
    let populated = envelope.populated();
    if populated != 1 {
        return Err(EnvelopeError::FieldCount(populated));
    }

    let message = if let Some(seq) = envelope.connection_hello {
        Message::Hello(single(seq)?)
    } else if let Some(seq) = envelope.message_protocol_handshake {
        Message::ProtocolHandshake(single(seq)?)
    } else if let Some(seq) = envelope.message_protocol_handshake_error {
        Message::ProtocolHandshakeError(single(seq)?)
    } else if let Some(seq) = envelope.connection_pin_state {
        Message::PinState(single(seq)?)
    } else if let Some(seq) = envelope.connection_pin_input {
        Message::PinInput(single(seq)?)
    } else if let Some(seq) = envelope.connection_pin_error {
        Message::PinError(single(seq)?)
    } else if let Some(seq) = envelope.access_methods_request {
        Message::AccessMethodsRequest(single(seq)?)
    } else if let Some(seq) = envelope.access_methods {
        Message::AccessMethods(single(seq)?)
    } else if let Some(seq) = envelope.connection_close {
        Message::Close(single(seq)?)
    } else if let Some(seq) = envelope.data {
        Message::Data(single(seq)?)
    } else {
        return Err(EnvelopeError::FieldCount(0));
    };

    Ok(message)
}

/// Encodes a typed message into envelope JSON.
///
/// # Errors
///
/// Returns [`EnvelopeError::Malformed`] if serialization fails.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, EnvelopeError> {
    let envelope = Envelope::from(message.clone());
    Ok(serde_json::to_vec(&envelope)?)
}

/// Unwraps the exactly-one-element sequence of an envelope field.
fn single<T>(mut seq: Vec<T>) -> Result<T, EnvelopeError> {
    if seq.len() != 1 {
        return Err(EnvelopeError::ElementCount(seq.len()));
    }
    Ok(seq.remove(0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
