//! All SHIP-Link protocol message types.
//!
//! Every wire message is a single frame: one type-tag byte followed by the
//! payload. The init frame carries one raw flag byte; Control and Data frames
//! carry a JSON envelope (see [`crate::protocol::envelope`]). Field names in
//! the JSON are camelCase and are fixed by the protocol.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// The complete connection-mode-initialization message: Init tag + flag 0.
///
/// Both sides must exchange exactly these two bytes before anything else.
pub const CMI_INIT: [u8; 2] = [CmiType::Init as u8, 0x00];

/// Minimum length of any wire message (tag byte + at least one payload byte).
pub const MIN_MESSAGE_LEN: usize = 2;

/// The single message-protocol format supported by this implementation.
pub const FORMAT_JSON_UTF8: &str = "JSON-UTF8";

/// Protocol version announced during the handshake.
pub const PROTOCOL_VERSION: Version = Version { major: 1, minor: 0 };

/// Handshake-error code sent when the peer's announcement is not acceptable.
pub const HANDSHAKE_ERROR_UNEXPECTED_MESSAGE: u8 = 2;

/// PIN-error code signalled back to a peer that presented a wrong PIN.
pub const PIN_ERROR_WRONG_PIN: u8 = 1;

// ── Frame type tags ───────────────────────────────────────────────────────────

/// Frame type tag, the first byte of every wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CmiType {
    /// Connection-mode initialization; payload is a single flag byte.
    Init = 0x00,
    /// Handshake and connection-management envelopes.
    Control = 0x01,
    /// Application data envelopes.
    Data = 0x02,
}

impl TryFrom<u8> for CmiType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(CmiType::Init),
            0x01 => Ok(CmiType::Control),
            0x02 => Ok(CmiType::Data),
            _ => Err(()),
        }
    }
}

// ── Hello ─────────────────────────────────────────────────────────────────────

/// Phase of the hello exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionHelloPhase {
    /// The peer needs more time before it is ready.
    Pending,
    /// The peer is ready to proceed with the handshake.
    Ready,
    /// The peer is abandoning the connection.
    Aborted,
}

/// `connectionHello`: greeting exchanged right after connection-mode init.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHello {
    pub phase: ConnectionHelloPhase,
    /// How long the sender will keep waiting, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<u64>,
    /// Request to extend the peer's waiting window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prolongation_request: Option<bool>,
}

// ── Protocol handshake ────────────────────────────────────────────────────────

/// Role of a `messageProtocolHandshake` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandshakeType {
    /// Sender announces the maximum protocol it supports.
    AnnounceMax,
    /// Sender selects (or confirms) the protocol to use.
    Select,
}

/// Protocol version pair carried in the handshake announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

/// `messageProtocolHandshake`: format negotiation record.
///
/// The responder turns an acceptable `announceMax` into the selection by
/// rewriting `handshake_type` to [`HandshakeType::Select`] and echoing every
/// other field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshake {
    pub handshake_type: HandshakeType,
    pub version: Version,
    /// Supported payload formats; the only accepted list is one entry equal
    /// to [`FORMAT_JSON_UTF8`].
    pub formats: Vec<String>,
}

/// `messageProtocolHandshakeError`: rejection of the peer's announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageProtocolHandshakeError {
    /// Error code; [`HANDSHAKE_ERROR_UNEXPECTED_MESSAGE`] for format mismatch.
    pub error: u8,
}

// ── PIN authentication ────────────────────────────────────────────────────────

/// Whether and how a peer requires PIN input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinState {
    /// No PIN protection on this side.
    None,
    /// A PIN must be presented before the session is established.
    Required,
    /// A PIN may be presented but is not required.
    Optional,
    /// PIN verification has already succeeded.
    PinOk,
}

/// Whether a peer currently accepts `connectionPinInput` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinInputPermission {
    Busy,
    Ok,
}

/// `connectionPinState`: announcement of this side's PIN requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPinState {
    pub pin_state: PinState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_permission: Option<PinInputPermission>,
}

/// `connectionPinInput`: a PIN presented to satisfy the peer's requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPinInput {
    pub pin: String,
}

/// `connectionPinError`: notification that a presented PIN was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPinError {
    /// Error code; [`PIN_ERROR_WRONG_PIN`] for a mismatched PIN.
    pub error: u8,
}

// ── Access methods ────────────────────────────────────────────────────────────

/// `accessMethodsRequest`: asks the peer to announce its access methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMethodsRequest {}

/// `accessMethods`: names the endpoint answering an access-methods request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessMethods {
    pub id: String,
}

// ── Connection close ──────────────────────────────────────────────────────────

/// Phase of the ordered-close exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionClosePhase {
    /// Initiator announces it is about to close the connection.
    Announce,
    /// Receiver confirms; both sides may now release the connection.
    Confirm,
}

/// `connectionClose`: one leg of the bilateral close acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionClose {
    pub phase: ConnectionClosePhase,
    /// How long the announcer waits for the confirm, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ── Application data ──────────────────────────────────────────────────────────

/// Header of a `data` message, naming the application protocol of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataHeader {
    pub protocol_id: String,
}

/// `data`: post-handshake application message.
///
/// The payload is carried as an opaque JSON value; this layer never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Data {
    pub header: DataHeader,
    pub payload: serde_json::Value,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
