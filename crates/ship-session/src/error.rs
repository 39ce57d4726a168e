//! Error taxonomy for session establishment and the message loop.

use thiserror::Error;

/// Errors surfaced by a session.
///
/// Handshake errors are terminal: by the time the caller sees one, the
/// session has already attempted its ordered close exactly once.
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O failure on the underlying WebSocket connection.
    #[error("transport: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// A bounded read expired before the peer's message arrived.
    #[error("read timed out")]
    Timeout,

    /// The peer sent something the protocol does not allow at this point.
    #[error("protocol violation: {0}")]
    Violation(String),

    /// The peer's envelope did not have the required shape.
    #[error("protocol violation: {0}")]
    Envelope(#[from] ship_core::EnvelopeError),

    /// An outgoing message could not be serialized.
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The peer rejected the handshake or aborted it mid-way.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The peer reported that the PIN this side presented was wrong.
    #[error("remote pin mismatched")]
    PinMismatch,

    /// The peer requires a PIN and none is configured for it.
    #[error("remote pin required but none configured")]
    PinUnavailable,

    /// The peer closed the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The application's message handler returned an error.
    #[error("message handler: {0}")]
    Handler(anyhow::Error),

    /// A message arrived in the loop but no handler is registered.
    #[error("no message handler configured")]
    NoHandler,
}
