//! Handshake steps shared by both session roles.
//!
//! The sequencer in each role is an explicit phase machine over
//! [`HandshakePhase`]: every phase has exactly one success transition, no
//! phase is entered before the previous one finished, and the first failure
//! aborts the rest (the role then runs the ordered close once and returns
//! the original error).
//!
//! Each step here is one phase body. The responder and initiator pair up
//! mirrored steps: `init_respond`/`init_send`, the shared `hello`, the two
//! `negotiate_format_*` halves, and the access-methods halves in opposite
//! order.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::debug;

use ship_core::protocol::messages::{
    AccessMethods, AccessMethodsRequest, CmiType, ConnectionHello, ConnectionHelloPhase,
    HandshakeType, MessageProtocolHandshake, MessageProtocolHandshakeError, CMI_INIT,
    FORMAT_JSON_UTF8, HANDSHAKE_ERROR_UNEXPECTED_MESSAGE, PROTOCOL_VERSION,
};
use ship_core::Message;

use crate::error::SessionError;
use crate::transport::Transport;

/// Ordered phases of session establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Connection-mode initialization: the two-byte init message and its
    /// byte-identical echo.
    Init,
    /// Greeting exchange; both sides declare readiness.
    Hello,
    /// Message-format negotiation: announce, select, confirm.
    ProtocolHandshake,
    /// PIN verification in each direction.
    PinAuthentication,
    /// Exchange of endpoint identifiers.
    AccessMethods,
    /// Handshake complete; the message loop may run.
    Established,
}

// ── Connection-mode initialization ────────────────────────────────────────────

/// Responder half of init: the peer speaks first and must send exactly the
/// init message, which is echoed back byte for byte.
pub(crate) async fn init_respond<S>(transport: &mut Transport<S>) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = transport.read_binary().await?;
    if message != CMI_INIT {
        return Err(SessionError::Violation(format!(
            "init: invalid message: {message:02x?}"
        )));
    }
    transport.write_binary(&CMI_INIT).await
}

/// Initiator half of init: send the init message and require a
/// byte-identical echo.
pub(crate) async fn init_send<S>(transport: &mut Transport<S>) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport.write_binary(&CMI_INIT).await?;
    let echo = transport.read_binary().await?;
    if echo != CMI_INIT {
        return Err(SessionError::Violation(format!(
            "init: invalid echo: {echo:02x?}"
        )));
    }
    Ok(())
}

// ── Hello ─────────────────────────────────────────────────────────────────────

/// Greeting exchange, identical in both roles: declare readiness, then wait
/// under one deadline until the peer declares readiness too.
///
/// `pending` keeps the wait going but the deadline stands; prolongation
/// requests are not granted.
pub(crate) async fn hello<S>(
    transport: &mut Transport<S>,
    timeout: Duration,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ready = ConnectionHello {
        phase: ConnectionHelloPhase::Ready,
        waiting: Some(timeout.as_millis() as u64),
        prolongation_request: None,
    };
    transport
        .write_message(CmiType::Control, Message::Hello(ready))
        .await?;

    let deadline = Instant::now() + timeout;
    loop {
        match transport.read_control_by(deadline).await? {
            Message::Hello(hello) => match hello.phase {
                ConnectionHelloPhase::Ready => return Ok(()),
                ConnectionHelloPhase::Pending => {
                    debug!("peer not ready yet");
                }
                ConnectionHelloPhase::Aborted => {
                    return Err(SessionError::HandshakeRejected(
                        "peer aborted during hello".to_string(),
                    ))
                }
            },
            Message::Close(_) => return Err(SessionError::PeerClosed),
            other => {
                return Err(SessionError::Violation(format!(
                    "unexpected {} during hello",
                    other.kind()
                )))
            }
        }
    }
}

// ── Protocol-format negotiation ───────────────────────────────────────────────

fn is_supported_format(formats: &[String]) -> bool {
    formats.len() == 1 && formats[0] == FORMAT_JSON_UTF8
}

/// Initiator half: announce the supported format, wait for the peer's
/// selection, then confirm it by echoing the selection back.
pub(crate) async fn negotiate_format_initiate<S>(
    transport: &mut Transport<S>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let announcement = MessageProtocolHandshake {
        handshake_type: HandshakeType::AnnounceMax,
        version: PROTOCOL_VERSION,
        formats: vec![FORMAT_JSON_UTF8.to_string()],
    };
    transport
        .write_message(CmiType::Control, Message::ProtocolHandshake(announcement))
        .await?;

    let selection = receive_select(transport).await?;

    transport
        .write_message(CmiType::Control, Message::ProtocolHandshake(selection))
        .await
}

/// Responder half: validate the peer's announcement, echo it back as the
/// selection with only the handshake type rewritten, then wait for the
/// confirming selection.
///
/// An unacceptable announcement is answered with a
/// `messageProtocolHandshakeError` before the step fails.
pub(crate) async fn negotiate_format_respond<S>(
    transport: &mut Transport<S>,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = transport.read_control().await?;
    let Message::ProtocolHandshake(mut handshake) = message else {
        if let Message::Close(_) = message {
            return Err(SessionError::PeerClosed);
        }
        return Err(SessionError::Violation(format!(
            "expected messageProtocolHandshake, got {}",
            message.kind()
        )));
    };

    if handshake.handshake_type != HandshakeType::AnnounceMax
        || !is_supported_format(&handshake.formats)
    {
        let error = MessageProtocolHandshakeError {
            error: HANDSHAKE_ERROR_UNEXPECTED_MESSAGE,
        };
        let _ = transport
            .write_message(CmiType::Control, Message::ProtocolHandshakeError(error))
            .await;
        return Err(SessionError::HandshakeRejected(
            "unsupported protocol announcement".to_string(),
        ));
    }

    // The selection is the announcement with only the type rewritten; every
    // other field travels back untouched.
    handshake.handshake_type = HandshakeType::Select;
    transport
        .write_message(CmiType::Control, Message::ProtocolHandshake(handshake))
        .await?;

    receive_select(transport).await?;
    Ok(())
}

/// Waits for a `select` carrying the supported format and returns it.
pub(crate) async fn receive_select<S>(
    transport: &mut Transport<S>,
) -> Result<MessageProtocolHandshake, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match transport.read_control().await? {
        Message::ProtocolHandshake(handshake)
            if handshake.handshake_type == HandshakeType::Select
                && is_supported_format(&handshake.formats) =>
        {
            Ok(handshake)
        }
        Message::ProtocolHandshake(_) => Err(SessionError::HandshakeRejected(
            "peer selected an unsupported protocol".to_string(),
        )),
        Message::ProtocolHandshakeError(error) => Err(SessionError::HandshakeRejected(format!(
            "peer rejected the protocol announcement (error {})",
            error.error
        ))),
        Message::Close(_) => Err(SessionError::PeerClosed),
        other => Err(SessionError::Violation(format!(
            "expected messageProtocolHandshake, got {}",
            other.kind()
        ))),
    }
}

// ── Access methods ────────────────────────────────────────────────────────────

/// Asks the peer for its access methods and reads the announcement.
pub(crate) async fn request_access_methods<S>(
    transport: &mut Transport<S>,
) -> Result<AccessMethods, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .write_message(
            CmiType::Control,
            Message::AccessMethodsRequest(AccessMethodsRequest {}),
        )
        .await?;

    match transport.read_control().await? {
        Message::AccessMethods(methods) => {
            debug!(peer = %methods.id, "peer access methods");
            Ok(methods)
        }
        Message::Close(_) => Err(SessionError::PeerClosed),
        other => Err(SessionError::Violation(format!(
            "expected accessMethods, got {}",
            other.kind()
        ))),
    }
}

/// Answers the peer's access-methods request with this endpoint's id.
pub(crate) async fn answer_access_methods<S>(
    transport: &mut Transport<S>,
    id: &str,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match transport.read_control().await? {
        Message::AccessMethodsRequest(_) => {}
        Message::Close(_) => return Err(SessionError::PeerClosed),
        other => {
            return Err(SessionError::Violation(format!(
                "expected accessMethodsRequest, got {}",
                other.kind()
            )))
        }
    }

    transport
        .write_message(
            CmiType::Control,
            Message::AccessMethods(AccessMethods { id: id.to_string() }),
        )
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
