//! Initiator role: drives the handshake on a dialed connection and hands
//! back an established session handle.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ship_core::protocol::messages::{CmiType, Data, DataHeader};
use ship_core::Message;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::{self, HandshakePhase};
use crate::pin;
use crate::transport::Transport;

/// The initiator side of a session.
pub struct ShipClient {
    config: SessionConfig,
}

impl ShipClient {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Runs the initiator handshake on an established WebSocket stream.
    ///
    /// On failure the session attempts its ordered close once, best effort,
    /// and the original error is returned.
    ///
    /// # Errors
    ///
    /// Any [`SessionError`]; see the error type for the taxonomy.
    pub async fn connect<S>(
        self,
        ws: WebSocketStream<S>,
    ) -> Result<ShipConnection<S>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let session = Uuid::new_v4();
        let mut transport = Transport::new(
            ws,
            self.config.read_timeout(),
            self.config.close_timeout(),
        );
        info!(%session, "connection dialed");

        let mut phase = HandshakePhase::Init;
        while phase != HandshakePhase::Established {
            match self.advance(phase, &mut transport).await {
                Ok(next) => {
                    debug!(%session, from = ?phase, "handshake step complete");
                    phase = next;
                }
                Err(err) => {
                    warn!(%session, phase = ?phase, error = %err, "handshake failed");
                    let _ = transport.close().await;
                    return Err(err);
                }
            }
        }

        info!(%session, "session established");
        Ok(ShipConnection { transport, session })
    }

    /// Runs one handshake phase and returns the next.
    async fn advance<S>(
        &self,
        phase: HandshakePhase,
        transport: &mut Transport<S>,
    ) -> Result<HandshakePhase, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match phase {
            HandshakePhase::Init => {
                handshake::init_send(transport).await?;
                Ok(HandshakePhase::Hello)
            }
            HandshakePhase::Hello => {
                handshake::hello(transport, self.config.hello_timeout()).await?;
                Ok(HandshakePhase::ProtocolHandshake)
            }
            HandshakePhase::ProtocolHandshake => {
                handshake::negotiate_format_initiate(transport).await?;
                Ok(HandshakePhase::PinAuthentication)
            }
            HandshakePhase::PinAuthentication => {
                pin::exchange(
                    transport,
                    &self.config.local_pin,
                    &self.config.remote_pin,
                    self.config.pin_timeout(),
                )
                .await?;
                Ok(HandshakePhase::AccessMethods)
            }
            HandshakePhase::AccessMethods => {
                // Mirrors the responder: answer its request first, then ask.
                handshake::answer_access_methods(transport, &self.config.access_id).await?;
                handshake::request_access_methods(transport).await?;
                Ok(HandshakePhase::Established)
            }
            HandshakePhase::Established => Ok(HandshakePhase::Established),
        }
    }
}

/// Chooses the frame tag a message kind travels under.
fn tag_for(message: &Message) -> CmiType {
    match message {
        Message::Data(_) => CmiType::Data,
        _ => CmiType::Control,
    }
}

/// An established session, the initiator's view.
///
/// Created by [`ShipClient::connect`]. Dropping the handle abandons the
/// connection without the close exchange; call
/// [`close`](ShipConnection::close) for an orderly end.
pub struct ShipConnection<S> {
    transport: Transport<S>,
    session: Uuid,
}

impl<S> ShipConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends an application payload as a `data` message.
    ///
    /// The payload is forwarded opaquely; `protocol_id` names the
    /// application protocol for the peer's dispatch.
    pub async fn send_data(
        &mut self,
        protocol_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), SessionError> {
        let data = Data {
            header: DataHeader {
                protocol_id: protocol_id.to_string(),
            },
            payload,
        };
        self.send(Message::Data(data)).await
    }

    /// Sends any session-layer message under the tag its kind belongs on.
    pub async fn send(&mut self, message: Message) -> Result<(), SessionError> {
        let tag = tag_for(&message);
        self.transport.write_message(tag, message).await
    }

    /// Waits for the peer's next message, with no deadline.
    ///
    /// A peer-initiated close runs the close accept path first and then
    /// surfaces as [`SessionError::PeerClosed`], so callers can tell an
    /// orderly end from a failure without inspecting message kinds.
    pub async fn receive(&mut self) -> Result<Message, SessionError> {
        let message = self.transport.wait_message().await?;
        if let Message::Close(_) = message {
            info!(session = %self.session, "peer requested close");
            self.transport.accept_close().await?;
            return Err(SessionError::PeerClosed);
        }
        Ok(message)
    }

    /// Ordered close, this side initiating. Consumes the session.
    pub async fn close(mut self) -> Result<(), SessionError> {
        info!(session = %self.session, "closing session");
        self.transport.close().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
