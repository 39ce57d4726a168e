//! Responder role: drives the handshake on an accepted connection, then
//! runs the message loop until the peer closes or something fails.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ship_core::Message;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::{self, HandshakePhase};
use crate::pin;
use crate::transport::Transport;

/// Application callback invoked for each message the loop delivers.
///
/// Close messages never reach the handler; the session handles those itself.
pub trait MessageHandler: Send + Sync {
    /// Handles one application message.
    ///
    /// Returning an error ends the session; the error comes back out of
    /// [`ShipServer::serve`] as [`SessionError::Handler`].
    fn handle(&mut self, message: Message) -> anyhow::Result<()>;
}

/// Adapter turning a closure into a [`MessageHandler`].
///
/// Kept private; closures register through
/// [`ShipServer::with_handler_fn`].
struct FnHandler<F>(F);

impl<F> MessageHandler for FnHandler<F>
where
    F: FnMut(Message) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&mut self, message: Message) -> anyhow::Result<()> {
        (self.0)(message)
    }
}

/// The responder side of a session.
///
/// One `ShipServer` serves one connection at a time; run one per accepted
/// connection when serving several peers concurrently.
pub struct ShipServer {
    config: SessionConfig,
    handler: Option<Box<dyn MessageHandler>>,
}

impl ShipServer {
    /// Creates a responder with no message handler registered.
    ///
    /// Without a handler the session still establishes and still answers an
    /// orderly close, but the first application message fails the loop with
    /// [`SessionError::NoHandler`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            handler: None,
        }
    }

    /// Registers the application callback for incoming messages.
    pub fn with_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Registers a closure as the application callback.
    pub fn with_handler_fn<F>(self, handler: F) -> Self
    where
        F: FnMut(Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_handler(FnHandler(handler))
    }

    /// Runs the responder handshake on an established WebSocket stream, then
    /// the message loop until the session ends.
    ///
    /// A peer-initiated orderly close completes the close exchange and
    /// returns `Ok(())`. Every other exit attempts the ordered close once,
    /// best effort, and returns the original error.
    ///
    /// # Errors
    ///
    /// Any [`SessionError`]; see the error type for the taxonomy.
    pub async fn serve<S>(&mut self, ws: WebSocketStream<S>) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let session = Uuid::new_v4();
        let mut transport = Transport::new(
            ws,
            self.config.read_timeout(),
            self.config.close_timeout(),
        );
        info!(%session, "connection accepted");

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

        match self.message_loop(&mut transport, session).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%session, error = %err, "message loop ended");
                let _ = transport.close().await;
                Err(err)
            }
        }
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
                handshake::init_respond(transport).await?;
                Ok(HandshakePhase::Hello)
            }
            HandshakePhase::Hello => {
                handshake::hello(transport, self.config.hello_timeout()).await?;
                Ok(HandshakePhase::ProtocolHandshake)
            }
            HandshakePhase::ProtocolHandshake => {
                handshake::negotiate_format_respond(transport).await?;
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
                // The responder requests first, then answers the peer's
                // mirrored request.
                handshake::request_access_methods(transport).await?;
                handshake::answer_access_methods(transport, &self.config.access_id).await?;
                Ok(HandshakePhase::Established)
            }
            HandshakePhase::Established => Ok(HandshakePhase::Established),
        }
    }

    async fn message_loop<S>(
        &mut self,
        transport: &mut Transport<S>,
        session: Uuid,
    ) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let message = transport.wait_message().await?;

            if let Message::Close(_) = message {
                info!(%session, "peer requested close");
                return transport.accept_close().await;
            }

            debug!(%session, kind = message.kind(), "dispatching message");
            let handler = self.handler.as_mut().ok_or(SessionError::NoHandler)?;
            handler.handle(message).map_err(SessionError::Handler)?;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
