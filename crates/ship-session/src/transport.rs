//! Framed transport over an established WebSocket connection.
//!
//! Every wire message is one binary WebSocket message: the first byte is the
//! frame type tag ([`CmiType`]), the rest is the payload. Control and Data
//! frames carry a JSON envelope; Init frames are raw bytes and only legal
//! during connection-mode initialization, so the envelope readers reject
//! them.
//!
//! Reads during the handshake are deadline-bound; [`Transport::wait_message`]
//! is the one read without a deadline, used by the steady-state message loop
//! where a session may sit idle between application messages.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use ship_core::protocol::messages::{
    CmiType, ConnectionClose, ConnectionClosePhase, MIN_MESSAGE_LEN,
};
use ship_core::{decode_envelope, Envelope, EnvelopeError, Message};

use crate::error::SessionError;

/// A session's view of the WebSocket connection.
///
/// Owns the stream for the whole session lifetime; the connection is released
/// exactly once, through [`close`](Transport::close) or
/// [`accept_close`](Transport::accept_close).
pub struct Transport<S> {
    ws: WebSocketStream<S>,
    read_timeout: Duration,
    close_timeout: Duration,
    released: bool,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established WebSocket stream.
    ///
    /// `read_timeout` bounds individual handshake reads; `close_timeout` is
    /// how long [`close`](Transport::close) waits for the peer's
    /// confirmation.
    pub fn new(ws: WebSocketStream<S>, read_timeout: Duration, close_timeout: Duration) -> Self {
        Self {
            ws,
            read_timeout,
            close_timeout,
            released: false,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.read_timeout
    }

    /// Next data-bearing WebSocket message as raw bytes.
    ///
    /// Ping/Pong frames are skipped; tungstenite queues the pong reply
    /// itself. `deadline == None` waits indefinitely.
    async fn recv_raw(&mut self, deadline: Option<Instant>) -> Result<Vec<u8>, SessionError> {
        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, self.ws.next()).await {
                    Ok(next) => next,
                    Err(_) => return Err(SessionError::Timeout),
                },
                None => self.ws.next().await,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(SessionError::Transport(e)),
                None => return Err(SessionError::PeerClosed),
            };

            match message {
                WsMessage::Binary(bytes) => return Ok(bytes),
                WsMessage::Text(text) => return Ok(text.into_bytes()),
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                WsMessage::Close(_) => return Err(SessionError::PeerClosed),
                WsMessage::Frame(_) => continue,
            }
        }
    }

    /// Reads one raw WebSocket message, including the frame tag byte.
    ///
    /// Only connection-mode initialization reads at this level; everything
    /// after it goes through the tagged readers.
    pub async fn read_binary(&mut self) -> Result<Vec<u8>, SessionError> {
        self.recv_raw(Some(self.deadline())).await
    }

    /// Sends raw bytes as one WebSocket message, no tag prepended.
    pub async fn write_binary(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.ws.send(WsMessage::Binary(bytes.to_vec())).await?;
        Ok(())
    }

    /// Reads one frame and splits it into tag and payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Violation`] when the message is shorter than
    /// the minimum frame or carries an unknown tag, and
    /// [`SessionError::Timeout`] when nothing arrives in time.
    pub async fn read_frame(&mut self) -> Result<(CmiType, Vec<u8>), SessionError> {
        let bytes = self.recv_raw(Some(self.deadline())).await?;
        split_frame(bytes)
    }

    /// Sends one frame: the tag byte followed by the payload.
    pub async fn write_frame(&mut self, tag: CmiType, payload: &[u8]) -> Result<(), SessionError> {
        let mut message = Vec::with_capacity(1 + payload.len());
        message.push(tag as u8);
        message.extend_from_slice(payload);
        self.ws.send(WsMessage::Binary(message)).await?;
        Ok(())
    }

    /// Serializes `value` as JSON and sends it under the given tag.
    pub async fn write_json<T>(&mut self, tag: CmiType, value: &T) -> Result<(), SessionError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(value)?;
        self.write_frame(tag, &payload).await
    }

    /// Encodes a session-layer message into its envelope and sends it.
    pub async fn write_message(&mut self, tag: CmiType, message: Message) -> Result<(), SessionError> {
        trace!(kind = message.kind(), "send");
        self.write_json(tag, &Envelope::from(message)).await
    }

    async fn read_envelope(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(CmiType, Envelope), SessionError> {
        let (tag, payload) = split_frame(self.recv_raw(deadline).await?)?;
        if tag == CmiType::Init {
            return Err(SessionError::Violation(
                "init frame outside connection-mode initialization".to_string(),
            ));
        }
        let envelope: Envelope =
            serde_json::from_slice(&payload).map_err(EnvelopeError::Malformed)?;
        Ok((tag, envelope))
    }

    /// Reads and decodes one Control or Data envelope before `deadline`.
    pub async fn read_message_by(&mut self, deadline: Instant) -> Result<Message, SessionError> {
        let (_, envelope) = self.read_envelope(Some(deadline)).await?;
        let message = decode_envelope(envelope)?;
        trace!(kind = message.kind(), "recv");
        Ok(message)
    }

    /// Reads and decodes one Control or Data envelope under the default
    /// read timeout.
    pub async fn read_message(&mut self) -> Result<Message, SessionError> {
        self.read_message_by(self.deadline()).await
    }

    /// Reads one envelope before `deadline` and requires the Control tag.
    ///
    /// Handshake exchanges only ever travel on the Control channel; a Data
    /// frame here is a violation.
    pub async fn read_control_by(&mut self, deadline: Instant) -> Result<Message, SessionError> {
        let (tag, envelope) = self.read_envelope(Some(deadline)).await?;
        if tag != CmiType::Control {
            return Err(SessionError::Violation(format!(
                "expected a control frame, got {tag:?}"
            )));
        }
        let message = decode_envelope(envelope)?;
        trace!(kind = message.kind(), "recv");
        Ok(message)
    }

    /// Reads one Control envelope under the default read timeout.
    pub async fn read_control(&mut self) -> Result<Message, SessionError> {
        self.read_control_by(self.deadline()).await
    }

    /// Waits for the next envelope without a deadline.
    ///
    /// The established message loop has no upper bound on peer silence; the
    /// wait ends when a message arrives or the connection goes away.
    pub async fn wait_message(&mut self) -> Result<Message, SessionError> {
        let (_, envelope) = self.read_envelope(None).await?;
        let message = decode_envelope(envelope)?;
        trace!(kind = message.kind(), "recv");
        Ok(message)
    }

    /// Ordered close, initiating side.
    ///
    /// Announces the close, waits up to the close timeout for the peer's
    /// confirmation, then releases the connection regardless. A crossing
    /// announce from the peer counts as confirmation, both sides are closing
    /// either way. Calling this after the connection was already released is
    /// a no-op.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if self.released {
            return Ok(());
        }

        let announce = Message::Close(ConnectionClose {
            phase: ConnectionClosePhase::Announce,
            max_time: Some(self.close_timeout.as_millis() as u64),
            reason: None,
        });

        if self.write_message(CmiType::Control, announce).await.is_ok() {
            let deadline = Instant::now() + self.close_timeout;
            loop {
                match self.read_message_by(deadline).await {
                    Ok(Message::Close(_)) => break,
                    Ok(other) => {
                        debug!(kind = other.kind(), "discarding message during close");
                    }
                    Err(_) => break,
                }
            }
        }

        self.release().await
    }

    /// Ordered close, accepting side: the peer's announce was already read.
    ///
    /// Confirms the close and releases the connection.
    pub async fn accept_close(&mut self) -> Result<(), SessionError> {
        let confirm = Message::Close(ConnectionClose {
            phase: ConnectionClosePhase::Confirm,
            max_time: None,
            reason: None,
        });
        self.write_message(CmiType::Control, confirm).await?;
        self.release().await
    }

    /// Closes the WebSocket itself. A connection the peer already tore down
    /// counts as released.
    async fn release(&mut self) -> Result<(), SessionError> {
        self.released = true;
        match self.ws.close(None).await {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SessionError::Transport(e)),
        }
    }
}

/// Splits a raw wire message into frame tag and payload.
fn split_frame(mut bytes: Vec<u8>) -> Result<(CmiType, Vec<u8>), SessionError> {
    if bytes.len() < MIN_MESSAGE_LEN {
        return Err(SessionError::Violation(format!(
            "message too short: {} byte(s)",
            bytes.len()
        )));
    }
    let payload = bytes.split_off(1);
    let tag = CmiType::try_from(bytes[0])
        .map_err(|()| SessionError::Violation(format!("unknown frame tag {:#04x}", bytes[0])))?;
    Ok((tag, payload))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
