//! PIN authentication sub-protocol.
//!
//! Each direction is verified independently. Completion is tracked as two
//! bits: `received` (the peer satisfied this side's requirement) and `sent`
//! (this side satisfied the peer's). A side with no local PIN starts with
//! `received` already set.
//!
//! One deadline, computed when the exchange starts, bounds the whole
//! sub-protocol. It is not re-armed between messages: a peer trickling in
//! one message per timeout window cannot hold the handshake open forever.
//!
//! PIN values never appear in log output or error text.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::debug;

use ship_core::protocol::messages::{
    CmiType, ConnectionPinError, ConnectionPinInput, ConnectionPinState, PinInputPermission,
    PinState, PIN_ERROR_WRONG_PIN,
};
use ship_core::Message;

use crate::error::SessionError;
use crate::transport::Transport;

const PIN_RECEIVED: u8 = 1 << 0;
const PIN_SENT: u8 = 1 << 1;
const PIN_COMPLETED: u8 = PIN_RECEIVED | PIN_SENT;

fn announcement(local: &str) -> ConnectionPinState {
    if local.is_empty() {
        ConnectionPinState {
            pin_state: PinState::None,
            input_permission: None,
        }
    } else {
        ConnectionPinState {
            pin_state: PinState::Required,
            input_permission: Some(PinInputPermission::Ok),
        }
    }
}

/// Runs the bidirectional PIN exchange.
///
/// `local` is the PIN the peer must present (empty disables the
/// requirement); `remote` is the PIN presented if the peer requires one.
///
/// A wrong PIN from the peer is answered with a `connectionPinError` but
/// does not end the exchange by itself; the peer reacts to the error and
/// abandons the session from its side. A received `connectionPinError`
/// fails immediately.
///
/// # Errors
///
/// [`SessionError::PinUnavailable`] when the peer requires a PIN and
/// `remote` is empty, [`SessionError::PinMismatch`] when the peer rejects
/// the presented PIN, [`SessionError::Timeout`] when the exchange outlives
/// its deadline.
pub async fn exchange<S>(
    transport: &mut Transport<S>,
    local: &str,
    remote: &str,
    timeout: Duration,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut status = 0u8;
    if local.is_empty() {
        // nothing to collect from the peer
        status |= PIN_RECEIVED;
    }

    transport
        .write_message(CmiType::Control, Message::PinState(announcement(local)))
        .await?;

    let deadline = Instant::now() + timeout;
    while status != PIN_COMPLETED {
        match transport.read_control_by(deadline).await? {
            Message::PinInput(input) => {
                if input.pin != local {
                    debug!("peer presented a wrong pin");
                    transport
                        .write_message(
                            CmiType::Control,
                            Message::PinError(ConnectionPinError {
                                error: PIN_ERROR_WRONG_PIN,
                            }),
                        )
                        .await?;
                }
                status |= PIN_RECEIVED;
            }

            Message::PinState(state) => {
                if matches!(state.pin_state, PinState::Required | PinState::Optional) {
                    if remote.is_empty() {
                        return Err(SessionError::PinUnavailable);
                    }
                    transport
                        .write_message(
                            CmiType::Control,
                            Message::PinInput(ConnectionPinInput {
                                pin: remote.to_string(),
                            }),
                        )
                        .await?;
                }
                status |= PIN_SENT;
            }

            Message::PinError(_) => return Err(SessionError::PinMismatch),

            Message::Close(_) => return Err(SessionError::PeerClosed),

            other => {
                return Err(SessionError::Violation(format!(
                    "unexpected {} during pin exchange",
                    other.kind()
                )))
            }
        }
    }

    Ok(())
}

/// Receive-only variant for peers that never announce a PIN state of their
/// own and never require one: announce the local requirement, then wait for
/// a matching PIN.
///
/// With no local PIN this announces `none` and returns immediately. A peer
/// announcement that does arrive is skipped; this side has no credential to
/// present. Mismatches are signaled the same way as in [`exchange`].
///
/// # Errors
///
/// Same as [`exchange`], minus [`SessionError::PinUnavailable`].
pub async fn receive<S>(
    transport: &mut Transport<S>,
    local: &str,
    timeout: Duration,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport
        .write_message(CmiType::Control, Message::PinState(announcement(local)))
        .await?;

    if local.is_empty() {
        return Ok(());
    }

    let deadline = Instant::now() + timeout;
    loop {
        match transport.read_control_by(deadline).await? {
            Message::PinInput(input) => {
                if input.pin == local {
                    return Ok(());
                }
                debug!("peer presented a wrong pin");
                transport
                    .write_message(
                        CmiType::Control,
                        Message::PinError(ConnectionPinError {
                            error: PIN_ERROR_WRONG_PIN,
                        }),
                    )
                    .await?;
            }

            Message::PinState(_) => {
                debug!("skipping peer pin announcement");
            }

            Message::PinError(_) => return Err(SessionError::PinMismatch),

            Message::Close(_) => return Err(SessionError::PeerClosed),

            other => {
                return Err(SessionError::Violation(format!(
                    "unexpected {} during pin exchange",
                    other.kind()
                )))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
