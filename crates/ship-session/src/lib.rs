//! # ship-session
//!
//! Session layer for SHIP-Link: the handshake state machine, the PIN
//! authentication sub-protocol, the steady-state message loop, and the
//! ordered close, all running over a WebSocket framed connection.
//!
//! A session brings two peers from "socket open" to "authenticated,
//! protocol-selected, ready for application messages" through five strictly
//! ordered phases:
//!
//! 1. connection-mode init (binary message, echoed byte for byte)
//! 2. hello (readiness exchange)
//! 3. protocol-format negotiation (announce, select, confirm)
//! 4. PIN authentication (each direction verified independently)
//! 5. access-methods exchange (endpoint identifiers)
//!
//! The responder role is [`ShipServer`]; the initiator role is
//! [`ShipClient`], which yields a [`ShipConnection`] once established. Both
//! are generic over the underlying byte stream, so tests run them over
//! in-memory pipes and applications over TCP or TLS.
//!
//! Any handshake failure triggers one best-effort ordered close before the
//! error is returned; a peer-initiated close during the message loop is
//! answered and reported as an orderly end, not a failure.

pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod pin;
pub mod server;
pub mod transport;

// Re-export the session-facing API at the crate root; the modules stay
// public for the lower-level pieces (Transport, the pin exchange).
pub use client::{ShipClient, ShipConnection};
pub use config::SessionConfig;
pub use error::SessionError;
pub use handshake::HandshakePhase;
pub use server::{MessageHandler, ShipServer};
pub use transport::Transport;
