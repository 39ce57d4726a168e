//! Session configuration.
//!
//! `SessionConfig` derives `serde`, so applications embed it in their own
//! TOML configuration files. Every field has a default; an absent or empty
//! `[session]` table yields a working configuration with no PIN protection.
//!
//! Timeouts are stored in milliseconds so the TOML stays plain integers;
//! the `*_timeout()` accessors hand out [`Duration`]s for the timer calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one session endpoint, either role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// PIN the peer must present before the session is established.
    /// Empty disables the requirement.
    #[serde(default)]
    pub local_pin: String,
    /// PIN presented to the peer if it requires one. Empty means a peer
    /// requirement cannot be satisfied and the handshake fails.
    #[serde(default)]
    pub remote_pin: String,
    /// Identifier announced during the access-methods exchange.
    #[serde(default = "default_access_id")]
    pub access_id: String,
    /// Bound for a single handshake read, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Bound for the whole hello exchange, in milliseconds. Also announced
    /// to the peer as the `waiting` duration.
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,
    /// Bound for the whole PIN exchange, in milliseconds.
    #[serde(default = "default_pin_timeout_ms")]
    pub pin_timeout_ms: u64,
    /// How long a close initiator waits for the peer's confirmation before
    /// releasing the connection anyway, in milliseconds.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_access_id() -> String {
    "ship-link".to_string()
}
fn default_read_timeout_ms() -> u64 {
    10_000
}
fn default_hello_timeout_ms() -> u64 {
    60_000
}
fn default_pin_timeout_ms() -> u64 {
    10_000
}
fn default_close_timeout_ms() -> u64 {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_pin: String::new(),
            remote_pin: String::new(),
            access_id: default_access_id(),
            read_timeout_ms: default_read_timeout_ms(),
            hello_timeout_ms: default_hello_timeout_ms(),
            pin_timeout_ms: default_pin_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Bound for a single handshake read.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Bound for the whole hello exchange.
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }

    /// Bound for the whole PIN exchange.
    pub fn pin_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_timeout_ms)
    }

    /// How long a close initiator waits for the peer's confirmation.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
