//! Integration tests for the PIN authentication sub-protocol.
//!
//! # Purpose
//!
//! These tests run `pin::exchange` (and the receive-only `pin::receive`) on
//! one end of an in-memory WebSocket pair against a scripted peer on the
//! other end, message by message. They verify:
//!
//! - Completion bookkeeping: the exchange ends exactly when a PIN state has
//!   been received from the peer and the local requirement is satisfied,
//!   including the no-PIN fast paths.
//! - The mismatch contract: a wrong PIN is answered with exactly one
//!   `connectionPinError`, the verifying side still completes, and the
//!   presenting side fails with `PinMismatch` when the error reaches it.
//! - `PinUnavailable` when the peer requires a PIN and none is configured.
//! - The deadline covers the whole sub-protocol, not each message: a peer
//!   that stays just under the per-read limit still runs out of time.
//!
//! The deadline tests run on a paused clock, so the multi-second gaps cost
//! no wall time.

use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_test::assert_ok;
use tokio_tungstenite::{accept_async, client_async, WebSocketStream};

use ship_core::protocol::messages::{
    CmiType, ConnectionClose, ConnectionClosePhase, ConnectionPinError, ConnectionPinInput,
    ConnectionPinState, PinInputPermission, PinState, PIN_ERROR_WRONG_PIN,
};
use ship_core::Message;
use ship_session::{pin, SessionError, Transport};

// ── Harness ───────────────────────────────────────────────────────────────────

/// The deadline every spawned exchange runs under.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Installs a log subscriber when `RUST_LOG` is set; repeat calls are no-ops.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connects two WebSocket ends over an in-memory duplex pipe.
async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    init_logging();
    let (a_io, b_io) = tokio::io::duplex(64 * 1024);
    let accept = tokio::spawn(accept_async(b_io));
    let (a, _) = client_async("ws://local.test/session", a_io)
        .await
        .expect("client websocket handshake");
    let b = accept
        .await
        .expect("accept task")
        .expect("server websocket handshake");
    (a, b)
}

fn script_transport(ws: WebSocketStream<DuplexStream>) -> Transport<DuplexStream> {
    Transport::new(ws, Duration::from_secs(5), Duration::from_millis(100))
}

/// Runs the bidirectional exchange in its own task. The transport rides
/// along in the result so the pipe stays open for the scripted side's
/// post-completion assertions.
fn spawn_exchange(
    ws: WebSocketStream<DuplexStream>,
    local: &str,
    remote: &str,
) -> JoinHandle<(Result<(), SessionError>, Transport<DuplexStream>)> {
    let local = local.to_string();
    let remote = remote.to_string();
    tokio::spawn(async move {
        let mut side = Transport::new(ws, Duration::from_secs(30), Duration::from_millis(100));
        let result = pin::exchange(&mut side, &local, &remote, EXCHANGE_TIMEOUT).await;
        (result, side)
    })
}

fn spawn_receive(
    ws: WebSocketStream<DuplexStream>,
    local: &str,
) -> JoinHandle<(Result<(), SessionError>, Transport<DuplexStream>)> {
    let local = local.to_string();
    tokio::spawn(async move {
        let mut side = Transport::new(ws, Duration::from_secs(30), Duration::from_millis(100));
        let result = pin::receive(&mut side, &local, EXCHANGE_TIMEOUT).await;
        (result, side)
    })
}

// ── Scripted peer messages ────────────────────────────────────────────────────

fn pin_none() -> Message {
    Message::PinState(ConnectionPinState {
        pin_state: PinState::None,
        input_permission: None,
    })
}

fn pin_required() -> Message {
    Message::PinState(ConnectionPinState {
        pin_state: PinState::Required,
        input_permission: Some(PinInputPermission::Ok),
    })
}

fn pin_input(pin: &str) -> Message {
    Message::PinInput(ConnectionPinInput {
        pin: pin.to_string(),
    })
}

async fn send(script: &mut Transport<DuplexStream>, message: Message) {
    script
        .write_message(CmiType::Control, message)
        .await
        .expect("scripted send");
}

/// Asserts that nothing further arrives within a short window.
async fn assert_silence(script: &mut Transport<DuplexStream>) {
    let quiet = script
        .read_control_by(Instant::now() + Duration::from_millis(300))
        .await;
    assert!(
        matches!(quiet, Err(SessionError::Timeout)),
        "expected silence, got {quiet:?}"
    );
}

// ── Bidirectional exchange ────────────────────────────────────────────────────

/// With no PIN on either side the exchange is just the two announcements.
#[tokio::test]
async fn test_exchange_without_pins_completes_after_announcements() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "", "");
    let mut script = script_transport(ws_b);

    let announced = script.read_control().await.expect("announcement");
    let Message::PinState(state) = announced else {
        panic!("expected pin announcement, got {}", announced.kind());
    };
    assert_eq!(state.pin_state, PinState::None);
    assert_eq!(state.input_permission, None);

    send(&mut script, pin_none()).await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(result.is_ok(), "no-pin exchange should succeed: {result:?}");
}

/// A local PIN is announced as required, with input permitted.
#[tokio::test]
async fn test_local_pin_is_announced_as_required() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "123456", "");
    let mut script = script_transport(ws_b);

    let announced = script.read_control().await.expect("announcement");
    let Message::PinState(state) = announced else {
        panic!("expected pin announcement, got {}", announced.kind());
    };
    assert_eq!(state.pin_state, PinState::Required);
    assert_eq!(state.input_permission, Some(PinInputPermission::Ok));

    // Unblock the exchange and let the task end.
    send(&mut script, pin_none()).await;
    send(&mut script, pin_input("123456")).await;
    let (result, _keep) = task.await.expect("exchange task");
    tokio_test::assert_ok!(result);
}

/// A peer that requires a PIN we do not have ends the exchange.
#[tokio::test]
async fn test_peer_requirement_without_credential_is_unavailable() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_required()).await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(
        matches!(result, Err(SessionError::PinUnavailable)),
        "expected unavailable, got {result:?}"
    );
}

/// With no local PIN, presenting ours is all that is left to do.
#[tokio::test]
async fn test_empty_local_pin_completes_once_presented() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "", "9999");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_required()).await;

    let announced = script.read_control().await.expect("announcement");
    assert!(matches!(announced, Message::PinState(_)));
    let presented = script.read_control().await.expect("pin input");
    let Message::PinInput(input) = presented else {
        panic!("expected pin input, got {}", presented.kind());
    };
    assert_eq!(input.pin, "9999");

    let (result, _keep) = task.await.expect("exchange task");
    assert!(result.is_ok(), "presenting the pin completes: {result:?}");
}

/// A matching PIN is accepted without any error signal.
#[tokio::test]
async fn test_matching_pin_draws_no_error_signal() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_none()).await;
    send(&mut script, pin_input("1234")).await;

    let (result, _keep) = task.await.expect("exchange task");
    tokio_test::assert_ok!(result);

    // Drain the announcement, then nothing else may arrive.
    let announced = script.read_control().await.expect("announcement");
    assert!(matches!(announced, Message::PinState(_)));
    assert_silence(&mut script).await;
}

/// A wrong PIN draws exactly one error signal; the verifying side still
/// completes and leaves the reaction to the peer.
#[tokio::test]
async fn test_wrong_pin_is_signaled_once_and_verifier_completes() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_none()).await;
    send(&mut script, pin_input("0000")).await;

    let announced = script.read_control().await.expect("announcement");
    assert!(matches!(announced, Message::PinState(_)));

    let signal = script.read_control().await.expect("error signal");
    let Message::PinError(error) = signal else {
        panic!("expected pin error, got {}", signal.kind());
    };
    assert_eq!(error.error, PIN_ERROR_WRONG_PIN);

    let (result, _keep) = task.await.expect("exchange task");
    assert!(
        result.is_ok(),
        "mismatch alone does not end the exchange: {result:?}"
    );
    assert_silence(&mut script).await;
}

/// The presenting side fails once the peer rejects its PIN.
#[tokio::test]
async fn test_received_pin_error_fails_the_exchange() {
    let (ws_a, ws_b) = ws_pair().await;
    // A local PIN keeps the exchange waiting for the peer's input, so the
    // rejection arrives while the loop is still running.
    let task = spawn_exchange(ws_a, "5555", "1234");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_required()).await;

    let announced = script.read_control().await.expect("announcement");
    assert!(matches!(announced, Message::PinState(_)));
    let presented = script.read_control().await.expect("pin input");
    assert!(matches!(presented, Message::PinInput(_)));

    send(
        &mut script,
        Message::PinError(ConnectionPinError {
            error: PIN_ERROR_WRONG_PIN,
        }),
    )
    .await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(
        matches!(result, Err(SessionError::PinMismatch)),
        "expected mismatch, got {result:?}"
    );
}

/// A close announcement during the exchange surfaces as `PeerClosed`.
#[tokio::test]
async fn test_close_during_exchange_is_peer_closed() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    send(
        &mut script,
        Message::Close(ConnectionClose {
            phase: ConnectionClosePhase::Announce,
            max_time: Some(100),
            reason: None,
        }),
    )
    .await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(matches!(result, Err(SessionError::PeerClosed)));
}

/// Anything other than the PIN messages is a protocol violation.
#[tokio::test]
async fn test_unexpected_message_during_exchange_is_a_violation() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    send(
        &mut script,
        Message::AccessMethodsRequest(Default::default()),
    )
    .await;

    let (result, _keep) = task.await.expect("exchange task");
    match result {
        Err(SessionError::Violation(text)) => {
            assert!(text.contains("pin exchange"), "unexpected text: {text}");
        }
        other => panic!("expected violation, got {other:?}"),
    }
}

// ── Deadline behavior (paused clock) ──────────────────────────────────────────

/// The deadline spans the whole exchange. Two messages six seconds apart
/// each stay under the ten-second limit on their own, but the second lands
/// at twelve seconds and the exchange has already timed out.
#[tokio::test(start_paused = true)]
async fn test_deadline_bounds_the_whole_exchange() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    tokio::time::sleep(Duration::from_secs(6)).await;
    send(&mut script, pin_none()).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    send(&mut script, pin_input("1234")).await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(
        matches!(result, Err(SessionError::Timeout)),
        "expected timeout, got {result:?}"
    );
}

/// The same rhythm inside the limit completes, so the timeout above really
/// is the total-duration bound and not a harness artifact.
#[tokio::test(start_paused = true)]
async fn test_deadline_allows_prompt_completion() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_exchange(ws_a, "1234", "");
    let mut script = script_transport(ws_b);

    tokio::time::sleep(Duration::from_secs(3)).await;
    send(&mut script, pin_none()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    send(&mut script, pin_input("1234")).await;

    let (result, _keep) = task.await.expect("exchange task");
    assert!(result.is_ok(), "six seconds is inside the limit: {result:?}");
}

// ── Receive-only variant ──────────────────────────────────────────────────────

/// Without a local PIN the receive-only form announces and returns.
#[tokio::test]
async fn test_receive_without_local_pin_announces_and_returns() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_receive(ws_a, "");
    let mut script = script_transport(ws_b);

    let (result, _keep) = task.await.expect("receive task");
    assert!(result.is_ok(), "nothing to wait for: {result:?}");

    let announced = script.read_control().await.expect("announcement");
    let Message::PinState(state) = announced else {
        panic!("expected pin announcement, got {}", announced.kind());
    };
    assert_eq!(state.pin_state, PinState::None);
}

/// The receive-only form verifies inputs and signals mismatches the same
/// way as the full exchange.
#[tokio::test]
async fn test_receive_verifies_pin_after_mismatch() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_receive(ws_a, "1234");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_input("1111")).await;

    let announced = script.read_control().await.expect("announcement");
    assert!(matches!(announced, Message::PinState(_)));
    let signal = script.read_control().await.expect("error signal");
    let Message::PinError(error) = signal else {
        panic!("expected pin error, got {}", signal.kind());
    };
    assert_eq!(error.error, PIN_ERROR_WRONG_PIN);

    send(&mut script, pin_input("1234")).await;

    let (result, _keep) = task.await.expect("receive task");
    assert!(result.is_ok(), "second attempt matches: {result:?}");
}

/// A peer announcement is skipped; the receive-only side has nothing to
/// present.
#[tokio::test]
async fn test_receive_skips_peer_announcements() {
    let (ws_a, ws_b) = ws_pair().await;
    let task = spawn_receive(ws_a, "1234");
    let mut script = script_transport(ws_b);

    send(&mut script, pin_required()).await;
    send(&mut script, pin_input("1234")).await;

    let (result, _keep) = task.await.expect("receive task");
    assert!(result.is_ok(), "announcement is ignored: {result:?}");
}
