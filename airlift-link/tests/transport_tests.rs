//! Integration tests for the transaction executor.
//!
//! Every test drives a [`Transport`] against the wire-level simulator on a
//! virtual clock, so timeouts elapse instantly and deterministically.

use airlift_link::bus::Bus;
use airlift_link::frame::{Command, Request};
use airlift_link::simulator::{
    Reply, Responder, ScriptedResponder, SimulatedBus, SimulatedPlatform, SimulatorConfig,
};
use airlift_link::{opcode, FrameError, LinkConfig, LinkError, Platform, Transport};

type SimTransport<R> = Transport<SimulatedBus<R>, SimulatedPlatform>;

fn transport<R: Responder>(responder: R) -> SimTransport<R> {
    Transport::new(
        SimulatedBus::new(responder),
        SimulatedPlatform::new(),
        LinkConfig::default(),
    )
}

fn get_socket<R: Responder>(t: &mut SimTransport<R>, timeout_ms: u32) -> Result<Option<u8>, LinkError> {
    let mut num = [0u8; 1];
    let lengths = t.call(&Command::new(opcode::GET_SOCKET, &[]), &mut [&mut num[..]], timeout_ms)?;
    Ok(lengths.first().map(|_| num[0]))
}

fn assert_released<R: Responder>(t: &SimTransport<R>) {
    assert!(!t.bus().has_lock(), "bus lock still held");
    assert!(!t.bus().cs_asserted(), "chip select still asserted");
}

// ---------------------------------------------------------------------------
// Test 1: a command and its reply take two transactions
// ---------------------------------------------------------------------------

#[test]
fn test_call_round_trip() {
    let mut t = transport(|req: &Request| {
        assert_eq!(req.opcode, opcode::GET_SOCKET);
        assert!(req.params.is_empty());
        Reply::byte(3)
    });

    assert_eq!(get_socket(&mut t, 1000).unwrap(), Some(3));
    assert_eq!(t.bus().transactions(), 2);
    assert_eq!(t.bus().configured(), Some((8_000_000, 0, 0, 8)));
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 2: ready never goes low → timeout, bus released, for any timeout
// ---------------------------------------------------------------------------

#[test]
fn test_busy_coprocessor_times_out_and_releases_bus() {
    for timeout in [1u32, 5, 250, 1000] {
        let mut t = transport(ScriptedResponder::default());
        t.bus_mut().set_stuck_busy(true);

        let start = t.platform().now_ms();
        let err = t.begin_transaction(timeout).unwrap_err();
        assert!(matches!(err, LinkError::ReadyTimeout { high: false }), "{err}");
        assert!(err.is_timeout());
        assert!(t.platform().now_ms() - start >= timeout as u64);
        assert_released(&t);
    }
}

// ---------------------------------------------------------------------------
// Test 3: chip select never acknowledged → timeout waiting for ready high
// ---------------------------------------------------------------------------

#[test]
fn test_missing_ack_times_out_and_releases_bus() {
    let mut t = transport(ScriptedResponder::default());
    t.bus_mut().set_no_ack(true);

    let err = get_socket(&mut t, 1000).unwrap_err();
    assert!(matches!(err, LinkError::ReadyTimeout { high: true }));
    assert_eq!(err.to_string(), "timeout waiting for ready high");
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 4: rejected command surfaces as a remote error
// ---------------------------------------------------------------------------

#[test]
fn test_error_reply_is_remote_error() {
    let mut t = transport(ScriptedResponder::new([Reply::Error]));
    let err = get_socket(&mut t, 1000).unwrap_err();
    assert!(matches!(err, LinkError::Frame(FrameError::RemoteError)));
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 5: no start byte after ten reads with 10 ms between them
// ---------------------------------------------------------------------------

#[test]
fn test_silent_coprocessor_gives_up_after_bounded_retries() {
    let mut t = transport(ScriptedResponder::new([Reply::Silent]));
    let err = get_socket(&mut t, 1000).unwrap_err();
    assert!(matches!(err, LinkError::Frame(FrameError::MissingStart)));
    assert_eq!(t.platform().slept_ms(), 9 * 10);
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 6: torn-down bus yields zero responses and no traffic
// ---------------------------------------------------------------------------

#[test]
fn test_deinited_bus_reports_no_responses() {
    let mut t = transport(ScriptedResponder::new([Reply::byte(1)]));
    t.bus_mut().set_deinited(true);

    assert_eq!(get_socket(&mut t, 1000).unwrap(), None);
    assert_eq!(t.bus().transactions(), 0);
    assert!(t.bus().requests().is_empty());
}

// ---------------------------------------------------------------------------
// Test 7: contended lock is retried with yields in between
// ---------------------------------------------------------------------------

#[test]
fn test_lock_contention_is_spun_through() {
    let config = SimulatorConfig {
        lock_contention: 25,
        ..Default::default()
    };
    let mut t = Transport::new(
        SimulatedBus::with_config(ScriptedResponder::new([Reply::byte(0)]), config),
        SimulatedPlatform::new(),
        LinkConfig::default(),
    );

    assert_eq!(get_socket(&mut t, 1000).unwrap(), Some(0));
    assert!(t.platform().yields() >= 25);
}

// ---------------------------------------------------------------------------
// Test 8: user interrupt while spinning on the lock
// ---------------------------------------------------------------------------

#[test]
fn test_interrupt_while_waiting_for_lock() {
    let config = SimulatorConfig {
        lock_contention: u32::MAX,
        ..Default::default()
    };
    let mut t = Transport::new(
        SimulatedBus::with_config(ScriptedResponder::default(), config),
        SimulatedPlatform::new(),
        LinkConfig::default(),
    );
    t.platform_mut().interrupt_after_yields(5);

    let err = get_socket(&mut t, 1000).unwrap_err();
    assert!(matches!(err, LinkError::Interrupted));
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 9: random processing delays never break framing
// ---------------------------------------------------------------------------

#[test]
fn test_busy_jitter_is_absorbed() {
    let config = SimulatorConfig {
        busy_rate: 0.5,
        max_busy_polls: 40,
        seed: 0xA1F7,
        ..Default::default()
    };
    let mut counter = 0u8;
    let responder = move |_: &Request| {
        counter = counter.wrapping_add(1);
        Reply::byte(counter)
    };
    let mut t = Transport::new(
        SimulatedBus::with_config(responder, config),
        SimulatedPlatform::new(),
        LinkConfig::default(),
    );

    for expected in 1..=50u8 {
        assert_eq!(get_socket(&mut t, 1000).unwrap(), Some(expected));
    }
    assert_released(&t);
}

// ---------------------------------------------------------------------------
// Test 10: request parameters arrive intact, padded frames decode cleanly
// ---------------------------------------------------------------------------

#[test]
fn test_params_reach_coprocessor() {
    let mut t = transport(ScriptedResponder::new([Reply::byte(1)]));
    let payload = vec![0x42u8; 300];
    let cmd = [&[2u8][..], &payload[..]];

    let mut status = [0u8; 1];
    t.call(
        &Command::new(opcode::INSERT_DATABUF_TCP, &cmd),
        &mut [&mut status[..]],
        1000,
    )
    .unwrap();

    let req = &t.bus().requests()[0];
    assert_eq!(req.opcode, opcode::INSERT_DATABUF_TCP);
    assert_eq!(req.param(0), &[2]);
    assert_eq!(req.param(1), payload.as_slice());
    assert_eq!(status, [1]);
}
