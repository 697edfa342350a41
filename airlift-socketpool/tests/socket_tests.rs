//! Socket state machine tests against scripted co-processor replies.
//!
//! Each test wires a closure responder into a [`SimulatedBus`] so the exact
//! command sequence a socket operation produces can be asserted.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use airlift_link::frame::Request;
use airlift_link::simulator::{Reply, Responder, SimulatedBus, SimulatedPlatform};
use airlift_link::{opcode, LinkConfig, Radio};
use airlift_socketpool::{
    proto, AddressFamily, Emulator, PollConfig, Socket, SocketError, SocketPool, SocketState,
    SocketType, Timeout, BLOCK_FOREVER,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type SimPool<R> = SocketPool<SimulatedBus<R>, SimulatedPlatform>;
type SimSocket<R> = Socket<SimulatedBus<R>, SimulatedPlatform>;

fn pool<R: Responder>(responder: R) -> SimPool<R> {
    let radio = Radio::attach(
        SimulatedBus::new(responder),
        SimulatedPlatform::new(),
        LinkConfig::default(),
    );
    SocketPool::new(Rc::new(RefCell::new(radio)), PollConfig::default())
}

fn stream<R: Responder>(pool: &SimPool<R>) -> SimSocket<R> {
    pool.socket(AddressFamily::Inet, SocketType::Stream, proto::IPPROTO_TCP)
        .expect("allocate stream socket")
}

fn dgram<R: Responder>(pool: &SimPool<R>) -> SimSocket<R> {
    pool.socket(AddressFamily::Inet, SocketType::Dgram, proto::IPPROTO_UDP)
        .expect("allocate datagram socket")
}

fn opcodes<R: Responder>(pool: &SimPool<R>) -> Vec<u8> {
    pool.radio().borrow().bus().opcodes()
}

fn requests<R: Responder>(pool: &SimPool<R>) -> Vec<Request> {
    pool.radio().borrow().bus().requests().to_vec()
}

fn clear<R: Responder>(pool: &SimPool<R>) {
    pool.radio().borrow_mut().bus_mut().clear_requests();
}

fn slept<R: Responder>(pool: &SimPool<R>) -> u64 {
    pool.radio().borrow().platform().slept_ms()
}

/// Firmware that grants every command and never has data.
fn agreeable(req: &Request) -> Reply {
    match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::GET_DATABUF_TCP => Reply::Responses(vec![vec![]]),
        opcode::AVAIL_DATA_TCP => Reply::Responses(vec![vec![0, 0]]),
        _ => Reply::byte(1),
    }
}

// ---------------------------------------------------------------------------
// Test 1: non-blocking receive on an empty socket never sleeps
// ---------------------------------------------------------------------------

#[test]
fn test_nonblocking_recv_would_block_without_sleeping() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.set_timeout(Timeout::NonBlocking);

    let mut buf = [0u8; 300];
    for _ in 0..5 {
        assert!(matches!(sock.recv_into(&mut buf), Err(SocketError::WouldBlock)));
    }

    assert_eq!(slept(&pool), 0);
    let reads: Vec<Request> = requests(&pool)
        .into_iter()
        .filter(|r| r.opcode == opcode::GET_DATABUF_TCP)
        .collect();
    assert_eq!(reads.len(), 5);
    // Requested length goes out little-endian: 300 = 0x012C.
    assert_eq!(reads[0].param(0), &[0]);
    assert_eq!(reads[0].param(1), &[0x2C, 0x01]);
}

// ---------------------------------------------------------------------------
// Test 2: a blocking receive polls until data shows up
// ---------------------------------------------------------------------------

#[test]
fn test_blocking_recv_polls_until_data_arrives() {
    let mut empties = 4;
    let pool = pool(move |req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(2),
        opcode::GET_DATABUF_TCP if empties > 0 => {
            empties -= 1;
            Reply::Responses(vec![vec![]])
        }
        opcode::GET_DATABUF_TCP => Reply::Responses(vec![b"late".to_vec()]),
        _ => Reply::Error,
    });
    let mut sock = stream(&pool);
    assert_eq!(sock.timeout(), Timeout::Forever);

    let mut buf = [0u8; 16];
    let n = sock.recv_into(&mut buf).unwrap();

    assert_eq!(&buf[..n], b"late");
    assert_eq!(opcodes(&pool).len(), 1 + 5);
    assert_eq!(slept(&pool), 4 * 50);
}

// ---------------------------------------------------------------------------
// Test 3: a blocking receive gives up with 0 bytes on interrupt
// ---------------------------------------------------------------------------

#[test]
fn test_blocking_recv_returns_zero_on_interrupt() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.set_timeout_ms(BLOCK_FOREVER);
    pool.radio().borrow_mut().platform_mut().interrupt_after_yields(3);

    let mut buf = [0u8; 8];
    assert_eq!(sock.recv_into(&mut buf).unwrap(), 0);

    let reads = opcodes(&pool)
        .into_iter()
        .filter(|&op| op == opcode::GET_DATABUF_TCP)
        .count();
    assert_eq!(reads, 4);
}

// ---------------------------------------------------------------------------
// Test 4: a receive with a finite timeout returns 0 once it expires
// ---------------------------------------------------------------------------

#[test]
fn test_timed_recv_returns_zero_after_deadline() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.set_timeout_ms(120);

    let mut buf = [0u8; 8];
    assert_eq!(sock.recv_into(&mut buf).unwrap(), 0);
    assert_eq!(sock.timeout_ms(), 120);
    // Three idle rounds of 50 ms plus one yield each pass 120 ms.
    assert_eq!(slept(&pool), 150);
}

// ---------------------------------------------------------------------------
// Test 5: accept on a never-bound socket is unsupported in every state
// ---------------------------------------------------------------------------

#[test]
fn test_accept_without_bind_is_not_supported() {
    let pool = pool(agreeable);

    for kind in [SocketType::Stream, SocketType::Dgram, SocketType::Raw] {
        let mut sock = pool.socket(AddressFamily::Inet, kind, 0).unwrap();
        assert!(matches!(sock.accept(), Err(SocketError::NotSupported)), "{:?}", kind);
    }

    let mut client = stream(&pool);
    client.connect("10.0.0.1", 80).unwrap();
    assert!(matches!(client.accept(), Err(SocketError::NotSupported)));
    client.close().unwrap();
    assert!(matches!(client.accept(), Err(SocketError::NotSupported)));

    assert!(!opcodes(&pool).contains(&opcode::GET_STATE_TCP));
    assert!(!opcodes(&pool).contains(&opcode::AVAIL_DATA_TCP));
}

// ---------------------------------------------------------------------------
// Test 6: bind, listen and accept hand back the co-processor's handle
// ---------------------------------------------------------------------------

#[test]
fn test_accept_returns_socket_for_reported_handle() {
    let mut polls = 0;
    let pool = pool(move |req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::REQ_HOST_BY_NAME => Reply::byte(1),
        opcode::GET_HOST_BY_NAME => Reply::Responses(vec![vec![0, 0, 0, 0]]),
        opcode::START_SERVER_TCP => {
            assert_eq!(req.params, vec![vec![0, 0, 0, 0], vec![0x1F, 0x90], vec![0], vec![0]]);
            Reply::byte(1)
        }
        opcode::GET_STATE_TCP => Reply::byte(1),
        opcode::AVAIL_DATA_TCP => {
            polls += 1;
            let handle = if polls < 3 { 255 } else { 3 };
            Reply::Responses(vec![vec![handle, 0]])
        }
        _ => Reply::Error,
    });

    let mut server = stream(&pool);
    server.bind("0.0.0.0", 8080).unwrap();
    assert_eq!(server.state(), SocketState::Bound);
    server.listen(5).unwrap();
    assert_eq!(server.state(), SocketState::ServerActive);

    let conn = server.accept().unwrap();
    assert_eq!(conn.num(), 3);
    assert_eq!(conn.kind(), SocketType::Stream);
    assert_eq!(conn.state(), SocketState::ClientActive);
    assert_eq!(server.num(), 0);
    assert_eq!(server.state(), SocketState::ServerActive);

    assert_eq!(
        opcodes(&pool),
        vec![
            opcode::GET_SOCKET,
            opcode::REQ_HOST_BY_NAME,
            opcode::GET_HOST_BY_NAME,
            opcode::START_SERVER_TCP,
            opcode::GET_STATE_TCP,
            opcode::AVAIL_DATA_TCP,
            opcode::AVAIL_DATA_TCP,
            opcode::AVAIL_DATA_TCP,
        ]
    );
    assert_eq!(slept(&pool), 2 * 50);
}

// ---------------------------------------------------------------------------
// Test 7: accept distinguishes would-block from timed-out
// ---------------------------------------------------------------------------

#[test]
fn test_accept_would_block_and_timeout() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(1),
        opcode::REQ_HOST_BY_NAME => Reply::byte(1),
        opcode::GET_HOST_BY_NAME => Reply::Responses(vec![vec![0, 0, 0, 0]]),
        opcode::AVAIL_DATA_TCP => Reply::Responses(vec![vec![255, 0]]),
        _ => Reply::byte(1),
    });
    let mut server = stream(&pool);
    server.bind("0.0.0.0", 80).unwrap();

    // Bound but never listening.
    assert!(matches!(server.accept(), Err(SocketError::NotConnected)));

    server.listen(1).unwrap();
    server.set_timeout(Timeout::NonBlocking);
    let err = server.accept().unwrap_err();
    assert!(matches!(err, SocketError::WouldBlock));
    assert_eq!(err.errno(), -11);

    server.set_timeout(Timeout::Millis(200));
    let err = server.accept().unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.errno(), -110);
}

// ---------------------------------------------------------------------------
// Test 8: accept reports not-connected when the server is gone
// ---------------------------------------------------------------------------

#[test]
fn test_accept_requires_running_server() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::GET_HOST_BY_NAME => Reply::Responses(vec![vec![0, 0, 0, 0]]),
        opcode::GET_STATE_TCP => Reply::byte(0),
        _ => Reply::byte(1),
    });
    let mut server = stream(&pool);
    server.bind("0.0.0.0", 80).unwrap();
    server.listen(1).unwrap();

    assert!(matches!(server.accept(), Err(SocketError::NotConnected)));
    assert!(!opcodes(&pool).contains(&opcode::AVAIL_DATA_TCP));
}

// ---------------------------------------------------------------------------
// Test 9: closing twice talks to the co-processor once
// ---------------------------------------------------------------------------

#[test]
fn test_close_is_idempotent() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.connect("example.com", 80).unwrap();

    sock.close().unwrap();
    let after_first = opcodes(&pool);
    assert_eq!(after_first.last(), Some(&opcode::STOP_CLIENT_TCP));
    assert_eq!(sock.state(), SocketState::Stopped);

    sock.close().unwrap();
    drop(sock);
    assert_eq!(opcodes(&pool), after_first);
}

// ---------------------------------------------------------------------------
// Test 10: close failures are swallowed only during shutdown
// ---------------------------------------------------------------------------

#[test]
fn test_close_failure_suppressed_when_not_running() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::STOP_CLIENT_TCP => Reply::byte(0),
        _ => Reply::byte(1),
    });
    let mut sock = stream(&pool);
    sock.connect("10.0.0.1", 80).unwrap();

    assert!(matches!(sock.close(), Err(SocketError::Failed)));
    assert_eq!(sock.state(), SocketState::ClientActive);

    pool.radio().borrow_mut().platform_mut().set_running(false);
    sock.close().unwrap();
    assert_eq!(sock.state(), SocketState::Stopped);
}

// ---------------------------------------------------------------------------
// Test 11: binding to an address that is not ours fails
// ---------------------------------------------------------------------------

#[test]
fn test_bind_rejects_foreign_addresses() {
    let own = Ipv4Addr::new(192, 168, 1, 50);
    let emulator = Emulator::new().with_address(
        own,
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 1, 1),
    );
    let pool = pool(emulator);
    let mut rng = StdRng::seed_from_u64(0xA1F7);
    let mut sock = stream(&pool);

    for _ in 0..25 {
        let ip = Ipv4Addr::from(rng.random::<u32>());
        if ip == own || ip.is_unspecified() {
            continue;
        }
        let err = sock.bind(&ip.to_string(), rng.random()).unwrap_err();
        assert!(matches!(err, SocketError::AddrNotAvailable), "{ip}: {err:?}");
        assert_eq!(err.errno(), -99);
        assert_eq!(sock.state(), SocketState::Allocated);
    }

    sock.bind(&own.to_string(), 8080).unwrap();
    assert_eq!(sock.local_endpoint().map(|ep| ep.port), Some(8080));
}

// ---------------------------------------------------------------------------
// Test 12: bind and listen argument checks
// ---------------------------------------------------------------------------

#[test]
fn test_bind_and_listen_preconditions() {
    let pool = pool(Emulator::new());

    let mut sock = stream(&pool);
    assert!(matches!(sock.listen(1), Err(SocketError::NotSupported)));
    assert!(matches!(sock.bind("no.such.host", 80), Err(SocketError::NameNotResolved)));
    sock.bind("0.0.0.0", 80).unwrap();
    assert!(matches!(sock.bind("0.0.0.0", 81), Err(SocketError::InvalidArgument(_))));

    sock.listen(1).unwrap();
    clear(&pool);
    sock.listen(1).unwrap();
    assert!(opcodes(&pool).is_empty(), "second listen must not restart the server");
    assert!(matches!(sock.connect("10.0.0.1", 80), Err(SocketError::InUse)));

    let mut udp = dgram(&pool);
    udp.bind("0.0.0.0", 5353).unwrap();
    assert!(matches!(udp.listen(1), Err(SocketError::NotSupported)));
}

// ---------------------------------------------------------------------------
// Test 13: sendto on a fresh datagram socket is exactly three commands
// ---------------------------------------------------------------------------

#[test]
fn test_sendto_issues_start_insert_send() {
    let pool = pool(agreeable);
    let mut sock = dgram(&pool);
    clear(&pool);

    assert_eq!(sock.sendto(b"hello", "10.1.2.3", 5000).unwrap(), 5);

    let reqs = requests(&pool);
    assert_eq!(
        reqs.iter().map(|r| r.opcode).collect::<Vec<_>>(),
        vec![opcode::START_CLIENT_TCP, opcode::INSERT_DATABUF_TCP, opcode::SEND_UDP_DATA]
    );
    assert_eq!(
        reqs[0].params,
        vec![b"10.1.2.3".to_vec(), vec![0; 4], vec![0x13, 0x88], vec![0], vec![1]]
    );
    assert_eq!(reqs[1].params, vec![vec![0], b"hello".to_vec()]);
    assert_eq!(reqs[2].params, vec![vec![0]]);

    // Same peer again: no restart.
    clear(&pool);
    sock.sendto(b"again", "10.1.2.3", 5000).unwrap();
    assert_eq!(opcodes(&pool), vec![opcode::INSERT_DATABUF_TCP, opcode::SEND_UDP_DATA]);
}

// ---------------------------------------------------------------------------
// Test 14: sendto fails if any of its three steps is rejected
// ---------------------------------------------------------------------------

#[test]
fn test_sendto_fails_on_any_rejected_step() {
    for failing in [opcode::START_CLIENT_TCP, opcode::INSERT_DATABUF_TCP, opcode::SEND_UDP_DATA] {
        let pool = pool(move |req: &Request| match req.opcode {
            opcode::GET_SOCKET => Reply::byte(0),
            op if op == failing => Reply::byte(0),
            _ => Reply::byte(1),
        });
        let mut sock = dgram(&pool);
        let err = sock.sendto(b"x", "10.1.2.3", 5000).unwrap_err();
        assert!(matches!(err, SocketError::Failed), "{failing:#04x}: {err:?}");
    }
}

// ---------------------------------------------------------------------------
// Test 15: reconnecting only restarts for a different peer
// ---------------------------------------------------------------------------

#[test]
fn test_connect_same_peer_is_noop() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.connect("Example.com", 443).unwrap();
    clear(&pool);

    sock.connect("example.COM", 443).unwrap();
    assert!(opcodes(&pool).is_empty());

    sock.connect("example.org", 443).unwrap();
    assert_eq!(opcodes(&pool), vec![opcode::STOP_CLIENT_TCP, opcode::START_CLIENT_TCP]);

    clear(&pool);
    sock.connect_tls("example.org", 443).unwrap();
    let reqs = requests(&pool);
    assert_eq!(reqs.last().map(|r| r.param(4)), Some(&[2u8][..]));
}

// ---------------------------------------------------------------------------
// Test 16: stream send returns the little-endian count from the co-processor
// ---------------------------------------------------------------------------

#[test]
fn test_stream_send_count_is_little_endian() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::SEND_DATA_TCP => Reply::Responses(vec![vec![0x2C, 0x01]]),
        _ => Reply::byte(1),
    });
    let mut sock = stream(&pool);

    assert!(matches!(sock.send(b"early"), Err(SocketError::NotConnected)));
    sock.connect("10.0.0.2", 80).unwrap();

    let payload = vec![0x5A; 400];
    assert_eq!(sock.send(&payload).unwrap(), 300);

    let reqs = requests(&pool);
    let send = reqs.last().unwrap();
    assert_eq!(send.opcode, opcode::SEND_DATA_TCP);
    assert_eq!(send.param(1).len(), 400);
}

// ---------------------------------------------------------------------------
// Test 17: raw sockets allocate but cannot carry data
// ---------------------------------------------------------------------------

#[test]
fn test_raw_socket_operations_not_supported() {
    let pool = pool(agreeable);
    let mut raw = pool.socket(AddressFamily::Inet, SocketType::Raw, 0).unwrap();
    let mut buf = [0u8; 4];

    assert!(matches!(raw.connect("10.0.0.1", 1), Err(SocketError::NotSupported)));
    assert!(matches!(raw.send(b"x"), Err(SocketError::NotSupported)));
    assert!(matches!(raw.recv_into(&mut buf), Err(SocketError::NotSupported)));
    assert!(matches!(raw.sendto(b"x", "10.0.0.1", 1), Err(SocketError::NotSupported)));
}

// ---------------------------------------------------------------------------
// Test 18: allocation failures
// ---------------------------------------------------------------------------

#[test]
fn test_allocation_failures() {
    let exhausted = pool(|_: &Request| Reply::byte(255));
    let err = exhausted
        .socket(AddressFamily::Inet, SocketType::Stream, 0)
        .unwrap_err();
    assert!(matches!(err, SocketError::OutOfSockets));

    let mute = pool(|_: &Request| Reply::empty());
    let err = mute.socket(AddressFamily::Inet, SocketType::Stream, 0).unwrap_err();
    assert!(matches!(err, SocketError::Failed));
}

// ---------------------------------------------------------------------------
// Test 19: connection status follows the role
// ---------------------------------------------------------------------------

#[test]
fn test_status_queries_follow_role() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::GET_CLIENT_STATE_TCP => Reply::byte(4),
        opcode::GET_STATE_TCP => Reply::byte(1),
        opcode::GET_HOST_BY_NAME => Reply::Responses(vec![vec![0, 0, 0, 0]]),
        _ => Reply::byte(1),
    });

    let mut idle = stream(&pool);
    clear(&pool);
    assert!(!idle.is_connected().unwrap());
    assert!(!idle.is_closed().unwrap());
    assert!(opcodes(&pool).is_empty());

    let mut client = stream(&pool);
    client.connect("10.0.0.3", 80).unwrap();
    assert!(client.is_connected().unwrap());
    assert!(!client.is_closed().unwrap());

    let mut server = stream(&pool);
    server.bind("0.0.0.0", 80).unwrap();
    server.listen(1).unwrap();
    clear(&pool);
    assert!(server.is_connected().unwrap());
    assert!(!server.is_closed().unwrap());
    assert_eq!(opcodes(&pool), vec![opcode::GET_STATE_TCP, opcode::GET_STATE_TCP]);
}

// ---------------------------------------------------------------------------
// Test 20: peer address decodes big-endian ports; port 0 means no peer
// ---------------------------------------------------------------------------

#[test]
fn test_peer_address() {
    let mut answers = vec![
        vec![vec![0, 0, 0, 0], vec![0, 0]],
        vec![vec![10, 0, 0, 9], vec![0x13, 0x88]],
    ]
    .into_iter();
    let pool = pool(move |req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::GET_REMOTE_DATA => Reply::Responses(answers.next().unwrap_or_default()),
        _ => Reply::Error,
    });
    let mut sock = dgram(&pool);

    assert_eq!(sock.peer_address().unwrap(), None);
    assert_eq!(
        sock.peer_address().unwrap(),
        Some(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 5000))
    );
    assert!(matches!(sock.peer_address(), Err(SocketError::Failed)));
}

// ---------------------------------------------------------------------------
// Test 21: raw timeout sentinels
// ---------------------------------------------------------------------------

#[test]
fn test_timeout_sentinels() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);

    assert_eq!(sock.timeout_ms(), BLOCK_FOREVER);
    sock.set_timeout_ms(0);
    assert_eq!(sock.timeout(), Timeout::NonBlocking);
    sock.set_timeout_ms(250);
    assert_eq!(sock.timeout(), Timeout::Millis(250));
    sock.set_timeout_ms(u32::MAX);
    assert_eq!(sock.timeout(), Timeout::Forever);
}

// ---------------------------------------------------------------------------
// Test 22: dropping an open client stops it on the co-processor
// ---------------------------------------------------------------------------

#[test]
fn test_drop_stops_active_client() {
    let pool = pool(agreeable);
    {
        let mut sock = stream(&pool);
        sock.connect("10.0.0.1", 80).unwrap();
        clear(&pool);
    }
    assert_eq!(opcodes(&pool), vec![opcode::STOP_CLIENT_TCP]);
}

// ---------------------------------------------------------------------------
// Test 23: operations on a closed socket
// ---------------------------------------------------------------------------

#[test]
fn test_closed_socket_rejects_io() {
    let pool = pool(agreeable);
    let mut sock = stream(&pool);
    sock.close().unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(sock.recv_into(&mut buf), Err(SocketError::Closed)));
    assert!(matches!(sock.send(b"x"), Err(SocketError::Closed)));
    assert!(matches!(sock.connect("10.0.0.1", 80), Err(SocketError::Closed)));
    assert!(matches!(sock.bind("0.0.0.0", 80), Err(SocketError::Closed)));
    assert_eq!(SocketError::Closed.errno(), -9);
}

// ---------------------------------------------------------------------------
// Test 24: available bytes on a client, unsupported on a server
// ---------------------------------------------------------------------------

#[test]
fn test_available() {
    let pool = pool(|req: &Request| match req.opcode {
        opcode::GET_SOCKET => Reply::byte(0),
        opcode::AVAIL_DATA_TCP => Reply::Responses(vec![vec![0x00, 0x02]]),
        opcode::GET_HOST_BY_NAME => Reply::Responses(vec![vec![0, 0, 0, 0]]),
        _ => Reply::byte(1),
    });
    let mut client = stream(&pool);
    client.connect("10.0.0.1", 80).unwrap();
    assert_eq!(client.available().unwrap(), 512);

    let mut server = stream(&pool);
    server.bind("0.0.0.0", 80).unwrap();
    server.listen(1).unwrap();
    assert!(matches!(server.available(), Err(SocketError::NotSupported)));
}
