//! Socket lifecycle types.
//!
//! ```text
//!   UNALLOCATED ──socket()──▶ ALLOCATED ──bind()──▶ BOUND
//!                                │                    │
//!                           connect()            listen()│connect()
//!                                ▼                    ▼
//!                          CLIENT_ACTIVE        SERVER_ACTIVE
//!                                │                    │
//!                             close()              close()
//!                                ▼                    ▼
//!                             STOPPED    STOPPED (server keeps running
//!                                         on the co-processor)
//! ```
//!
//! The co-processor has no "stop server" command, so a started server
//! permanently occupies its socket slot.

use std::fmt;

/// Address families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressFamily {
    Inet = 2,
}

/// Socket types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketType {
    Stream = 1,
    Dgram = 2,
    Raw = 3,
}

/// Protocol numbers.
pub mod proto {
    pub const IPPROTO_IP: u8 = 0;
    pub const IPPROTO_TCP: u8 = 6;
    pub const IPPROTO_UDP: u8 = 17;
}

/// Where a socket is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Allocated,
    Bound,
    ClientActive,
    ServerActive,
    Stopped,
}

/// TCP state of a client socket as reported by the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Unknown(u8),
}

impl From<u8> for TcpState {
    fn from(raw: u8) -> Self {
        match raw {
            0 => TcpState::Closed,
            1 => TcpState::Listen,
            2 => TcpState::SynSent,
            3 => TcpState::SynReceived,
            4 => TcpState::Established,
            5 => TcpState::FinWait1,
            6 => TcpState::FinWait2,
            7 => TcpState::CloseWait,
            8 => TcpState::Closing,
            9 => TcpState::LastAck,
            10 => TcpState::TimeWait,
            other => TcpState::Unknown(other),
        }
    }
}

/// Host and port as given by the caller.  The host may be a name or a
/// dotted quad; it is not resolved locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// Same host (case-insensitive) and port.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Role the co-processor has been told this socket plays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    Idle,
    /// `peer` is `None` for sockets produced by accept.
    Client { peer: Option<Endpoint> },
    Server,
}

/// Meaning of an `AVAIL_DATA_TCP` reply, which depends on the socket's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    /// Client or datagram socket: bytes waiting to be read.
    Bytes(u16),
    /// Server socket: handle of an incoming connection, if any.
    Connection(Option<u8>),
}
