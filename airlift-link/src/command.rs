//! Command vocabulary shared by the host and the co-processor.
//!
//! Every exchange on the link is a request frame carrying one opcode and a
//! list of length-prefixed parameters, answered by a reply frame echoing the
//! opcode with [`REPLY_FLAG`] set.  This module holds the marker bytes, the
//! opcode table, and the per-command length-prefix widths.  It performs no
//! I/O.

/// First byte of every request and successful reply.
pub const START_BYTE: u8 = 0xE0;
/// Last byte of every reply.
pub const END_BYTE: u8 = 0xEE;
/// Sent by the co-processor in place of [`START_BYTE`] when it rejects a command.
pub const ERROR_BYTE: u8 = 0xEF;
/// OR-ed into the opcode of every reply.
pub const REPLY_FLAG: u8 = 0x80;
/// Request opcodes are 7-bit; the top bit is reserved for [`REPLY_FLAG`].
pub const OPCODE_MASK: u8 = 0x7F;

/// Socket handle reported by the co-processor when none is available.
pub const NO_SOCKET: u8 = 255;
/// Byte length of an IPv4 address on the wire.
pub const IPV4_LENGTH: usize = 4;
/// Longest hostname the firmware accepts.
pub const MAX_HOSTNAME_LENGTH: usize = 255;
/// Request frames are zero-padded to a multiple of this many bytes.
pub const FRAME_ALIGN: usize = 4;

/// Opcodes understood by NINA-FW style firmware.
pub mod opcode {
    pub const SET_NET: u8 = 0x10;
    pub const SET_PASSPHRASE: u8 = 0x11;
    pub const SET_IP_CONFIG: u8 = 0x14;
    pub const SET_DNS_CONFIG: u8 = 0x15;
    pub const SET_HOSTNAME: u8 = 0x16;
    pub const SET_POWER_MODE: u8 = 0x17;

    pub const GET_DNS_CONFIG: u8 = 0x1E;
    pub const GET_CONN_STATUS: u8 = 0x20;
    pub const GET_IPADDR: u8 = 0x21;
    pub const GET_MACADDR: u8 = 0x22;
    pub const GET_CURR_SSID: u8 = 0x23;
    pub const GET_CURR_BSSID: u8 = 0x24;
    pub const GET_CURR_RSSI: u8 = 0x25;
    pub const GET_CURR_ENCT: u8 = 0x26;

    pub const SCAN_NETWORKS: u8 = 0x27;
    pub const START_SERVER_TCP: u8 = 0x28;
    /// Despite the name this reports whether a server exists on the socket.
    pub const GET_STATE_TCP: u8 = 0x29;
    pub const DATA_SENT_TCP: u8 = 0x2A;
    /// Byte count on a client socket, pending connection handle on a server.
    pub const AVAIL_DATA_TCP: u8 = 0x2B;
    pub const GET_DATA_TCP: u8 = 0x2C;
    pub const START_CLIENT_TCP: u8 = 0x2D;
    pub const STOP_CLIENT_TCP: u8 = 0x2E;
    pub const GET_CLIENT_STATE_TCP: u8 = 0x2F;
    pub const DISCONNECT: u8 = 0x30;
    /// Per-network queries after `SCAN_NETWORKS`, indexed by scan position.
    pub const GET_IDX_RSSI: u8 = 0x32;
    pub const GET_IDX_ENCT: u8 = 0x33;

    pub const REQ_HOST_BY_NAME: u8 = 0x34;
    pub const GET_HOST_BY_NAME: u8 = 0x35;
    pub const START_SCAN_NETWORKS: u8 = 0x36;
    pub const GET_FW_VERSION: u8 = 0x37;
    pub const SEND_UDP_DATA: u8 = 0x39;
    pub const GET_REMOTE_DATA: u8 = 0x3A;
    pub const GET_IDX_BSSID: u8 = 0x3C;
    pub const GET_IDX_CHAN: u8 = 0x3D;
    pub const PING: u8 = 0x3E;
    pub const GET_SOCKET: u8 = 0x3F;

    pub const SEND_DATA_TCP: u8 = 0x44;
    pub const GET_DATABUF_TCP: u8 = 0x45;
    pub const INSERT_DATABUF_TCP: u8 = 0x46;
}

/// Human-readable opcode name for log lines.
pub fn opcode_name(op: u8) -> &'static str {
    use opcode::*;
    match op & OPCODE_MASK {
        SET_NET => "SET_NET",
        SET_PASSPHRASE => "SET_PASSPHRASE",
        SET_IP_CONFIG => "SET_IP_CONFIG",
        SET_DNS_CONFIG => "SET_DNS_CONFIG",
        SET_HOSTNAME => "SET_HOSTNAME",
        SET_POWER_MODE => "SET_POWER_MODE",
        GET_DNS_CONFIG => "GET_DNS_CONFIG",
        GET_CONN_STATUS => "GET_CONN_STATUS",
        GET_IPADDR => "GET_IPADDR",
        GET_MACADDR => "GET_MACADDR",
        GET_CURR_SSID => "GET_CURR_SSID",
        GET_CURR_BSSID => "GET_CURR_BSSID",
        GET_CURR_RSSI => "GET_CURR_RSSI",
        GET_CURR_ENCT => "GET_CURR_ENCT",
        SCAN_NETWORKS => "SCAN_NETWORKS",
        START_SERVER_TCP => "START_SERVER_TCP",
        GET_STATE_TCP => "GET_STATE_TCP",
        DATA_SENT_TCP => "DATA_SENT_TCP",
        AVAIL_DATA_TCP => "AVAIL_DATA_TCP",
        GET_DATA_TCP => "GET_DATA_TCP",
        START_CLIENT_TCP => "START_CLIENT_TCP",
        STOP_CLIENT_TCP => "STOP_CLIENT_TCP",
        GET_CLIENT_STATE_TCP => "GET_CLIENT_STATE_TCP",
        DISCONNECT => "DISCONNECT",
        GET_IDX_RSSI => "GET_IDX_RSSI",
        GET_IDX_ENCT => "GET_IDX_ENCT",
        REQ_HOST_BY_NAME => "REQ_HOST_BY_NAME",
        GET_HOST_BY_NAME => "GET_HOST_BY_NAME",
        START_SCAN_NETWORKS => "START_SCAN_NETWORKS",
        GET_FW_VERSION => "GET_FW_VERSION",
        SEND_UDP_DATA => "SEND_UDP_DATA",
        GET_REMOTE_DATA => "GET_REMOTE_DATA",
        GET_IDX_BSSID => "GET_IDX_BSSID",
        GET_IDX_CHAN => "GET_IDX_CHAN",
        PING => "PING",
        GET_SOCKET => "GET_SOCKET",
        SEND_DATA_TCP => "SEND_DATA_TCP",
        GET_DATABUF_TCP => "GET_DATABUF_TCP",
        INSERT_DATABUF_TCP => "INSERT_DATABUF_TCP",
        _ => "UNKNOWN",
    }
}

// ---------------------------------------------------------------------------
// Length-prefix widths
// ---------------------------------------------------------------------------

/// Width of the length prefix in front of each parameter or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    /// One-byte length, values up to 255.
    Eight,
    /// Two-byte big-endian length, values up to 65535.
    Sixteen,
}

impl LengthWidth {
    /// Number of bytes the prefix itself occupies.
    pub fn prefix_len(self) -> usize {
        match self {
            LengthWidth::Eight => 1,
            LengthWidth::Sixteen => 2,
        }
    }

    /// Largest length the prefix can express.
    pub fn max_len(self) -> usize {
        match self {
            LengthWidth::Eight => u8::MAX as usize,
            LengthWidth::Sixteen => u16::MAX as usize,
        }
    }
}

/// Parameter length width declared for `op`.
pub fn param_width(op: u8) -> LengthWidth {
    match op & OPCODE_MASK {
        opcode::SEND_DATA_TCP | opcode::INSERT_DATABUF_TCP | opcode::GET_DATABUF_TCP => {
            LengthWidth::Sixteen
        }
        _ => LengthWidth::Eight,
    }
}

/// Response length width declared for `op`.
pub fn response_width(op: u8) -> LengthWidth {
    match op & OPCODE_MASK {
        opcode::GET_DATABUF_TCP => LengthWidth::Sixteen,
        _ => LengthWidth::Eight,
    }
}

/// Connection-mode tag passed when starting a client or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionMode {
    Tcp = 0,
    Udp = 1,
    /// TLS is terminated on the co-processor.
    Tls = 2,
}

impl ConnectionMode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}
