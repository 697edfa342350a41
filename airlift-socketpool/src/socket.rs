//! BSD-style sockets backed by co-processor socket slots.
//!
//! A [`Socket`] owns one remote slot number plus a small local cache of what
//! the co-processor has been told (bound address, client or server role).
//! The cache only decides *which* remote query applies; connection state is
//! always read back from the co-processor on demand.
//!
//! Blocking calls (`accept`, `recv_into`) are poll loops paced by
//! [`PollConfig::interval_ms`], yielding to the platform between polls and
//! giving up early on a user interrupt.

use std::cell::RefCell;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use airlift_link::command::{IPV4_LENGTH, MAX_HOSTNAME_LENGTH, NO_SOCKET};
use airlift_link::{opcode, Bus, ConnectionMode, Platform, Radio};
use log::{debug, info, warn};

use crate::error::SocketError;
use crate::resolver::resolve_ipv4;
use crate::state::{AddressFamily, Endpoint, Pending, Role, SocketState, SocketType, TcpState};
use crate::timeout::{Deadline, PollConfig, Timeout};

/// The one radio handle every socket talks through.
pub type SharedRadio<B, P> = Rc<RefCell<Radio<B, P>>>;

/// Largest payload one data command can carry (16-bit length prefix).
const MAX_CHUNK: usize = u16::MAX as usize;
const ACCEPT_MODE: ConnectionMode = ConnectionMode::Tcp;

pub struct Socket<B: Bus, P: Platform> {
    radio: SharedRadio<B, P>,
    num: u8,
    family: AddressFamily,
    kind: SocketType,
    proto: u8,
    timeout: Timeout,
    poll: PollConfig,
    bound: Option<Endpoint>,
    role: Role,
    mode: Option<ConnectionMode>,
    closed: bool,
}

impl<B: Bus, P: Platform> Socket<B, P> {
    /// Ask the co-processor for a fresh slot.
    pub(crate) fn allocate(
        radio: SharedRadio<B, P>,
        family: AddressFamily,
        kind: SocketType,
        proto: u8,
        poll: PollConfig,
    ) -> Result<Self, SocketError> {
        let num = {
            let mut r = radio.borrow_mut();
            let timeout = r.config().default_timeout_ms;
            let mut num = [NO_SOCKET];
            let lengths = r.call(opcode::GET_SOCKET, &[], &mut [&mut num[..]], timeout)?;
            if lengths.first().copied().unwrap_or(0) == 0 {
                return Err(SocketError::Failed);
            }
            num[0]
        };
        if num == NO_SOCKET {
            warn!("[socket] co-processor is out of sockets");
            return Err(SocketError::OutOfSockets);
        }
        debug!("[socket] allocated #{} ({:?})", num, kind);
        Ok(Self::from_parts(radio, num, family, kind, proto, poll))
    }

    fn from_parts(
        radio: SharedRadio<B, P>,
        num: u8,
        family: AddressFamily,
        kind: SocketType,
        proto: u8,
        poll: PollConfig,
    ) -> Self {
        Self {
            radio,
            num,
            family,
            kind,
            proto,
            timeout: poll.default_timeout,
            poll,
            bound: None,
            role: Role::Idle,
            mode: None,
            closed: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Co-processor slot number.
    pub fn num(&self) -> u8 {
        self.num
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn kind(&self) -> SocketType {
        self.kind
    }

    pub fn proto(&self) -> u8 {
        self.proto
    }

    pub fn state(&self) -> SocketState {
        if self.closed {
            return SocketState::Stopped;
        }
        match self.role {
            Role::Client { .. } => SocketState::ClientActive,
            Role::Server => SocketState::ServerActive,
            Role::Idle if self.bound.is_some() => SocketState::Bound,
            Role::Idle => SocketState::Allocated,
        }
    }

    /// Address given to [`Socket::bind`].
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        self.bound.as_ref()
    }

    /// Mode the active client or server was started with.
    pub fn connection_mode(&self) -> Option<ConnectionMode> {
        self.mode
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.timeout = timeout;
    }

    /// Raw form: 0 is non-blocking, `u32::MAX` blocks forever.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout.as_millis()
    }

    pub fn set_timeout_ms(&mut self, ms: u32) {
        self.timeout = Timeout::from_millis(ms);
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn check_open(&self) -> Result<(), SocketError> {
        if self.closed {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }

    fn now_ms(&self) -> u64 {
        self.radio.borrow().now_ms()
    }

    fn interrupted(&self) -> bool {
        self.radio.borrow().is_interrupted()
    }

    fn idle(&self) {
        self.radio.borrow_mut().idle(self.poll.interval_ms);
    }

    /// Command timeout derived from the socket timeout.
    fn transaction_ms(&self, radio: &Radio<B, P>) -> u32 {
        self.timeout.transaction_ms(radio.config().default_timeout_ms)
    }

    fn start_client(&mut self, host: &str, port: u16, mode: ConnectionMode) -> Result<(), SocketError> {
        if host.len() > MAX_HOSTNAME_LENGTH {
            return Err(SocketError::InvalidArgument("hostname too long"));
        }
        if let Role::Client { peer: Some(peer) } = &self.role {
            if peer.matches(host, port) && self.mode == Some(mode) {
                return Ok(());
            }
        }
        self.stop_client()?;

        let unused = [0u8; IPV4_LENGTH];
        let port_bytes = port.to_be_bytes();
        let num = [self.num];
        let mode_byte = [mode.as_byte()];
        {
            let mut radio = self.radio.borrow_mut();
            let timeout = self.transaction_ms(&radio);
            radio
                .expect_success(
                    opcode::START_CLIENT_TCP,
                    &[host.as_bytes(), &unused, &port_bytes, &num, &mode_byte],
                    timeout,
                )
                .map_err(|err| {
                    debug!("[socket] #{} start client {}:{} failed: {}", self.num, host, port, err);
                    SocketError::from(err)
                })?;
        }

        info!("[socket] #{} → {}:{} ({:?})", self.num, host, port, mode);
        self.role = Role::Client {
            peer: Some(Endpoint::new(host, port)),
        };
        self.mode = Some(mode);
        Ok(())
    }

    /// No-op unless a client is active.  Failures are ignored once the
    /// platform is shutting down, since this runs from `Drop`.
    fn stop_client(&mut self) -> Result<(), SocketError> {
        if !matches!(self.role, Role::Client { .. }) {
            return Ok(());
        }
        let num = [self.num];
        let (result, running) = {
            let mut radio = self.radio.borrow_mut();
            let timeout = radio.config().default_timeout_ms;
            let result = radio.expect_success(opcode::STOP_CLIENT_TCP, &[&num], timeout);
            (result, radio.is_running())
        };
        match result {
            Err(err) if running => return Err(err.into()),
            Err(err) => debug!("[socket] #{} stop client failed during shutdown: {}", self.num, err),
            Ok(()) => debug!("[socket] #{} client stopped", self.num),
        }
        self.role = Role::Idle;
        self.mode = None;
        Ok(())
    }

    /// Idempotent: the co-processor cannot restart a server on another port.
    fn start_server(&mut self, mode: ConnectionMode) -> Result<(), SocketError> {
        if matches!(self.role, Role::Server) {
            return Ok(());
        }
        let port = self.bound.as_ref().map(|ep| ep.port).ok_or(SocketError::NotSupported)?;

        let any = [0u8; IPV4_LENGTH];
        let port_bytes = port.to_be_bytes();
        let num = [self.num];
        let mode_byte = [mode.as_byte()];
        {
            let mut radio = self.radio.borrow_mut();
            let timeout = self.transaction_ms(&radio);
            radio.expect_success(
                opcode::START_SERVER_TCP,
                &[&any, &port_bytes, &num, &mode_byte],
                timeout,
            )?;
        }

        info!("[socket] #{} listening on port {}", self.num, port);
        self.role = Role::Server;
        self.mode = Some(mode);
        Ok(())
    }

    /// `AVAIL_DATA_TCP`, decoded according to the socket's role.
    fn poll_pending(&mut self) -> Result<Pending, SocketError> {
        let num = [self.num];
        let mut raw = [0u8; 2];
        let lengths = {
            let mut radio = self.radio.borrow_mut();
            let timeout = radio.config().default_timeout_ms;
            radio.call(opcode::AVAIL_DATA_TCP, &[&num], &mut [&mut raw[..]], timeout)?
        };
        if lengths.is_empty() {
            return Err(SocketError::Failed);
        }
        // Little-endian on the wire.
        let value = u16::from_le_bytes(raw);
        Ok(match self.role {
            Role::Server => Pending::Connection((value != NO_SOCKET as u16).then_some(value as u8)),
            _ => Pending::Bytes(value),
        })
    }

    fn client_state(&mut self) -> Result<TcpState, SocketError> {
        let num = [self.num];
        let mut radio = self.radio.borrow_mut();
        let timeout = radio.config().default_timeout_ms;
        let raw = radio.call_status(opcode::GET_CLIENT_STATE_TCP, &[&num], timeout)?;
        Ok(TcpState::from(raw))
    }

    /// `GET_STATE_TCP` only reports whether a server exists for the slot.
    fn server_exists(&mut self) -> Result<bool, SocketError> {
        let num = [self.num];
        let mut radio = self.radio.borrow_mut();
        let timeout = radio.config().default_timeout_ms;
        Ok(radio.call_status(opcode::GET_STATE_TCP, &[&num], timeout)? == 1)
    }

    /// One `GET_DATABUF_TCP` round trip; 0 when nothing is buffered.
    fn read_buffered(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let num = [self.num];
        // The requested length goes out little-endian.
        let len = (buf.len().min(MAX_CHUNK) as u16).to_le_bytes();
        let mut radio = self.radio.borrow_mut();
        let timeout = self.transaction_ms(&radio);
        let lengths = radio.call(opcode::GET_DATABUF_TCP, &[&num, &len], &mut [buf], timeout)?;
        lengths.first().copied().ok_or(SocketError::Failed)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Record the local address for a later [`Socket::listen`].
    ///
    /// `host` must resolve to the wildcard address or to this station's own
    /// address.
    pub fn bind(&mut self, host: &str, port: u16) -> Result<(), SocketError> {
        self.check_open()?;
        if !matches!(self.role, Role::Idle) {
            return Err(SocketError::InUse);
        }
        if self.bound.is_some() {
            return Err(SocketError::InvalidArgument("socket already bound"));
        }

        {
            let mut radio = self.radio.borrow_mut();
            let ip = resolve_ipv4(&mut *radio, host)?;
            if !ip.is_unspecified() {
                let own = radio.ipv4_address()?;
                if ip != own {
                    debug!("[socket] #{} cannot bind {}, station is {}", self.num, ip, own);
                    return Err(SocketError::AddrNotAvailable);
                }
            }
        }

        self.bound = Some(Endpoint::new(host, port));
        debug!("[socket] #{} bound to {}:{}", self.num, host, port);
        Ok(())
    }

    /// Start a TCP server on the bound port.  The backlog is fixed by the
    /// firmware.
    pub fn listen(&mut self, backlog: u32) -> Result<(), SocketError> {
        if self.kind != SocketType::Stream {
            return Err(SocketError::NotSupported);
        }
        self.check_open()?;
        match self.role {
            Role::Server => return Ok(()),
            Role::Client { .. } => return Err(SocketError::InUse),
            Role::Idle => {}
        }
        if self.bound.is_none() {
            // No implicit address assignment on this co-processor.
            return Err(SocketError::NotSupported);
        }
        debug!("[socket] #{} listen (backlog {} ignored)", self.num, backlog);
        self.start_server(ConnectionMode::Tcp)
    }

    /// Wait for an incoming connection on a listening socket.
    pub fn accept(&mut self) -> Result<Socket<B, P>, SocketError> {
        if self.kind != SocketType::Stream || self.bound.is_none() {
            return Err(SocketError::NotSupported);
        }
        self.check_open()?;
        if !matches!(self.role, Role::Server) || !self.server_exists()? {
            return Err(SocketError::NotConnected);
        }

        let deadline = Deadline::start(self.now_ms(), self.timeout);
        loop {
            if let Pending::Connection(Some(num)) = self.poll_pending()? {
                info!("[socket] #{} accepted connection on #{}", self.num, num);
                let mut accepted = Socket::from_parts(
                    Rc::clone(&self.radio),
                    num,
                    self.family,
                    SocketType::Stream,
                    self.proto,
                    self.poll.clone(),
                );
                accepted.role = Role::Client { peer: None };
                accepted.mode = Some(ACCEPT_MODE);
                return Ok(accepted);
            }

            if self.timeout == Timeout::NonBlocking {
                return Err(SocketError::WouldBlock);
            }
            if deadline.expired(self.now_ms()) || self.interrupted() {
                return Err(SocketError::TimedOut);
            }
            self.idle();
        }
    }

    /// Start a client to `host:port`: TCP for stream sockets, UDP for
    /// datagram sockets.  Reconnecting to the same peer is a no-op.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), SocketError> {
        let mode = match self.kind {
            SocketType::Stream => ConnectionMode::Tcp,
            SocketType::Dgram => ConnectionMode::Udp,
            SocketType::Raw => return Err(SocketError::NotSupported),
        };
        self.check_open()?;
        if matches!(self.role, Role::Server) {
            return Err(SocketError::InUse);
        }
        self.start_client(host, port, mode)
    }

    /// Like [`Socket::connect`] but the co-processor wraps the stream in TLS.
    pub fn connect_tls(&mut self, host: &str, port: u16) -> Result<(), SocketError> {
        if self.kind != SocketType::Stream {
            return Err(SocketError::NotSupported);
        }
        self.check_open()?;
        if matches!(self.role, Role::Server) {
            return Err(SocketError::InUse);
        }
        self.start_client(host, port, ConnectionMode::Tls)
    }

    /// Stop an active client.  Servers keep running; there is no command to
    /// stop them.  Closing twice does nothing the second time.
    pub fn close(&mut self) -> Result<(), SocketError> {
        if self.closed {
            return Ok(());
        }
        self.stop_client()?;
        self.closed = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Data
    // -----------------------------------------------------------------------

    /// Send on a connected socket.  Stream sockets may send fewer bytes than
    /// given; datagram sockets send all of `buf` or fail.
    pub fn send(&mut self, buf: &[u8]) -> Result<usize, SocketError> {
        self.check_open()?;
        if self.kind == SocketType::Raw {
            return Err(SocketError::NotSupported);
        }
        if !matches!(self.role, Role::Client { .. }) {
            return Err(SocketError::NotConnected);
        }
        let num = [self.num];

        match self.kind {
            SocketType::Stream => {
                let chunk = &buf[..buf.len().min(MAX_CHUNK)];
                let mut sent = [0u8; 2];
                let lengths = {
                    let mut radio = self.radio.borrow_mut();
                    let timeout = self.transaction_ms(&radio);
                    radio.call(opcode::SEND_DATA_TCP, &[&num, chunk], &mut [&mut sent[..]], timeout)?
                };
                if lengths.first().copied().unwrap_or(0) < sent.len() {
                    return Err(SocketError::Failed);
                }
                // Little-endian, unlike frame lengths.
                Ok(u16::from_le_bytes(sent) as usize)
            }
            _ => {
                if buf.len() > MAX_CHUNK {
                    return Err(SocketError::InvalidArgument("datagram too large"));
                }
                let mut radio = self.radio.borrow_mut();
                let timeout = self.transaction_ms(&radio);
                radio.expect_success(opcode::INSERT_DATABUF_TCP, &[&num, buf], timeout)?;
                radio.expect_success(opcode::SEND_UDP_DATA, &[&num], timeout)?;
                Ok(buf.len())
            }
        }
    }

    /// Send one datagram to `host:port`, starting a UDP client towards it
    /// first unless one is already running for that peer.
    pub fn sendto(&mut self, buf: &[u8], host: &str, port: u16) -> Result<usize, SocketError> {
        if self.kind != SocketType::Dgram {
            return Err(SocketError::NotSupported);
        }
        self.check_open()?;
        self.start_client(host, port, ConnectionMode::Udp)?;
        self.send(buf)
    }

    /// Receive into `buf`.
    ///
    /// Returns the byte count, `Ok(0)` when the deadline passed or the user
    /// interrupted, and [`SocketError::WouldBlock`] on an empty
    /// non-blocking socket.
    pub fn recv_into(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        self.check_open()?;
        if self.kind == SocketType::Raw {
            return Err(SocketError::NotSupported);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(MAX_CHUNK);

        let deadline = Deadline::start(self.now_ms(), self.timeout);
        loop {
            let n = self.read_buffered(&mut buf[..len])?;
            if n > 0 {
                return Ok(n);
            }
            if self.timeout == Timeout::NonBlocking {
                return Err(SocketError::WouldBlock);
            }
            if deadline.expired(self.now_ms()) || self.interrupted() {
                return Ok(0);
            }
            self.idle();
        }
    }

    /// Datagram receive that also reports the sender.
    pub fn recvfrom_into(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddrV4), SocketError> {
        if self.kind != SocketType::Dgram {
            return Err(SocketError::NotSupported);
        }
        let n = self.recv_into(buf)?;
        let from = self.peer_address()?.ok_or(SocketError::NotConnected)?;
        Ok((n, from))
    }

    /// Bytes buffered on the co-processor for this socket.
    pub fn available(&mut self) -> Result<usize, SocketError> {
        self.check_open()?;
        if matches!(self.role, Role::Server) {
            return Err(SocketError::NotSupported);
        }
        match self.poll_pending()? {
            Pending::Bytes(n) => Ok(n as usize),
            Pending::Connection(_) => Err(SocketError::NotSupported),
        }
    }

    // -----------------------------------------------------------------------
    // Status (always read back from the co-processor)
    // -----------------------------------------------------------------------

    /// Remote end of the connection; `None` when there is none.
    pub fn peer_address(&mut self) -> Result<Option<SocketAddrV4>, SocketError> {
        let num = [self.num];
        let mut ip = [0u8; IPV4_LENGTH];
        let mut port = [0u8; 2];
        let lengths = {
            let mut radio = self.radio.borrow_mut();
            let timeout = radio.config().default_timeout_ms;
            radio.call(
                opcode::GET_REMOTE_DATA,
                &[&num],
                &mut [&mut ip[..], &mut port[..]],
                timeout,
            )?
        };
        if lengths.is_empty() {
            return Err(SocketError::Failed);
        }
        let port = u16::from_be_bytes(port);
        if port == 0 {
            return Ok(None);
        }
        Ok(Some(SocketAddrV4::new(Ipv4Addr::from(ip), port)))
    }

    /// TCP state of an active client; `None` for any other role.
    pub fn tcp_state(&mut self) -> Result<Option<TcpState>, SocketError> {
        match self.role {
            Role::Client { .. } => Ok(Some(self.client_state()?)),
            _ => Ok(None),
        }
    }

    pub fn is_connected(&mut self) -> Result<bool, SocketError> {
        match self.role {
            Role::Client { .. } => Ok(self.client_state()? == TcpState::Established),
            Role::Server => self.server_exists(),
            Role::Idle => Ok(false),
        }
    }

    pub fn is_closed(&mut self) -> Result<bool, SocketError> {
        match self.role {
            Role::Client { .. } => Ok(self.client_state()? == TcpState::Closed),
            Role::Server => Ok(!self.server_exists()?),
            Role::Idle => Ok(false),
        }
    }
}

impl<B: Bus, P: Platform> Drop for Socket<B, P> {
    fn drop(&mut self) {
        if self.closed || self.radio.try_borrow_mut().is_err() {
            return;
        }
        if let Err(err) = self.stop_client() {
            warn!("[socket] #{} not stopped on drop: {}", self.num, err);
        }
    }
}

impl<B: Bus, P: Platform> fmt::Debug for Socket<B, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("num", &self.num)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("timeout", &self.timeout)
            .finish()
    }
}
