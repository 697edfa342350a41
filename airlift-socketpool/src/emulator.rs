//! Loopback co-processor emulator.
//!
//! [`Emulator`] answers the socket, resolver and radio commands with enough
//! state to run whole programs against a [`SimulatedBus`] instead of
//! hardware.  Every remote peer is an echo service: bytes a client sends
//! come straight back into its own receive buffer.  Incoming connections
//! for servers are injected with [`Emulator::inject_connection`].
//!
//! [`SimulatedBus`]: airlift_link::simulator::SimulatedBus

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};

use airlift_link::command::{opcode_name, IPV4_LENGTH, NO_SOCKET};
use airlift_link::frame::Request;
use airlift_link::simulator::{Reply, Responder};
use airlift_link::{opcode, ConnectionMode};
use log::{debug, trace};

/// Socket slots on a stock NINA-FW build.
pub const DEFAULT_SLOTS: usize = 10;

const STATUS_IDLE: u8 = 0;
const STATUS_NO_SSID: u8 = 1;
const STATUS_CONNECTED: u8 = 3;
const STATUS_CONNECT_FAILED: u8 = 4;
const STATUS_DISCONNECTED: u8 = 6;

const TCP_CLOSED: u8 = 0;
const TCP_ESTABLISHED: u8 = 4;

const EMULATED_RTT_MS: u16 = 7;
const EMULATED_RSSI: i32 = -42;

// Firmware auth-mode codes.
const AUTH_OPEN: u8 = 0;
const AUTH_WPA2_PSK: u8 = 3;

/// An access point the emulated radio can see and join.
#[derive(Debug, Clone)]
struct AccessPoint {
    ssid: String,
    passphrase: String,
}

impl AccessPoint {
    fn auth_code(&self) -> u8 {
        if self.passphrase.is_empty() {
            AUTH_OPEN
        } else {
            AUTH_WPA2_PSK
        }
    }
}

#[derive(Debug)]
enum Usage {
    /// Handed out by `GET_SOCKET`, nothing started yet.
    Reserved,
    Client { mode: u8 },
    Server { port: u16, backlog: VecDeque<u8> },
    Accepted,
}

#[derive(Debug)]
struct Slot {
    usage: Usage,
    rx: VecDeque<u8>,
    /// `INSERT_DATABUF_TCP` bytes waiting for `SEND_UDP_DATA`.
    staged: Vec<u8>,
    /// Everything sent to the remote side, for inspection.
    sent: Vec<u8>,
    remote: Option<SocketAddrV4>,
    peer_closed: bool,
}

impl Slot {
    fn new(usage: Usage) -> Self {
        Self {
            usage,
            rx: VecDeque::new(),
            staged: Vec::new(),
            sent: Vec::new(),
            remote: None,
            peer_closed: false,
        }
    }
}

/// In-memory stand-in for NINA-FW.
#[derive(Debug)]
pub struct Emulator {
    slots: Vec<Option<Slot>>,
    hosts: HashMap<String, Ipv4Addr>,
    last_lookup: Option<Ipv4Addr>,
    refused_ports: HashSet<u16>,
    networks: Vec<AccessPoint>,
    /// Snapshot taken by `START_SCAN_NETWORKS`, indexed by `GET_IDX_*`.
    scan: Vec<AccessPoint>,
    status: u8,
    ssid: Option<String>,
    ipv4: Ipv4Addr,
    netmask: Ipv4Addr,
    gateway: Ipv4Addr,
    dns: [Ipv4Addr; 2],
    mac: [u8; 6],
    firmware: String,
    hostname: Option<String>,
    power_mode: u8,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Emulator {
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_SLOTS)
    }

    pub fn with_slots(slots: usize) -> Self {
        let mut hosts = HashMap::new();
        hosts.insert("localhost".to_string(), Ipv4Addr::LOCALHOST);
        Self {
            slots: (0..slots.min(NO_SOCKET as usize)).map(|_| None).collect(),
            hosts,
            last_lookup: None,
            refused_ports: HashSet::new(),
            networks: Vec::new(),
            scan: Vec::new(),
            status: STATUS_IDLE,
            ssid: None,
            ipv4: Ipv4Addr::new(192, 168, 4, 2),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 4, 1),
            dns: [Ipv4Addr::new(192, 168, 4, 1), Ipv4Addr::UNSPECIFIED],
            mac: [0x24, 0x0A, 0xC4, 0x5E, 0x71, 0x09],
            firmware: "1.7.4".to_string(),
            hostname: None,
            power_mode: 0,
        }
    }

    /// Make `name` resolvable.  Lookups ignore case.
    pub fn with_host(mut self, name: &str, ip: Ipv4Addr) -> Self {
        self.hosts.insert(name.to_ascii_lowercase(), ip);
        self
    }

    /// Access point that accepts `passphrase` (empty for an open network).
    /// Scans report networks in the order they were added.
    pub fn with_network(mut self, ssid: &str, passphrase: &str) -> Self {
        self.networks.retain(|ap| ap.ssid != ssid);
        self.networks.push(AccessPoint {
            ssid: ssid.to_string(),
            passphrase: passphrase.to_string(),
        });
        self
    }

    pub fn with_address(mut self, ipv4: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        self.ipv4 = ipv4;
        self.netmask = netmask;
        self.gateway = gateway;
        self
    }

    pub fn with_mac(mut self, mac: [u8; 6]) -> Self {
        self.mac = mac;
        self
    }

    /// TCP clients to `port` are rejected.
    pub fn refuse_port(&mut self, port: u16) {
        self.refused_ports.insert(port);
    }

    pub fn address(&self) -> (Ipv4Addr, Ipv4Addr, Ipv4Addr) {
        (self.ipv4, self.netmask, self.gateway)
    }

    pub fn dns(&self) -> [Ipv4Addr; 2] {
        self.dns
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn power_mode(&self) -> u8 {
        self.power_mode
    }

    pub fn slot_in_use(&self, num: u8) -> bool {
        matches!(self.slots.get(num as usize), Some(Some(_)))
    }

    pub fn slots_in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Bytes the socket in slot `num` has sent to its peer.
    pub fn sent(&self, num: u8) -> &[u8] {
        match self.slots.get(num as usize) {
            Some(Some(slot)) => &slot.sent,
            _ => &[],
        }
    }

    /// Queue bytes for the socket in slot `num` to receive.
    pub fn inject_data(&mut self, num: u8, data: &[u8]) -> bool {
        match self.slot_mut(num) {
            Some(slot) => {
                slot.rx.extend(data.iter().copied());
                true
            }
            None => false,
        }
    }

    /// The remote end of slot `num` hangs up.
    pub fn close_peer(&mut self, num: u8) -> bool {
        match self.slot_mut(num) {
            Some(slot) => {
                slot.peer_closed = true;
                true
            }
            None => false,
        }
    }

    /// Have `peer` connect to the server listening on `port`, sending
    /// `payload` first.  Returns the handle accept will report.
    pub fn inject_connection(&mut self, port: u16, peer: SocketAddrV4, payload: &[u8]) -> Option<u8> {
        let server = self.slots.iter().position(|slot| {
            matches!(slot, Some(Slot { usage: Usage::Server { port: p, .. }, .. }) if *p == port)
        })?;
        let num = self.claim_free(Usage::Accepted)?;
        if let Some(slot) = self.slot_mut(num) {
            slot.rx.extend(payload.iter().copied());
            slot.remote = Some(peer);
        }
        if let Some(Some(Slot {
            usage: Usage::Server { backlog, .. },
            ..
        })) = self.slots.get_mut(server)
        {
            backlog.push_back(num);
        }
        debug!("[emu] {} connects to port {} as #{}", peer, port, num);
        Some(num)
    }

    fn slot_mut(&mut self, num: u8) -> Option<&mut Slot> {
        self.slots.get_mut(num as usize).and_then(Option::as_mut)
    }

    fn claim_free(&mut self, usage: Usage) -> Option<u8> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(Slot::new(usage));
        Some(index as u8)
    }

    fn lookup(&self, host: &str) -> Option<Ipv4Addr> {
        host.parse::<Ipv4Addr>()
            .ok()
            .or_else(|| self.hosts.get(&host.to_ascii_lowercase()).copied())
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    fn get_socket(&mut self) -> Reply {
        let num = self.claim_free(Usage::Reserved).unwrap_or(NO_SOCKET);
        Reply::byte(num)
    }

    fn start_client(&mut self, req: &Request) -> Reply {
        let host = String::from_utf8_lossy(req.param(0)).into_owned();
        let ip = if host.is_empty() {
            <[u8; IPV4_LENGTH]>::try_from(req.param(1)).ok().map(Ipv4Addr::from)
        } else {
            self.lookup(&host)
        };
        let (Some(ip), Ok(port), Some(&num), Some(&mode)) = (
            ip,
            <[u8; 2]>::try_from(req.param(2)).map(u16::from_be_bytes),
            req.param(3).first(),
            req.param(4).first(),
        ) else {
            return Reply::byte(0);
        };
        if num as usize >= self.slots.len() {
            return Reply::byte(0);
        }
        if mode != ConnectionMode::Udp.as_byte() && self.refused_ports.contains(&port) {
            debug!("[emu] #{} refused by {}:{}", num, host, port);
            return Reply::byte(0);
        }

        let peer = SocketAddrV4::new(ip, port);
        let mut slot = Slot::new(Usage::Client { mode });
        slot.remote = Some(peer);
        self.slots[num as usize] = Some(slot);
        debug!("[emu] #{} client to {} (mode {})", num, peer, mode);
        Reply::byte(1)
    }

    fn stop_client(&mut self, num: u8) -> Reply {
        match self.slots.get_mut(num as usize) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                debug!("[emu] #{} stopped", num);
                Reply::byte(1)
            }
            _ => Reply::byte(0),
        }
    }

    fn start_server(&mut self, req: &Request) -> Reply {
        let (Ok(port), Some(&num)) = (
            <[u8; 2]>::try_from(req.param(1)).map(u16::from_be_bytes),
            req.param(2).first(),
        ) else {
            return Reply::byte(0);
        };
        let taken = self
            .slots
            .iter()
            .any(|slot| matches!(slot, Some(Slot { usage: Usage::Server { port: p, .. }, .. }) if *p == port));
        if taken || num as usize >= self.slots.len() {
            return Reply::byte(0);
        }
        self.slots[num as usize] = Some(Slot::new(Usage::Server {
            port,
            backlog: VecDeque::new(),
        }));
        debug!("[emu] #{} serving port {}", num, port);
        Reply::byte(1)
    }

    fn server_state(&self, num: u8) -> Reply {
        let serving = matches!(
            self.slots.get(num as usize),
            Some(Some(Slot {
                usage: Usage::Server { .. },
                ..
            }))
        );
        Reply::byte(serving as u8)
    }

    fn client_state(&self, num: u8) -> Reply {
        let state = match self.slots.get(num as usize) {
            Some(Some(slot)) if slot.peer_closed => TCP_CLOSED,
            Some(Some(Slot {
                usage: Usage::Client { .. } | Usage::Accepted,
                ..
            })) => TCP_ESTABLISHED,
            _ => TCP_CLOSED,
        };
        Reply::byte(state)
    }

    fn available(&mut self, num: u8) -> Reply {
        let value: u16 = match self.slot_mut(num) {
            Some(Slot {
                usage: Usage::Server { backlog, .. },
                ..
            }) => backlog.pop_front().unwrap_or(NO_SOCKET) as u16,
            Some(slot) => slot.rx.len().min(u16::MAX as usize) as u16,
            None => 0,
        };
        Reply::Responses(vec![value.to_le_bytes().to_vec()])
    }

    fn send_stream(&mut self, num: u8, data: &[u8]) -> Reply {
        let Some(slot) = self.slot_mut(num) else {
            return Reply::empty();
        };
        slot.sent.extend_from_slice(data);
        if matches!(slot.usage, Usage::Client { .. }) {
            slot.rx.extend(data.iter().copied());
        }
        Reply::Responses(vec![(data.len() as u16).to_le_bytes().to_vec()])
    }

    fn insert_databuf(&mut self, num: u8, data: &[u8]) -> Reply {
        match self.slot_mut(num) {
            Some(slot) => {
                slot.staged.extend_from_slice(data);
                Reply::byte(1)
            }
            None => Reply::byte(0),
        }
    }

    fn send_datagram(&mut self, num: u8) -> Reply {
        let udp = ConnectionMode::Udp.as_byte();
        match self.slot_mut(num) {
            Some(slot) if matches!(slot.usage, Usage::Client { mode } if mode == udp) => {
                let datagram = std::mem::take(&mut slot.staged);
                slot.sent.extend_from_slice(&datagram);
                slot.rx.extend(datagram);
                Reply::byte(1)
            }
            _ => Reply::byte(0),
        }
    }

    fn read_databuf(&mut self, req: &Request) -> Reply {
        let wanted = <[u8; 2]>::try_from(req.param(1))
            .map(u16::from_le_bytes)
            .unwrap_or(0) as usize;
        let chunk: Vec<u8> = match req.param(0).first().and_then(|&num| self.slot_mut(num)) {
            Some(slot) => {
                let n = wanted.min(slot.rx.len());
                slot.rx.drain(..n).collect()
            }
            None => Vec::new(),
        };
        Reply::Responses(vec![chunk])
    }

    fn remote_data(&self, num: u8) -> Reply {
        let remote = match self.slots.get(num as usize) {
            Some(Some(slot)) => slot.remote,
            _ => None,
        };
        let (ip, port) = remote.map_or((Ipv4Addr::UNSPECIFIED, 0), |r| (*r.ip(), r.port()));
        Reply::Responses(vec![ip.octets().to_vec(), port.to_be_bytes().to_vec()])
    }

    fn req_host_by_name(&mut self, host: &[u8]) -> Reply {
        let host = String::from_utf8_lossy(host);
        self.last_lookup = self.lookup(&host);
        Reply::byte(self.last_lookup.is_some() as u8)
    }

    fn join(&mut self, ssid: &[u8], passphrase: &[u8]) -> Reply {
        let ssid = String::from_utf8_lossy(ssid).into_owned();
        let passphrase = String::from_utf8_lossy(passphrase);
        self.status = match self.networks.iter().find(|ap| ap.ssid == ssid) {
            Some(ap) if ap.passphrase == passphrase => STATUS_CONNECTED,
            Some(_) => STATUS_CONNECT_FAILED,
            None => STATUS_NO_SSID,
        };
        debug!("[emu] join {} -> status {}", ssid, self.status);
        self.ssid = (self.status == STATUS_CONNECTED).then_some(ssid);
        Reply::byte(1)
    }

    fn set_ip_config(&mut self, req: &Request) -> Reply {
        // valid flag, ip, gateway, netmask
        let quad = |index: usize| <[u8; IPV4_LENGTH]>::try_from(req.param(index)).ok().map(Ipv4Addr::from);
        match (quad(1), quad(2), quad(3)) {
            (Some(ip), Some(gateway), Some(netmask)) => {
                self.ipv4 = ip;
                self.gateway = gateway;
                self.netmask = netmask;
                debug!("[emu] static address {} mask {} via {}", ip, netmask, gateway);
                Reply::byte(1)
            }
            _ => Reply::byte(0),
        }
    }

    fn scanned(&self, req: &Request) -> Option<(usize, &AccessPoint)> {
        let index = *req.param(0).first()? as usize;
        self.scan.get(index).map(|ap| (index, ap))
    }

    fn scanned_detail(&self, req: &Request) -> Reply {
        let Some((index, ap)) = self.scanned(req) else {
            return Reply::empty();
        };
        let detail = match req.opcode {
            opcode::GET_IDX_BSSID => vec![0x02, 0x00, 0x5C, 0xA7, 0x00, (index as u8).wrapping_add(1)],
            opcode::GET_IDX_RSSI => (EMULATED_RSSI - 6 * index as i32).to_le_bytes().to_vec(),
            opcode::GET_IDX_CHAN => vec![(1 + (5 * index) % 11) as u8],
            _ => vec![ap.auth_code()],
        };
        Reply::Responses(vec![detail])
    }
}

impl Responder for Emulator {
    fn respond(&mut self, req: &Request) -> Reply {
        trace!("[emu] {} with {} params", opcode_name(req.opcode), req.params.len());
        let num = req.param(0).first().copied().unwrap_or(NO_SOCKET);

        match req.opcode {
            opcode::GET_SOCKET => self.get_socket(),
            opcode::START_CLIENT_TCP => self.start_client(req),
            opcode::STOP_CLIENT_TCP => self.stop_client(num),
            opcode::START_SERVER_TCP => self.start_server(req),
            opcode::GET_STATE_TCP => self.server_state(num),
            opcode::GET_CLIENT_STATE_TCP => self.client_state(num),
            opcode::AVAIL_DATA_TCP => self.available(num),
            opcode::SEND_DATA_TCP => self.send_stream(num, req.param(1)),
            opcode::INSERT_DATABUF_TCP => self.insert_databuf(num, req.param(1)),
            opcode::SEND_UDP_DATA => self.send_datagram(num),
            opcode::GET_DATABUF_TCP => self.read_databuf(req),
            opcode::GET_REMOTE_DATA => self.remote_data(num),

            opcode::REQ_HOST_BY_NAME => self.req_host_by_name(req.param(0)),
            opcode::GET_HOST_BY_NAME => match self.last_lookup {
                Some(ip) => Reply::Responses(vec![ip.octets().to_vec()]),
                None => Reply::empty(),
            },

            opcode::GET_IPADDR => Reply::Responses(vec![
                self.ipv4.octets().to_vec(),
                self.netmask.octets().to_vec(),
                self.gateway.octets().to_vec(),
            ]),
            opcode::GET_DNS_CONFIG => {
                Reply::Responses(self.dns.iter().map(|ip| ip.octets().to_vec()).collect())
            }
            opcode::SET_DNS_CONFIG => match <[u8; IPV4_LENGTH]>::try_from(req.param(1)) {
                Ok(ip) => {
                    self.dns[0] = Ipv4Addr::from(ip);
                    Reply::byte(1)
                }
                Err(_) => Reply::byte(0),
            },
            opcode::GET_MACADDR => Reply::Responses(vec![self.mac.to_vec()]),
            opcode::GET_FW_VERSION => {
                let mut version = self.firmware.clone().into_bytes();
                version.push(0);
                Reply::Responses(vec![version])
            }
            opcode::SET_HOSTNAME => {
                self.hostname = Some(String::from_utf8_lossy(req.param(0)).into_owned());
                Reply::byte(1)
            }
            opcode::SET_POWER_MODE => {
                self.power_mode = num;
                Reply::byte(1)
            }

            opcode::SET_NET => self.join(req.param(0), &[]),
            opcode::SET_PASSPHRASE => self.join(req.param(0), req.param(1)),
            opcode::DISCONNECT => {
                self.status = STATUS_DISCONNECTED;
                self.ssid = None;
                Reply::byte(1)
            }
            opcode::GET_CONN_STATUS => Reply::byte(self.status),
            opcode::GET_CURR_SSID => match &self.ssid {
                Some(ssid) => Reply::Responses(vec![ssid.clone().into_bytes()]),
                None => Reply::empty(),
            },
            opcode::GET_CURR_BSSID => Reply::Responses(vec![self.gateway_bssid().to_vec()]),
            opcode::GET_CURR_RSSI => Reply::Responses(vec![EMULATED_RSSI.to_le_bytes().to_vec()]),
            opcode::GET_CURR_ENCT => {
                let joined = self.ssid.as_ref().and_then(|ssid| self.networks.iter().find(|ap| &ap.ssid == ssid));
                match joined {
                    Some(ap) => Reply::byte(ap.auth_code()),
                    None => Reply::empty(),
                }
            }
            opcode::SET_IP_CONFIG => self.set_ip_config(req),

            opcode::START_SCAN_NETWORKS => {
                self.scan = self.networks.clone();
                Reply::byte(1)
            }
            opcode::SCAN_NETWORKS => {
                Reply::Responses(self.scan.iter().map(|ap| ap.ssid.clone().into_bytes()).collect())
            }
            opcode::GET_IDX_BSSID | opcode::GET_IDX_RSSI | opcode::GET_IDX_CHAN | opcode::GET_IDX_ENCT => {
                self.scanned_detail(req)
            }
            opcode::PING if self.status == STATUS_CONNECTED => {
                Reply::Responses(vec![EMULATED_RTT_MS.to_le_bytes().to_vec()])
            }
            opcode::PING => Reply::empty(),

            other => {
                debug!("[emu] rejecting {}", opcode_name(other));
                Reply::Error
            }
        }
    }
}

impl Emulator {
    fn gateway_bssid(&self) -> [u8; 6] {
        let [a, b, c, d] = self.gateway.octets();
        [0x02, 0x00, a, b, c, d]
    }
}
