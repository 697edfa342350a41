//! Radio handle: the single owner of the link.
//!
//! A [`Radio`] wraps the [`Transport`] together with the little state the
//! firmware cannot report back (enabled flag, hostname, power mode).  The
//! socket layer reaches the co-processor exclusively through
//! [`Radio::call`] and the status helpers built on it.

use std::net::Ipv4Addr;

use log::{debug, info, warn};

use crate::bus::{Bus, Line};
use crate::command::{opcode, IPV4_LENGTH, MAX_HOSTNAME_LENGTH};
use crate::config::LinkConfig;
use crate::error::{JoinError, LinkError};
use crate::frame::{Command, ResponseLengths};
use crate::platform::Platform;
use crate::transport::Transport;

const MAC_ADDRESS_LENGTH: usize = 6;
const MAX_FIRMWARE_VERSION_LENGTH: usize = 10;
const MAX_SSID_LENGTH: usize = 32;
/// Firmware ignores the single parameter of the "get current …" queries.
const IGNORED: u8 = 0xFF;
const PING_TTL: u8 = 250;
/// Networks a single scan can report.
pub const MAX_SCANNED_NETWORKS: usize = 10;
/// A scan walks every channel, far longer than an ordinary command.
const SCAN_TIMEOUT_MS: u32 = 10_000;
/// Join timeout used when the caller passes zero.
pub const DEFAULT_JOIN_TIMEOUT_MS: u32 = 8000;

/// Station power saving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerManagement {
    None,
    Min,
    Max,
}

/// Access-point association status as reported by `GET_CONN_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    NoShield,
    Stopped,
    Idle,
    NoSsidAvailable,
    ScanCompleted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    Disconnected,
    Other(u8),
}

impl From<u8> for ConnectionStatus {
    fn from(raw: u8) -> Self {
        match raw {
            255 => ConnectionStatus::NoShield,
            254 => ConnectionStatus::Stopped,
            0 => ConnectionStatus::Idle,
            1 => ConnectionStatus::NoSsidAvailable,
            2 => ConnectionStatus::ScanCompleted,
            3 => ConnectionStatus::Connected,
            4 => ConnectionStatus::ConnectFailed,
            5 => ConnectionStatus::ConnectionLost,
            6 => ConnectionStatus::Disconnected,
            other => ConnectionStatus::Other(other),
        }
    }
}

/// Station addressing as reported by `GET_IPADDR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressInfo {
    pub ipv4: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

/// Access-point security, decoded from the firmware's auth-mode code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Open,
    Wep,
    WpaPsk,
    Wpa2Psk,
    WpaWpa2Psk,
    Wpa2Enterprise,
    Wpa3Psk,
    Wpa2Wpa3Psk,
    Wpa3Enterprise,
    Wpa2Wpa3Enterprise,
    WpaEnterprise,
    Other(u8),
}

impl From<u8> for AuthMode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => AuthMode::Open,
            1 => AuthMode::Wep,
            2 => AuthMode::WpaPsk,
            3 => AuthMode::Wpa2Psk,
            4 => AuthMode::WpaWpa2Psk,
            5 => AuthMode::Wpa2Enterprise,
            6 => AuthMode::Wpa3Psk,
            7 => AuthMode::Wpa2Wpa3Psk,
            14 => AuthMode::Wpa3Enterprise,
            15 => AuthMode::Wpa2Wpa3Enterprise,
            16 => AuthMode::WpaEnterprise,
            other => AuthMode::Other(other),
        }
    }
}

impl AuthMode {
    pub fn is_open(self) -> bool {
        self == AuthMode::Open
    }
}

/// The access point the station is associated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: Option<String>,
    pub bssid: Option<[u8; MAC_ADDRESS_LENGTH]>,
    pub rssi: Option<i32>,
    pub auth_mode: Option<AuthMode>,
}

/// One access point seen by [`Radio::scan_networks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedNetwork {
    pub ssid: String,
    pub bssid: Option<[u8; MAC_ADDRESS_LENGTH]>,
    pub rssi: Option<i32>,
    pub channel: Option<u8>,
    pub auth_mode: Option<AuthMode>,
}

pub struct Radio<B, P> {
    transport: Transport<B, P>,
    enabled: bool,
    deinited: bool,
    hostname: String,
    power_management: PowerManagement,
}

impl<B: Bus, P: Platform> Radio<B, P> {
    /// Reset the co-processor and bring the radio up.
    ///
    /// A default hostname `AirLift-XXYYZZ` is derived from the MAC address
    /// because the firmware's own default names the chip variant.
    pub fn new(bus: B, platform: P, config: LinkConfig) -> Self {
        let mut radio = Self::attach(bus, platform, config);
        radio.transport.bus_mut().gpio_write(Line::ChipSelect, true);
        radio.reset();

        match radio.mac_address() {
            Ok(mac) => {
                let name = format!("AirLift-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
                if let Err(err) = radio.set_hostname(&name) {
                    warn!("[radio] could not set default hostname {}: {}", name, err);
                }
            }
            Err(err) => warn!("[radio] no MAC address, keeping firmware hostname: {}", err),
        }
        radio
    }

    /// Wrap a co-processor that is already running, without resetting it.
    pub fn attach(bus: B, platform: P, config: LinkConfig) -> Self {
        Self {
            transport: Transport::new(bus, platform, config),
            enabled: true,
            deinited: false,
            hostname: String::new(),
            power_management: PowerManagement::None,
        }
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    pub fn transport(&self) -> &Transport<B, P> {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport<B, P> {
        &mut self.transport
    }

    pub fn bus(&self) -> &B {
        self.transport.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.transport.bus_mut()
    }

    pub fn platform(&self) -> &P {
        self.transport.platform()
    }

    pub fn platform_mut(&mut self) -> &mut P {
        self.transport.platform_mut()
    }

    pub fn config(&self) -> &LinkConfig {
        self.transport.config()
    }

    pub fn now_ms(&self) -> u64 {
        self.transport.platform().now_ms()
    }

    pub fn is_interrupted(&self) -> bool {
        self.transport.platform().is_interrupted()
    }

    pub fn is_running(&self) -> bool {
        self.transport.platform().is_running()
    }

    /// Yield to background work, then sleep.
    pub fn idle(&mut self, ms: u32) {
        let platform = self.transport.platform_mut();
        platform.run_background_tasks();
        platform.delay_ms(ms);
    }

    /// Send one command and collect its reply into `slots`.
    ///
    /// After [`Radio::deinit`] this performs no bus traffic and reports zero
    /// responses.
    pub fn call(
        &mut self,
        op: u8,
        params: &[&[u8]],
        slots: &mut [&mut [u8]],
        timeout_ms: u32,
    ) -> Result<ResponseLengths, LinkError> {
        if self.deinited {
            return Ok(ResponseLengths::new());
        }
        self.transport.call(&Command::new(op, params), slots, timeout_ms)
    }

    /// Send a command whose reply is a single status byte.
    pub fn call_status(&mut self, op: u8, params: &[&[u8]], timeout_ms: u32) -> Result<u8, LinkError> {
        let mut status = [0u8; 1];
        let lengths = self.call(op, params, &mut [&mut status[..]], timeout_ms)?;
        if lengths.first().copied().unwrap_or(0) == 0 {
            return Err(LinkError::NoResponse { opcode: op });
        }
        Ok(status[0])
    }

    /// Like [`Radio::call_status`] but any status other than 1 is an error.
    pub fn expect_success(&mut self, op: u8, params: &[&[u8]], timeout_ms: u32) -> Result<(), LinkError> {
        match self.call_status(op, params, timeout_ms)? {
            1 => Ok(()),
            status => Err(LinkError::CommandFailed { opcode: op, status }),
        }
    }

    fn default_timeout(&self) -> u32 {
        self.transport.config().default_timeout_ms
    }

    fn check_enabled(&self) -> Result<(), LinkError> {
        if self.enabled {
            Ok(())
        } else {
            Err(LinkError::NotEnabled)
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Pulse reset and wait for the firmware to boot.
    pub fn reset(&mut self) {
        let (pulse, boot) = {
            let c = self.transport.config();
            (c.reset_pulse_ms, c.boot_delay_ms)
        };
        info!("[radio] resetting co-processor");
        let bus = self.transport.bus_mut();
        bus.gpio_write(Line::Gpio0, true);
        bus.gpio_write(Line::ChipSelect, true);
        bus.gpio_write(Line::Reset, false);
        self.transport.platform_mut().delay_ms(pulse);
        self.transport.bus_mut().gpio_write(Line::Reset, true);
        self.transport.platform_mut().delay_ms(boot);
    }

    /// Stop using the link.  Every later exchange reports zero responses.
    pub fn deinit(&mut self) {
        self.enabled = false;
        self.deinited = true;
    }

    pub fn is_deinited(&self) -> bool {
        self.deinited
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled && !self.deinited;
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Last hostname set through this handle; the firmware cannot report it.
    pub fn hostname(&self) -> Result<&str, LinkError> {
        self.check_enabled()?;
        Ok(&self.hostname)
    }

    pub fn set_hostname(&mut self, hostname: &str) -> Result<(), LinkError> {
        if hostname.len() > MAX_HOSTNAME_LENGTH {
            return Err(LinkError::InvalidArgument("hostname too long"));
        }
        let timeout = self.default_timeout();
        self.expect_success(opcode::SET_HOSTNAME, &[hostname.as_bytes()], timeout)?;
        self.hostname = hostname.to_string();
        debug!("[radio] hostname is now {}", hostname);
        Ok(())
    }

    pub fn firmware_version(&mut self) -> Result<String, LinkError> {
        self.check_enabled()?;
        let mut version = [0u8; MAX_FIRMWARE_VERSION_LENGTH];
        let timeout = self.default_timeout();
        let lengths = self.call(opcode::GET_FW_VERSION, &[], &mut [&mut version[..]], timeout)?;
        let len = lengths.first().copied().unwrap_or(0);
        // The firmware NUL-terminates the string.
        let text = &version[..len];
        let text = text.split(|&b| b == 0).next().unwrap_or(text);
        Ok(String::from_utf8_lossy(text).into_owned())
    }

    pub fn mac_address(&mut self) -> Result<[u8; MAC_ADDRESS_LENGTH], LinkError> {
        let mut mac = [0u8; MAC_ADDRESS_LENGTH];
        let timeout = self.default_timeout();
        let lengths = self.call(opcode::GET_MACADDR, &[&[IGNORED]], &mut [&mut mac[..]], timeout)?;
        match lengths.first() {
            Some(&len) if len >= MAC_ADDRESS_LENGTH => Ok(mac),
            _ => Err(LinkError::NoResponse {
                opcode: opcode::GET_MACADDR,
            }),
        }
    }

    pub fn power_management(&self) -> Result<PowerManagement, LinkError> {
        self.check_enabled()?;
        Ok(self.power_management)
    }

    pub fn set_power_management(&mut self, mode: PowerManagement) -> Result<(), LinkError> {
        self.check_enabled()?;
        let raw = match mode {
            PowerManagement::None => 0u8,
            PowerManagement::Min => 1u8,
            PowerManagement::Max => return Err(LinkError::NotImplemented("POWER_MANAGEMENT_MAX")),
        };
        let timeout = self.default_timeout();
        self.expect_success(opcode::SET_POWER_MODE, &[&[raw]], timeout)?;
        self.power_management = mode;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Addressing
    // -----------------------------------------------------------------------

    pub fn address_info(&mut self) -> Result<AddressInfo, LinkError> {
        let mut ip = [0u8; IPV4_LENGTH];
        let mut mask = [0u8; IPV4_LENGTH];
        let mut gw = [0u8; IPV4_LENGTH];
        let timeout = self.default_timeout();
        let lengths = self.call(
            opcode::GET_IPADDR,
            &[&[IGNORED]],
            &mut [&mut ip[..], &mut mask[..], &mut gw[..]],
            timeout,
        )?;
        if lengths.len() != 3 {
            return Err(LinkError::NoResponse {
                opcode: opcode::GET_IPADDR,
            });
        }
        Ok(AddressInfo {
            ipv4: Ipv4Addr::from(ip),
            netmask: Ipv4Addr::from(mask),
            gateway: Ipv4Addr::from(gw),
        })
    }

    /// The station's own IPv4 address.
    pub fn ipv4_address(&mut self) -> Result<Ipv4Addr, LinkError> {
        Ok(self.address_info()?.ipv4)
    }

    /// Non-zero DNS servers, at most two.
    pub fn dns_servers(&mut self) -> Result<Vec<Ipv4Addr>, LinkError> {
        self.check_enabled()?;
        let mut first = [0u8; IPV4_LENGTH];
        let mut second = [0u8; IPV4_LENGTH];
        let timeout = self.default_timeout();
        let lengths = self.call(
            opcode::GET_DNS_CONFIG,
            &[&[IGNORED]],
            &mut [&mut first[..], &mut second[..]],
            timeout,
        )?;
        if lengths.len() != 2 {
            return Ok(Vec::new());
        }
        Ok([first, second]
            .into_iter()
            .map(Ipv4Addr::from)
            .filter(|ip| !ip.is_unspecified())
            .collect())
    }

    /// Switch the station to a static address.
    ///
    /// The firmware takes the gateway before the netmask.  A `dns` server,
    /// when given, is set afterwards with [`Radio::set_dns`].
    pub fn set_ipv4_address(
        &mut self,
        ipv4: Ipv4Addr,
        netmask: Ipv4Addr,
        gateway: Ipv4Addr,
        dns: Option<Ipv4Addr>,
    ) -> Result<(), LinkError> {
        self.check_enabled()?;
        let timeout = self.default_timeout();
        let valid_params = [0u8];
        let (ip, gw, mask) = (ipv4.octets(), gateway.octets(), netmask.octets());
        self.expect_success(opcode::SET_IP_CONFIG, &[&valid_params, &ip, &gw, &mask], timeout)?;
        info!("[radio] static address {} mask {} via {}", ipv4, netmask, gateway);

        if let Some(server) = dns {
            self.set_dns(server)?;
        }
        Ok(())
    }

    pub fn set_dns(&mut self, server: Ipv4Addr) -> Result<(), LinkError> {
        self.check_enabled()?;
        let timeout = self.default_timeout();
        let valid_params = [0u8];
        let dns = server.octets();
        let unused = [0u8; IPV4_LENGTH];
        self.expect_success(opcode::SET_DNS_CONFIG, &[&valid_params, &dns, &unused], timeout)
    }

    // -----------------------------------------------------------------------
    // Association
    // -----------------------------------------------------------------------

    /// Current association status; zero responses mean no co-processor.
    pub fn connection_status(&mut self) -> Result<ConnectionStatus, LinkError> {
        let mut status = [0u8; 1];
        let timeout = self.default_timeout();
        let lengths = self.call(opcode::GET_CONN_STATUS, &[], &mut [&mut status[..]], timeout)?;
        if lengths.is_empty() {
            return Ok(ConnectionStatus::NoShield);
        }
        Ok(ConnectionStatus::from(status[0]))
    }

    pub fn is_connected(&mut self) -> Result<bool, LinkError> {
        Ok(self.connection_status()? == ConnectionStatus::Connected)
    }

    /// Join an access point and wait until associated.
    ///
    /// An empty password selects an open network.  `timeout_ms == 0` uses
    /// [`DEFAULT_JOIN_TIMEOUT_MS`].
    pub fn connect(&mut self, ssid: &str, password: &str, timeout_ms: u32) -> Result<(), JoinError> {
        if ssid.len() > MAX_SSID_LENGTH {
            return Err(LinkError::InvalidArgument("ssid too long").into());
        }
        let timeout = self.default_timeout();
        if password.is_empty() {
            self.expect_success(opcode::SET_NET, &[ssid.as_bytes()], timeout)?;
        } else {
            self.expect_success(opcode::SET_PASSPHRASE, &[ssid.as_bytes(), password.as_bytes()], timeout)?;
        }

        let timeout_ms = if timeout_ms == 0 {
            DEFAULT_JOIN_TIMEOUT_MS
        } else {
            timeout_ms
        };
        let poll = self.transport.config().connect_poll_ms;
        let end = self.now_ms() + timeout_ms as u64;
        while self.now_ms() < end {
            if self.is_interrupted() {
                break;
            }
            self.idle(poll);

            match self.connection_status()? {
                ConnectionStatus::Connected => {
                    info!("[radio] joined {}", ssid);
                    return Ok(());
                }
                ConnectionStatus::NoShield => return Err(JoinError::NoRadio),
                ConnectionStatus::NoSsidAvailable => return Err(JoinError::NoApFound),
                ConnectionStatus::Stopped | ConnectionStatus::Idle | ConnectionStatus::ScanCompleted => {
                    continue
                }
                ConnectionStatus::ConnectFailed
                | ConnectionStatus::ConnectionLost
                | ConnectionStatus::Disconnected => return Err(JoinError::ConnectionFailed),
                ConnectionStatus::Other(raw) => return Err(JoinError::Unspecified(raw)),
            }
        }
        Err(JoinError::TimedOut)
    }

    /// Leave the current access point.
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        let timeout = self.default_timeout();
        self.expect_success(opcode::DISCONNECT, &[&[IGNORED]], timeout)
    }

    /// Details of the associated access point; fields the firmware does not
    /// answer are `None`.
    pub fn network_info(&mut self) -> Result<Option<NetworkInfo>, LinkError> {
        if !self.enabled {
            return Ok(None);
        }
        let timeout = self.default_timeout();

        let mut ssid = [0u8; MAX_SSID_LENGTH];
        let lengths = self.call(opcode::GET_CURR_SSID, &[&[IGNORED]], &mut [&mut ssid[..]], timeout)?;
        let ssid = lengths
            .first()
            .map(|&len| String::from_utf8_lossy(&ssid[..len]).into_owned());

        let mut bssid = [0u8; MAC_ADDRESS_LENGTH];
        let lengths = self.call(opcode::GET_CURR_BSSID, &[&[IGNORED]], &mut [&mut bssid[..]], timeout)?;
        let bssid = lengths.first().map(|_| bssid);

        // RSSI arrives as a little-endian i32.
        let mut rssi = [0u8; 4];
        let lengths = self.call(opcode::GET_CURR_RSSI, &[&[IGNORED]], &mut [&mut rssi[..]], timeout)?;
        let rssi = lengths.first().map(|_| i32::from_le_bytes(rssi));

        let mut enct = [0u8; 1];
        let lengths = self.call(opcode::GET_CURR_ENCT, &[&[IGNORED]], &mut [&mut enct[..]], timeout)?;
        let auth_mode = lengths.first().map(|_| AuthMode::from(enct[0]));

        Ok(Some(NetworkInfo {
            ssid,
            bssid,
            rssi,
            auth_mode,
        }))
    }

    // -----------------------------------------------------------------------
    // Scanning
    // -----------------------------------------------------------------------

    /// Scan for access points, then query each one's details by index.
    ///
    /// The scan completes before this returns; at most
    /// [`MAX_SCANNED_NETWORKS`] are reported.  Details the firmware does not
    /// answer are `None`.
    pub fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>, LinkError> {
        self.check_enabled()?;
        let timeout = self.default_timeout();
        self.expect_success(opcode::START_SCAN_NETWORKS, &[], timeout)?;

        let mut ssids = [[0u8; MAX_SSID_LENGTH]; MAX_SCANNED_NETWORKS];
        let lengths = {
            let mut slots: Vec<&mut [u8]> = ssids.iter_mut().map(|s| &mut s[..]).collect();
            self.call(opcode::SCAN_NETWORKS, &[], &mut slots, SCAN_TIMEOUT_MS)?
        };
        debug!("[radio] scan found {} networks", lengths.len());

        let mut networks = Vec::with_capacity(lengths.len());
        for (index, &len) in lengths.iter().enumerate() {
            let idx = [index as u8];

            let mut bssid = [0u8; MAC_ADDRESS_LENGTH];
            let answered = self.call(opcode::GET_IDX_BSSID, &[&idx], &mut [&mut bssid[..]], timeout)?;
            let bssid = answered.first().map(|_| bssid);

            let mut rssi = [0u8; 4];
            let answered = self.call(opcode::GET_IDX_RSSI, &[&idx], &mut [&mut rssi[..]], timeout)?;
            let rssi = answered.first().map(|_| i32::from_le_bytes(rssi));

            let mut channel = [0u8; 1];
            let answered = self.call(opcode::GET_IDX_CHAN, &[&idx], &mut [&mut channel[..]], timeout)?;
            let channel = answered.first().map(|_| channel[0]);

            let mut enct = [0u8; 1];
            let answered = self.call(opcode::GET_IDX_ENCT, &[&idx], &mut [&mut enct[..]], timeout)?;
            let auth_mode = answered.first().map(|_| AuthMode::from(enct[0]));

            networks.push(ScannedNetwork {
                ssid: String::from_utf8_lossy(&ssids[index][..len]).into_owned(),
                bssid,
                rssi,
                channel,
                auth_mode,
            });
        }
        Ok(networks)
    }

    /// Round-trip time to `ip` in milliseconds, `None` when unanswered.
    pub fn ping(&mut self, ip: Ipv4Addr) -> Result<Option<u16>, LinkError> {
        self.check_enabled()?;
        let mut rtt = [0u8; 2];
        let timeout = self.default_timeout();
        let lengths = self.call(opcode::PING, &[&ip.octets(), &[PING_TTL]], &mut [&mut rtt[..]], timeout)?;
        match lengths.first() {
            // Little-endian, unlike the big-endian frame lengths.
            Some(&len) if len >= 2 => Ok(Some(u16::from_le_bytes(rtt))),
            _ => Ok(None),
        }
    }
}
