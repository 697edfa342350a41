//! Socket factory and name lookup over one shared radio.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use airlift_link::{Bus, Platform};
use log::debug;

use crate::error::SocketError;
use crate::resolver::resolve_ipv4;
use crate::socket::{SharedRadio, Socket};
use crate::state::{AddressFamily, SocketType};
use crate::timeout::PollConfig;

/// One `getaddrinfo` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub family: AddressFamily,
    pub kind: SocketType,
    pub proto: u8,
    pub canonical_name: String,
    pub addr: SocketAddrV4,
}

/// Hands out sockets that all share the same co-processor.
pub struct SocketPool<B: Bus, P: Platform> {
    radio: SharedRadio<B, P>,
    poll: PollConfig,
}

impl<B: Bus, P: Platform> SocketPool<B, P> {
    pub fn new(radio: SharedRadio<B, P>, poll: PollConfig) -> Self {
        Self { radio, poll }
    }

    pub fn radio(&self) -> &SharedRadio<B, P> {
        &self.radio
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Allocate a co-processor socket slot.
    pub fn socket(
        &self,
        family: AddressFamily,
        kind: SocketType,
        proto: u8,
    ) -> Result<Socket<B, P>, SocketError> {
        Socket::allocate(Rc::clone(&self.radio), family, kind, proto, self.poll.clone())
    }

    pub fn gethostbyname(&self, host: &str) -> Result<Ipv4Addr, SocketError> {
        resolve_ipv4(&mut *self.radio.borrow_mut(), host)
    }

    /// The co-processor only knows IPv4 and returns one address, so the
    /// result always has exactly one entry.
    pub fn getaddrinfo(&self, host: &str, port: u16) -> Result<Vec<AddrInfo>, SocketError> {
        let ip = self.gethostbyname(host)?;
        debug!("[resolve] getaddrinfo {}:{} -> {}", host, port, ip);
        Ok(vec![AddrInfo {
            family: AddressFamily::Inet,
            kind: SocketType::Stream,
            proto: 0,
            canonical_name: String::new(),
            addr: SocketAddrV4::new(ip, port),
        }])
    }
}
