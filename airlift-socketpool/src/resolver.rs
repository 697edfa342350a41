//! Hostname resolution, done by the co-processor.
//!
//! Two commands: `REQ_HOST_BY_NAME` hands over the literal host (a numeric
//! dotted quad is parsed remotely too) and answers a status byte, then
//! `GET_HOST_BY_NAME` fetches the four address bytes of the last lookup.
//! Whichever step fails, the caller sees the same "name not resolved".

use std::net::Ipv4Addr;

use airlift_link::command::{IPV4_LENGTH, MAX_HOSTNAME_LENGTH};
use airlift_link::{opcode, Bus, LinkError, Platform, Radio};
use log::debug;

use crate::error::SocketError;

/// Resolve `host` to an IPv4 address.
pub fn resolve_ipv4<B: Bus, P: Platform>(
    radio: &mut Radio<B, P>,
    host: &str,
) -> Result<Ipv4Addr, SocketError> {
    if host.len() > MAX_HOSTNAME_LENGTH {
        return Err(SocketError::InvalidArgument("hostname too long"));
    }
    if host.is_empty() {
        return Err(SocketError::NameNotResolved);
    }

    match lookup(radio, host) {
        Ok(Some(ip)) => {
            debug!("[resolve] {} -> {}", host, ip);
            Ok(ip)
        }
        Ok(None) => {
            debug!("[resolve] {} not found", host);
            Err(SocketError::NameNotResolved)
        }
        Err(err) => {
            debug!("[resolve] {} failed: {}", host, err);
            Err(SocketError::NameNotResolved)
        }
    }
}

fn lookup<B: Bus, P: Platform>(
    radio: &mut Radio<B, P>,
    host: &str,
) -> Result<Option<Ipv4Addr>, LinkError> {
    let timeout = radio.config().default_timeout_ms;

    if radio.call_status(opcode::REQ_HOST_BY_NAME, &[host.as_bytes()], timeout)? == 0 {
        return Ok(None);
    }

    let mut ip = [0u8; IPV4_LENGTH];
    let lengths = radio.call(opcode::GET_HOST_BY_NAME, &[], &mut [&mut ip[..]], timeout)?;
    match lengths.first() {
        Some(&IPV4_LENGTH) => Ok(Some(Ipv4Addr::from(ip))),
        _ => Ok(None),
    }
}
