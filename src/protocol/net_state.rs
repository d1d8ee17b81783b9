//! # Net State Packets
//!
//! Builders and parsers for the control packets nodes exchange to share
//! routes and service capacity.
//!
//! ## Payloads
//! ```text
//! ROUTE:   [addrLen(1)] [addr] [cost(2)]            next hop = packet source
//! SERVICE: [addrLen(1)] [addr] [srvLen(1)] [srv] [capacity(2)]
//! QUERY:   (no payload)
//! ```
//! Cost 0 withdraws a route, capacity 0 withdraws a service.

use crate::core::packet::{Packet, MAX_STRING_LEN, NET_QUERY, NET_ROUTE, NET_SERVICE};
use crate::error::{AlnError, Result};

/// Decoded ROUTE advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAdvert {
    /// Address the route leads to.
    pub address: String,
    /// Node that advertised it.
    pub next_hop: String,
    pub cost: u16,
}

/// Decoded SERVICE advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAdvert {
    /// Node hosting the service.
    pub address: String,
    pub service: String,
    pub capacity: u16,
}

/// Request for the peer's route and service tables.
pub fn query(src: &str) -> Packet {
    Packet {
        net_type: NET_QUERY,
        src_addr: src.to_owned(),
        ..Packet::default()
    }
}

/// Advertise that `address` is reachable through `src` at `cost` hops.
pub fn route(src: &str, address: &str, cost: u16) -> Result<Packet> {
    let mut data = Vec::with_capacity(address.len() + 3);
    put_str(&mut data, "address", address)?;
    data.extend_from_slice(&cost.to_be_bytes());
    Ok(Packet {
        net_type: NET_ROUTE,
        src_addr: src.to_owned(),
        data,
        ..Packet::default()
    })
}

pub fn parse_route(packet: &Packet) -> Result<RouteAdvert> {
    if packet.net_type != NET_ROUTE {
        return Err(AlnError::InvalidNetState(format!(
            "expected ROUTE, got net type {}",
            packet.net_type
        )));
    }
    if packet.src_addr.is_empty() {
        return Err(AlnError::InvalidNetState(
            "ROUTE without a source address".to_string(),
        ));
    }
    let data = &packet.data;
    let (address, rest) = take_str(data, "address")?;
    if rest.len() != 2 {
        return Err(AlnError::InvalidNetState(format!(
            "ROUTE payload is {} bytes, expected {}",
            data.len(),
            data.len() - rest.len() + 2
        )));
    }
    Ok(RouteAdvert {
        address,
        next_hop: packet.src_addr.clone(),
        cost: u16::from_be_bytes([rest[0], rest[1]]),
    })
}

/// Advertise `capacity` for `service` hosted on `address`.
pub fn service(src: &str, address: &str, service: &str, capacity: u16) -> Result<Packet> {
    let mut data = Vec::with_capacity(address.len() + service.len() + 4);
    put_str(&mut data, "address", address)?;
    put_str(&mut data, "service", service)?;
    data.extend_from_slice(&capacity.to_be_bytes());
    Ok(Packet {
        net_type: NET_SERVICE,
        src_addr: src.to_owned(),
        data,
        ..Packet::default()
    })
}

pub fn parse_service(packet: &Packet) -> Result<ServiceAdvert> {
    if packet.net_type != NET_SERVICE {
        return Err(AlnError::InvalidNetState(format!(
            "expected SERVICE, got net type {}",
            packet.net_type
        )));
    }
    let (address, rest) = take_str(&packet.data, "address")?;
    let (service, rest) = take_str(rest, "service")?;
    if rest.len() != 2 {
        return Err(AlnError::InvalidNetState(format!(
            "SERVICE capacity is {} bytes, expected 2",
            rest.len()
        )));
    }
    Ok(ServiceAdvert {
        address,
        service,
        capacity: u16::from_be_bytes([rest[0], rest[1]]),
    })
}

fn put_str(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<()> {
    if s.len() > MAX_STRING_LEN {
        return Err(AlnError::FieldTooLong {
            field,
            len: s.len(),
            max: MAX_STRING_LEN,
        });
    }
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn take_str<'a>(data: &'a [u8], field: &str) -> Result<(String, &'a [u8])> {
    let (&len, rest) = data
        .split_first()
        .ok_or_else(|| AlnError::InvalidNetState(format!("missing {field} length")))?;
    let len = len as usize;
    if rest.len() < len {
        return Err(AlnError::InvalidNetState(format!(
            "{field} needs {len} bytes, {} available",
            rest.len()
        )));
    }
    let (raw, rest) = rest.split_at(len);
    let s = std::str::from_utf8(raw)
        .map_err(|_| AlnError::InvalidNetState(format!("{field} is not valid UTF-8")))?;
    Ok((s.to_owned(), rest))
}
