//! Source address allow list
//!
//! Gates the check-run endpoint by caller address. Entries are single
//! addresses or CIDR networks, IPv4 or IPv6.

use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, PartialEq)]
enum AllowEntry {
    Addr(IpAddr),
    Network { base: IpAddr, prefix: u8 },
}

impl AllowEntry {
    fn contains(&self, addr: IpAddr) -> bool {
        match *self {
            Self::Addr(allowed) => allowed == addr,
            Self::Network { base, prefix } => match (base, addr) {
                (IpAddr::V4(b), IpAddr::V4(a)) => {
                    prefix_matches(u32::from(b).into(), u32::from(a).into(), prefix, 32)
                }
                (IpAddr::V6(b), IpAddr::V6(a)) => {
                    prefix_matches(u128::from(b), u128::from(a), prefix, 128)
                }
                (IpAddr::V6(b), IpAddr::V4(a)) => {
                    prefix_matches(u128::from(b), u128::from(a.to_ipv6_mapped()), prefix, 128)
                }
                _ => false,
            },
        }
    }
}

fn prefix_matches(base: u128, addr: u128, prefix: u8, width: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(width - prefix);
    (base >> shift) == (addr >> shift)
}

/// IPv4-mapped IPv6 addresses compare as IPv4
fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

fn parse_entry(raw: &str) -> Result<AllowEntry> {
    let invalid = || ApiError::config(format!("invalid allow list entry '{}'", raw));

    match raw.split_once('/') {
        Some((addr, prefix)) => {
            let base = IpAddr::from_str(addr.trim()).map_err(|_| invalid())?;
            let prefix: u8 = prefix.trim().parse().map_err(|_| invalid())?;
            let width = if base.is_ipv4() { 32 } else { 128 };
            if prefix > width {
                return Err(invalid());
            }
            // Networks keep the family they were written in; callers are
            // normalized, so v6 networks compare v4 callers in mapped form
            Ok(AllowEntry::Network { base, prefix })
        }
        None => Ok(AllowEntry::Addr(normalize(
            IpAddr::from_str(raw).map_err(|_| invalid())?,
        ))),
    }
}

/// Permitted caller addresses, loaded once at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowList {
    entries: Vec<AllowEntry>,
}

impl AllowList {
    /// Parse a comma-separated list of addresses and CIDR networks
    ///
    /// Blank entries (e.g. a trailing comma) are skipped.
    pub fn parse(list: &str) -> Result<Self> {
        let entries = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(parse_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a caller address may reach the relay
    pub fn permits(&self, addr: IpAddr) -> bool {
        let addr = normalize(addr);
        self.entries.iter().any(|entry| entry.contains(addr))
    }
}

/// Determine the caller address for allow-list checks
///
/// `X-Real-IP` wins when present and the peer may set it; a header that does
/// not parse as an address yields `None` and the caller is denied.
///
/// With `trusted_proxies` unset the header is honoured from any peer, which
/// only holds up behind a proxy that overwrites it. With a list, the header
/// from any other peer is ignored and the peer address is used.
pub fn client_addr(
    x_real_ip: Option<&str>,
    peer: IpAddr,
    trusted_proxies: Option<&AllowList>,
) -> Option<IpAddr> {
    let honour_header = trusted_proxies.map_or(true, |proxies| proxies.permits(peer));

    match x_real_ip {
        Some(header) if honour_header => IpAddr::from_str(header.trim()).ok(),
        _ => Some(peer),
    }
}
