//! IP and CIDR normalization
//!
//! Every string pushed to an address book goes through [`normalize`]. The
//! sync engine uses it to narrow the fetched list to IPv4, and the group
//! syncer uses it again right before the remote call, so both sides agree
//! on the canonical text.

use ipnet::{IpNet, Ipv4Net};
use std::net::IpAddr;

/// Outcome of normalizing one raw IP or CIDR string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedIp {
    /// IPv4 address or IPv4 network, in canonical form
    V4(String),
    /// Valid address or network that cannot be expressed as IPv4
    NotV4(String),
    /// Not an IP address or CIDR block
    Invalid,
}

impl NormalizedIp {
    /// Canonical text, if the input was valid
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::V4(s) | Self::NotV4(s) => Some(s),
            Self::Invalid => None,
        }
    }

    /// Whether the input parsed at all
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Whether the input is IPv4
    pub fn is_ipv4(&self) -> bool {
        matches!(self, Self::V4(_))
    }

    /// The canonical IPv4 text, dropping everything else
    pub fn into_ipv4(self) -> Option<String> {
        match self {
            Self::V4(s) => Some(s),
            _ => None,
        }
    }
}

/// Normalize a raw IP literal or CIDR block
///
/// - CIDR input is truncated to its network address (`10.0.0.1/24`
///   becomes `10.0.0.0/24`).
/// - IPv4-mapped IPv6 input (`::ffff:1.2.3.4`) is rewritten as IPv4.
/// - Input is not trimmed; surrounding whitespace makes it invalid.
pub fn normalize(raw: &str) -> NormalizedIp {
    if raw.contains('/') {
        return match raw.parse::<IpNet>() {
            Ok(IpNet::V4(net)) => NormalizedIp::V4(net.trunc().to_string()),
            Ok(IpNet::V6(net)) => {
                let mapped = net.addr().to_ipv4_mapped();
                match mapped {
                    Some(addr) if net.prefix_len() >= 96 => {
                        match Ipv4Net::new(addr, net.prefix_len() - 96) {
                            Ok(v4) => NormalizedIp::V4(v4.trunc().to_string()),
                            Err(_) => NormalizedIp::Invalid,
                        }
                    }
                    _ => NormalizedIp::NotV4(net.trunc().to_string()),
                }
            }
            Err(_) => NormalizedIp::Invalid,
        };
    }

    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => NormalizedIp::V4(addr.to_string()),
        Ok(IpAddr::V6(addr)) => match addr.to_ipv4_mapped() {
            Some(v4) => NormalizedIp::V4(v4.to_string()),
            None => NormalizedIp::NotV4(addr.to_string()),
        },
        Err(_) => NormalizedIp::Invalid,
    }
}

/// Keep only the canonical IPv4 forms of `ips`, preserving order
///
/// Skipped entries are logged at debug level.
pub fn ipv4_only<'a, I>(ips: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    ips.into_iter()
        .filter_map(|raw| match normalize(raw) {
            NormalizedIp::V4(canonical) => Some(canonical),
            NormalizedIp::NotV4(_) => {
                tracing::debug!(ip = raw, "Skipping non-IPv4 entry");
                None
            }
            NormalizedIp::Invalid => {
                tracing::debug!(ip = raw, "Skipping unparseable entry");
                None
            }
        })
        .collect()
}
