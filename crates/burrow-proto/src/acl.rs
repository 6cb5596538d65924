//! Tunnel access control lists
//!
//! A [`TunnelAcl`] restricts which callers may connect to a tunnel's local
//! listener. Entries are individual addresses (`192.168.1.100`) or CIDR
//! ranges (`10.0.0.0/8`, `2001:db8::/32`). An empty ACL places no
//! restriction beyond network reachability.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// ACL parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("Invalid IP address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),
}

/// One permitted caller network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    fn max_prefix(addr: &IpAddr) -> u8 {
        match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Check if an IP address is contained in this network
    pub fn contains(&self, ip: &IpAddr) -> bool {
        if self.prefix_len == 0 {
            return self.addr.is_ipv4() == ip.is_ipv4();
        }
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(test)) => {
                let mask = !0u32 << (32 - self.prefix_len);
                (u32::from(net) & mask) == (u32::from(*test) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(test)) => {
                let mask = !0u128 << (128 - self.prefix_len);
                (u128::from(net) & mask) == (u128::from(*test) & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNetwork {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((ip, prefix)) => {
                let addr =
                    IpAddr::from_str(ip).map_err(|_| AclError::InvalidIpAddress(s.to_string()))?;
                let prefix_len = prefix
                    .parse::<u8>()
                    .map_err(|_| AclError::InvalidCidr(s.to_string()))?;
                if prefix_len > Self::max_prefix(&addr) {
                    return Err(AclError::InvalidCidr(s.to_string()));
                }
                Ok(Self { addr, prefix_len })
            }
            None => {
                let addr =
                    IpAddr::from_str(s).map_err(|_| AclError::InvalidIpAddress(s.to_string()))?;
                Ok(Self {
                    prefix_len: Self::max_prefix(&addr),
                    addr,
                })
            }
        }
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix_len == Self::max_prefix(&self.addr) {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}/{}", self.addr, self.prefix_len)
        }
    }
}

/// Access control list attached to a tunnel.
///
/// Serialized as a plain list of strings; entries are validated on
/// deserialization, so a stored ACL is always usable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct TunnelAcl {
    networks: Vec<IpNetwork>,
}

impl TunnelAcl {
    /// An ACL with no restriction
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an ACL from address / CIDR strings
    pub fn from_allowlist<I, S>(entries: I) -> Result<Self, AclError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    /// Returns true if the ACL is empty or the address matches an entry
    pub fn is_allowed(&self, ip: &IpAddr) -> bool {
        self.networks.is_empty() || self.networks.iter().any(|n| n.contains(ip))
    }

    pub fn is_socket_allowed(&self, addr: &SocketAddr) -> bool {
        self.is_allowed(&addr.ip())
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Normalized entries, e.g. `["10.0.0.0/8", "192.168.1.1"]`
    pub fn entries(&self) -> Vec<String> {
        self.networks.iter().map(ToString::to_string).collect()
    }
}

impl TryFrom<Vec<String>> for TunnelAcl {
    type Error = AclError;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_allowlist(entries)
    }
}

impl From<TunnelAcl> for Vec<String> {
    fn from(acl: TunnelAcl) -> Self {
        acl.entries()
    }
}
