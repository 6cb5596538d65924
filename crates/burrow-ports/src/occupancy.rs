//! Sources of truth for which ports are already bound

use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, TcpListener};

use crate::PortError;

/// Reports which of the candidate ports are currently bound on the host.
///
/// Implementations may block; the allocator calls them from the blocking pool.
pub trait PortOccupancy: Send + Sync {
    fn busy_ports(&self, candidates: &[u16]) -> Result<HashSet<u16>, PortError>;
}

/// Probes each candidate by trying to bind it.
///
/// A port that cannot be bound, because another socket holds it or because the
/// process lacks the privilege, counts as busy.
#[derive(Debug, Clone)]
pub struct ListenerProbe {
    bind_ip: IpAddr,
}

impl ListenerProbe {
    pub fn new() -> Self {
        Self::with_bind_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    pub fn with_bind_ip(bind_ip: IpAddr) -> Self {
        Self { bind_ip }
    }
}

impl Default for ListenerProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl PortOccupancy for ListenerProbe {
    fn busy_ports(&self, candidates: &[u16]) -> Result<HashSet<u16>, PortError> {
        let mut busy = HashSet::new();
        for &port in candidates {
            match TcpListener::bind((self.bind_ip, port)) {
                Ok(_listener) => {}
                Err(e) if matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) => {
                    busy.insert(port);
                }
                Err(e) => {
                    return Err(PortError::ResourceUnavailable(format!(
                        "probing {}:{} failed: {}",
                        self.bind_ip, port, e
                    )))
                }
            }
        }
        Ok(busy)
    }
}

/// A fixed set of busy ports, for hosts where another registry owns port bookkeeping
#[derive(Debug, Clone, Default)]
pub struct StaticOccupancy {
    busy: HashSet<u16>,
}

impl StaticOccupancy {
    pub fn new(busy: impl IntoIterator<Item = u16>) -> Self {
        Self {
            busy: busy.into_iter().collect(),
        }
    }
}

impl PortOccupancy for StaticOccupancy {
    fn busy_ports(&self, candidates: &[u16]) -> Result<HashSet<u16>, PortError> {
        Ok(candidates
            .iter()
            .copied()
            .filter(|port| self.busy.contains(port))
            .collect())
    }
}
