//! A single forward opened on a session

use burrow_proto::{Remote, TunnelAcl};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::record::TunnelRecord;

/// A forward from a server-side listening endpoint to a client-side endpoint.
///
/// Tunnels are only created through a session, which guarantees the local side
/// is resolved and unique within that session. The tunnel's token stops its
/// listener and every connection relayed through it.
#[derive(Debug)]
pub struct Tunnel {
    id: String,
    remote: Remote,
    acl: TunnelAcl,
    auto_assigned: bool,
    created_at: DateTime<Utc>,
    token: CancellationToken,
    /// Set while an auto-assigned port is held by this tunnel
    lease: AtomicBool,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl Tunnel {
    pub(crate) fn new(
        id: String,
        remote: Remote,
        acl: TunnelAcl,
        auto_assigned: bool,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            remote,
            acl,
            auto_assigned,
            created_at: Utc::now(),
            token,
            lease: AtomicBool::new(auto_assigned),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Rebuild a tunnel from its stored form. Restored tunnels are history
    /// only: their token is already cancelled.
    pub(crate) fn from_record(record: TunnelRecord) -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            id: record.id,
            remote: record.remote,
            acl: record.acl,
            auto_assigned: record.auto_assigned,
            created_at: record.created_at,
            token,
            lease: AtomicBool::new(false),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The forward, with its local side resolved
    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn acl(&self) -> &TunnelAcl {
        &self.acl
    }

    /// Whether the local port came from the allocator
    pub fn is_auto_assigned(&self) -> bool {
        self.auto_assigned
    }

    pub fn local_port(&self) -> u16 {
        self.remote.local_port.unwrap_or_default()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Stop the listener and all relayed connections
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Give up the auto-assigned port, once
    pub(crate) fn take_lease(&self) -> Option<u16> {
        self.lease
            .swap(false, Ordering::AcqRel)
            .then(|| self.local_port())
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn accepted_connections(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected_connections(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn to_record(&self) -> TunnelRecord {
        TunnelRecord {
            id: self.id.clone(),
            remote: self.remote.clone(),
            acl: self.acl.clone(),
            auto_assigned: self.auto_assigned,
            created_at: self.created_at,
        }
    }
}
