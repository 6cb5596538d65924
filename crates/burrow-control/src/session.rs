//! Client sessions

use burrow_proto::{ConnectionRequest, Remote, TunnelAcl, User};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Span};

use crate::error::SessionError;
use crate::record::SessionRecord;
use crate::transport::ClientConnection;
use crate::tunnel::Tunnel;

#[derive(Debug, Default)]
struct TunnelSet {
    tunnels: Vec<Arc<Tunnel>>,
    last_id: u64,
}

/// Connection handle and disconnection time, updated together
#[derive(Debug)]
struct Link {
    connection: Option<Arc<dyn ClientConnection>>,
    disconnected_at: Option<DateTime<Utc>>,
}

/// One connected (or lost) client.
///
/// A session is live while it holds a connection handle and has no
/// disconnection time. It becomes lost exactly once, through
/// [`ClientSession::mark_disconnected`], and never comes back.
#[derive(Debug)]
pub struct ClientSession {
    id: String,
    name: String,
    tags: Vec<String>,
    os: String,
    hostname: String,
    version: String,
    ipv4: Vec<String>,
    ipv6: Vec<String>,
    address: String,
    user: Option<User>,
    span: Span,
    context: CancellationToken,
    link: Mutex<Link>,
    tunnels: AsyncMutex<TunnelSet>,
    lifecycle: AsyncMutex<()>,
}

impl ClientSession {
    pub fn new(
        id: impl Into<String>,
        connection: Arc<dyn ClientConnection>,
        request: &ConnectionRequest,
    ) -> Self {
        let id = id.into();
        let address = connection.remote_address().to_string();
        let span = info_span!("client_session", session_id = %id, addr = %address);

        Self {
            id,
            name: request.name.clone(),
            tags: request.tags.clone(),
            os: request.os.clone(),
            hostname: request.hostname.clone(),
            version: request.version.clone(),
            ipv4: request.ipv4.clone(),
            ipv6: request.ipv6.clone(),
            address,
            user: None,
            span,
            context: CancellationToken::new(),
            link: Mutex::new(Link {
                connection: Some(connection),
                disconnected_at: None,
            }),
            tunnels: AsyncMutex::new(TunnelSet::default()),
            lifecycle: AsyncMutex::new(()),
        }
    }

    pub fn with_user(mut self, user: Option<User>) -> Self {
        self.user = user;
        self
    }

    /// Tie the session to an execution context; cancelling it ends the session
    pub fn with_context(mut self, context: CancellationToken) -> Self {
        self.context = context;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Rebuild a session from its stored form, as a lost session.
    ///
    /// Records that were still marked connected are stamped disconnected now.
    pub fn from_record(record: SessionRecord) -> Self {
        let span = info_span!("client_session", session_id = %record.id, addr = %record.address);
        let context = CancellationToken::new();
        context.cancel();

        let last_id = record
            .tunnels
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let tunnels = record
            .tunnels
            .into_iter()
            .map(|t| Arc::new(Tunnel::from_record(t)))
            .collect();

        Self {
            id: record.id,
            name: record.name,
            tags: record.tags,
            os: record.os,
            hostname: record.hostname,
            version: record.version,
            ipv4: record.ipv4,
            ipv6: record.ipv6,
            address: record.address,
            user: record.user,
            span,
            context,
            link: Mutex::new(Link {
                connection: None,
                disconnected_at: Some(record.disconnected_at.unwrap_or_else(Utc::now)),
            }),
            tunnels: AsyncMutex::new(TunnelSet { tunnels, last_id }),
            lifecycle: AsyncMutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn ipv4(&self) -> &[String] {
        &self.ipv4
    }

    pub fn ipv6(&self) -> &[String] {
        &self.ipv6
    }

    /// Transport-level remote address
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn context(&self) -> &CancellationToken {
        &self.context
    }

    /// Ask whoever owns the session's lifetime to end it
    pub fn close(&self) {
        self.context.cancel();
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection(&self) -> Option<Arc<dyn ClientConnection>> {
        self.link().connection.clone()
    }

    pub fn is_active(&self) -> bool {
        let link = self.link();
        link.connection.is_some() && link.disconnected_at.is_none()
    }

    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.link().disconnected_at
    }

    /// Transition to lost. Drops the connection handle and returns it; returns
    /// `None` if the session was already lost.
    pub fn mark_disconnected(&self, at: DateTime<Utc>) -> Option<Arc<dyn ClientConnection>> {
        let mut link = self.link();
        if link.disconnected_at.is_some() {
            return None;
        }
        link.disconnected_at = Some(at);
        let connection = link.connection.take();
        debug!(parent: &self.span, disconnected_at = %at, "Session marked disconnected");
        connection
    }

    /// Held across a tunnel change and its persistence, and across termination
    pub(crate) async fn lock_lifecycle(&self) -> AsyncMutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Mark the session lost and stop its tunnels under the tunnel lock, so a
    /// batch waiting on that lock sees the session as gone.
    /// Returns the auto-assigned ports that are no longer in use.
    pub async fn disconnect(&self, at: DateTime<Utc>) -> Vec<u16> {
        let set = self.tunnels.lock().await;
        self.mark_disconnected(at);
        self.stop_set(&set)
    }

    /// Lock the tunnel set for a batch of tunnel starts
    pub async fn begin_batch(&self) -> TunnelBatch<'_> {
        let set = self.tunnels.lock().await;
        let first_id = set.last_id;
        TunnelBatch {
            session: self,
            set,
            pending: Vec::new(),
            first_id,
            committed: false,
        }
    }

    /// Validate and add one tunnel whose local side is already resolved
    pub async fn start_tunnel(
        &self,
        remote: Remote,
        acl: TunnelAcl,
    ) -> Result<Arc<Tunnel>, SessionError> {
        let mut batch = self.begin_batch().await;
        let tunnel = batch.start_tunnel(remote, acl, false)?;
        batch.commit();
        Ok(tunnel)
    }

    pub async fn tunnels(&self) -> Vec<Arc<Tunnel>> {
        self.tunnels.lock().await.tunnels.clone()
    }

    pub async fn tunnel(&self, tunnel_id: &str) -> Option<Arc<Tunnel>> {
        self.tunnels
            .lock()
            .await
            .tunnels
            .iter()
            .find(|t| t.id() == tunnel_id)
            .cloned()
    }

    /// Remove a tunnel and stop its listener
    pub async fn remove_tunnel(&self, tunnel_id: &str) -> Option<Arc<Tunnel>> {
        let mut set = self.tunnels.lock().await;
        let index = set.tunnels.iter().position(|t| t.id() == tunnel_id)?;
        let tunnel = set.tunnels.remove(index);
        tunnel.stop();
        info!(parent: &self.span, tunnel_id, "Tunnel closed");
        Some(tunnel)
    }

    /// Stop every tunnel listener, keeping the tunnels as history.
    /// Returns the auto-assigned ports that are no longer in use.
    pub async fn stop_tunnels(&self) -> Vec<u16> {
        let set = self.tunnels.lock().await;
        self.stop_set(&set)
    }

    fn stop_set(&self, set: &TunnelSet) -> Vec<u16> {
        let mut ports = Vec::new();
        for tunnel in &set.tunnels {
            tunnel.stop();
            if let Some(port) = tunnel.take_lease() {
                ports.push(port);
            }
        }
        if !set.tunnels.is_empty() {
            debug!(parent: &self.span, count = set.tunnels.len(), "Stopped tunnels");
        }
        ports
    }

    pub async fn to_record(&self) -> SessionRecord {
        let tunnels = self
            .tunnels
            .lock()
            .await
            .tunnels
            .iter()
            .map(|t| t.to_record())
            .collect();

        SessionRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
            os: self.os.clone(),
            hostname: self.hostname.clone(),
            version: self.version.clone(),
            ipv4: self.ipv4.clone(),
            ipv6: self.ipv6.clone(),
            address: self.address.clone(),
            user: self.user.clone(),
            tunnels,
            disconnected_at: self.disconnected_at(),
        }
    }
}

/// Tunnels started under one hold of the session's tunnel lock.
///
/// Started tunnels stay pending until [`TunnelBatch::commit`]; dropping the
/// batch without committing stops them and leaves the session's tunnel set
/// as it was.
pub struct TunnelBatch<'a> {
    session: &'a ClientSession,
    set: AsyncMutexGuard<'a, TunnelSet>,
    pending: Vec<Arc<Tunnel>>,
    first_id: u64,
    committed: bool,
}

impl TunnelBatch<'_> {
    /// Validate addressing, reject local bindings already used in this
    /// session (committed or pending) and register the tunnel as pending.
    pub fn start_tunnel(
        &mut self,
        remote: Remote,
        acl: TunnelAcl,
        auto_assigned: bool,
    ) -> Result<Arc<Tunnel>, SessionError> {
        remote
            .validate()
            .map_err(|e| SessionError::invalid_spec(&remote, e))?;

        if let Some(existing) = self
            .set
            .tunnels
            .iter()
            .chain(self.pending.iter())
            .find(|t| !t.is_stopped() && t.remote().local_conflicts_with(&remote))
        {
            return Err(SessionError::DuplicateBinding {
                local: format!("{}:{}", remote.local_host(), remote.local_port.unwrap_or(0)),
                tunnel_id: existing.id().to_string(),
            });
        }

        self.set.last_id += 1;
        let tunnel = Arc::new(Tunnel::new(
            self.set.last_id.to_string(),
            remote,
            acl,
            auto_assigned,
            self.session.context.child_token(),
        ));
        self.pending.push(tunnel.clone());
        Ok(tunnel)
    }

    pub fn pending(&self) -> &[Arc<Tunnel>] {
        &self.pending
    }

    /// Make the pending tunnels part of the session, in start order
    pub fn commit(mut self) -> Vec<Arc<Tunnel>> {
        self.committed = true;
        let tunnels = std::mem::take(&mut self.pending);
        for tunnel in &tunnels {
            let local = format!("{}:{}", tunnel.remote().local_host(), tunnel.local_port());
            info!(
                parent: &self.session.span,
                tunnel_id = tunnel.id(),
                local = %local,
                remote = %tunnel.remote().remote_addr(),
                auto_assigned = tunnel.is_auto_assigned(),
                "Tunnel started"
            );
        }
        self.set.tunnels.extend(tunnels.iter().cloned());
        tunnels
    }
}

impl Drop for TunnelBatch<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for tunnel in &self.pending {
            tunnel.stop();
        }
        self.set.last_id = self.first_id;
        if !self.pending.is_empty() {
            debug!(
                parent: &self.session.span,
                count = self.pending.len(),
                "Discarded pending tunnels"
            );
        }
    }
}
