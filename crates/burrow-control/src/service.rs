//! Session orchestration
//!
//! [`SessionService`] ties the port allocator, the session entity and the
//! repository together. Tunnel batches are all-or-nothing: either every
//! requested forward is bound and committed to the session, or none is and
//! every port leased for the batch goes back to the pool.

use burrow_ports::PortAllocator;
use burrow_proto::{ConnectionRequest, Remote, TunnelAcl, User, ALL_INTERFACES};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

use crate::error::SessionError;
use crate::forward;
use crate::repository::SessionRepository;
use crate::session::{ClientSession, TunnelBatch};
use crate::transport::ClientConnection;
use crate::tunnel::Tunnel;

pub struct SessionService {
    allocator: Arc<PortAllocator>,
    repository: Arc<dyn SessionRepository>,
    keep_lost_clients: Option<Duration>,
}

impl SessionService {
    pub fn new(allocator: Arc<PortAllocator>, repository: Arc<dyn SessionRepository>) -> Self {
        Self {
            allocator,
            repository,
            keep_lost_clients: None,
        }
    }

    /// Keep lost sessions for the given time instead of deleting them on disconnect
    pub fn with_keep_lost_clients(mut self, keep: Option<Duration>) -> Self {
        self.keep_lost_clients = keep;
        self
    }

    pub fn keep_lost_clients(&self) -> Option<Duration> {
        self.keep_lost_clients
    }

    pub fn allocator(&self) -> &Arc<PortAllocator> {
        &self.allocator
    }

    /// Build a session for a newly connected client, open the tunnels it asked
    /// for and persist it. Nothing is persisted when any step fails.
    pub async fn start_client_session(
        &self,
        context: CancellationToken,
        session_id: impl Into<String>,
        connection: Arc<dyn ClientConnection>,
        request: &ConnectionRequest,
        user: Option<User>,
        span: Span,
    ) -> Result<Arc<ClientSession>, SessionError> {
        let session = Arc::new(
            ClientSession::new(session_id, connection, request)
                .with_user(user)
                .with_context(context)
                .with_span(span),
        );

        self.start_session_tunnels(&session, &request.remotes, &TunnelAcl::new())
            .await?;

        if let Err(e) = self.repository.save(session.clone()).await {
            self.release_ports(session.stop_tunnels().await);
            return Err(e.into());
        }

        info!(
            parent: session.span(),
            name = session.name(),
            hostname = session.hostname(),
            "Client session started"
        );
        Ok(session)
    }

    /// Open one tunnel per remote, in request order.
    ///
    /// The allocator is refreshed once for the whole batch. Remotes without a
    /// local port get one from the allocator, bound on all interfaces. The
    /// first failure aborts the batch and rolls it back.
    pub async fn start_session_tunnels(
        &self,
        session: &ClientSession,
        remotes: &[Remote],
        acl: &TunnelAcl,
    ) -> Result<Vec<Arc<Tunnel>>, SessionError> {
        let mut batch = session.begin_batch().await;
        // Checked under the tunnel lock: disconnecting takes the same lock
        let connection = session
            .connection()
            .ok_or_else(|| SessionError::NotConnected(session.id().to_string()))?;

        self.allocator.refresh().await?;

        let mut leased = Vec::new();

        let filled = self
            .fill_batch(&mut batch, remotes, acl, &mut leased)
            .await;

        match filled {
            Ok(listeners) => {
                let tunnels = batch.commit();
                for (tunnel, listener) in listeners {
                    forward::spawn(listener, tunnel, connection.clone(), session.span().clone());
                }
                Ok(tunnels)
            }
            Err(e) => {
                drop(batch);
                self.release_ports(leased);
                warn!(parent: session.span(), "Tunnel batch rolled back: {}", e);
                Err(e)
            }
        }
    }

    async fn fill_batch(
        &self,
        batch: &mut TunnelBatch<'_>,
        remotes: &[Remote],
        acl: &TunnelAcl,
        leased: &mut Vec<u16>,
    ) -> Result<Vec<(Arc<Tunnel>, TcpListener)>, SessionError> {
        let mut listeners = Vec::with_capacity(remotes.len());

        for remote in remotes {
            let (resolved, auto_assigned) = if remote.is_local_specified() {
                (remote.clone(), false)
            } else {
                let port = self.allocator.get_random_port()?;
                leased.push(port);
                (remote.clone().with_local(ALL_INTERFACES, port), true)
            };

            let tunnel = batch.start_tunnel(resolved, acl.clone(), auto_assigned)?;
            let listener = forward::bind(&tunnel).await?;
            listeners.push((tunnel, listener));
        }

        Ok(listeners)
    }

    /// End a session: stop its tunnels, drop the connection handle, then delete
    /// it or keep it as lost depending on the retention policy.
    pub async fn terminate(&self, session: &Arc<ClientSession>) -> Result<(), SessionError> {
        let _lifecycle = session.lock_lifecycle().await;
        self.release_ports(session.disconnect(Utc::now()).await);
        session.close();

        match self.keep_lost_clients {
            None => {
                self.repository.delete(session.id()).await?;
                info!(parent: session.span(), "Client session deleted");
            }
            Some(keep) => {
                self.repository.save(session.clone()).await?;
                info!(parent: session.span(), "Client session lost, kept for {:?}", keep);
            }
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, SessionError> {
        Ok(self.repository.count().await?)
    }

    pub async fn get_active_by_id(&self, id: &str) -> Result<Arc<ClientSession>, SessionError> {
        Ok(self.repository.get_active_by_id(id).await?)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Arc<ClientSession>, SessionError> {
        Ok(self.repository.get_by_id(id).await?)
    }

    pub async fn get_all(&self) -> Result<Vec<Arc<ClientSession>>, SessionError> {
        Ok(self.repository.get_all().await?)
    }

    /// Open tunnels on a live session and persist the result
    pub async fn open_tunnels(
        &self,
        session: &Arc<ClientSession>,
        remotes: &[Remote],
        acl: &TunnelAcl,
    ) -> Result<Vec<Arc<Tunnel>>, SessionError> {
        let _lifecycle = session.lock_lifecycle().await;
        let tunnels = self.start_session_tunnels(session, remotes, acl).await?;
        self.repository.save(session.clone()).await?;
        Ok(tunnels)
    }

    /// Close one tunnel of a live session and persist the result
    pub async fn close_tunnel(
        &self,
        session: &Arc<ClientSession>,
        tunnel_id: &str,
    ) -> Result<(), SessionError> {
        let _lifecycle = session.lock_lifecycle().await;
        if !session.is_active() {
            return Err(SessionError::NotConnected(session.id().to_string()));
        }

        let tunnel = session
            .remove_tunnel(tunnel_id)
            .await
            .ok_or_else(|| SessionError::TunnelNotFound {
                session_id: session.id().to_string(),
                tunnel_id: tunnel_id.to_string(),
            })?;
        if let Some(port) = tunnel.take_lease() {
            self.allocator.release(port);
        }

        self.repository.save(session.clone()).await?;
        Ok(())
    }

    /// Delete the record of a lost session
    pub async fn forget(&self, id: &str) -> Result<(), SessionError> {
        let session = self.repository.get_by_id(id).await?;
        if session.is_active() {
            return Err(SessionError::SessionActive(id.to_string()));
        }
        self.repository.delete(id).await?;
        info!(parent: session.span(), "Lost session forgotten");
        Ok(())
    }

    /// Delete lost sessions older than the retention window
    pub async fn delete_obsolete(&self) -> Result<usize, SessionError> {
        let Some(keep) = self.keep_lost_clients else {
            return Ok(0);
        };
        let deleted = self.repository.delete_obsolete(keep).await?;
        if deleted > 0 {
            info!("Deleted {} obsolete lost sessions", deleted);
        }
        Ok(deleted)
    }

    fn release_ports(&self, ports: Vec<u16>) {
        for port in ports {
            self.allocator.release(port);
        }
        debug!(leased = self.allocator.leased_count(), "Released tunnel ports");
    }
}
