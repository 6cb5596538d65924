//! Tunnel listeners
//!
//! Each committed tunnel owns one TCP listener on its local endpoint. Every
//! accepted connection is checked against the tunnel ACL and, when allowed,
//! relayed through a channel opened on the client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use crate::error::SessionError;
use crate::transport::ClientConnection;
use crate::tunnel::Tunnel;

/// Bind the tunnel's local endpoint
pub async fn bind(tunnel: &Tunnel) -> Result<TcpListener, SessionError> {
    let addr = tunnel
        .remote()
        .local_socket_addr()
        .map_err(|e| SessionError::invalid_spec(tunnel.remote(), e))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| SessionError::Bind {
            address: addr.to_string(),
            reason: e.to_string(),
        })
}

/// Run the accept loop until the tunnel is stopped
pub fn spawn(
    listener: TcpListener,
    tunnel: Arc<Tunnel>,
    connection: Arc<dyn ClientConnection>,
    span: Span,
) -> JoinHandle<()> {
    tokio::spawn(serve(listener, tunnel, connection).instrument(span))
}

async fn serve(listener: TcpListener, tunnel: Arc<Tunnel>, connection: Arc<dyn ClientConnection>) {
    let local_addr = listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| tunnel.remote().to_string());
    info!(tunnel_id = tunnel.id(), "Tunnel listening on {}", local_addr);

    loop {
        tokio::select! {
            _ = tunnel.token().cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer_addr)) => {
                    if !tunnel.acl().is_socket_allowed(&peer_addr) {
                        tunnel.record_rejected();
                        warn!(
                            tunnel_id = tunnel.id(),
                            "Rejected connection from {}: not in tunnel ACL",
                            peer_addr
                        );
                        continue;
                    }

                    tunnel.record_accepted();
                    tokio::spawn(
                        relay(socket, peer_addr, tunnel.clone(), connection.clone())
                            .in_current_span(),
                    );
                }
                Err(e) => {
                    warn!(tunnel_id = tunnel.id(), "Failed to accept connection: {}", e);
                }
            }
        }
    }

    info!(tunnel_id = tunnel.id(), "Tunnel listener on {} stopped", local_addr);
}

async fn relay(
    mut socket: TcpStream,
    peer_addr: SocketAddr,
    tunnel: Arc<Tunnel>,
    connection: Arc<dyn ClientConnection>,
) {
    let mut channel = match connection.open_channel(tunnel.remote()).await {
        Ok(channel) => channel,
        Err(e) => {
            warn!(
                tunnel_id = tunnel.id(),
                "Failed to open channel to {} for {}: {}",
                tunnel.remote().remote_addr(),
                peer_addr,
                e
            );
            return;
        }
    };

    tokio::select! {
        _ = tunnel.token().cancelled() => {
            debug!(tunnel_id = tunnel.id(), "Relay for {} cancelled", peer_addr);
        }
        result = tokio::io::copy_bidirectional(&mut socket, &mut channel) => match result {
            Ok((to_client, to_caller)) => debug!(
                tunnel_id = tunnel.id(),
                bytes_to_client = to_client,
                bytes_to_caller = to_caller,
                "Relay for {} completed",
                peer_addr
            ),
            Err(e) => debug!(tunnel_id = tunnel.id(), "Relay for {} ended: {}", peer_addr, e),
        }
    }
}
