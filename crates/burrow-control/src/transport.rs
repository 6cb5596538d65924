//! Transport seam between the control plane and connected clients
//!
//! The control plane never speaks a wire protocol itself. It needs four things
//! from a client connection: where it came from, a way to notice it went away,
//! a way to close it, and a way to open a byte channel that the client connects
//! to one of its own endpoints. [`ClientConnection`] captures exactly that.

use async_trait::async_trait;
use burrow_proto::Remote;
use std::fmt::Debug;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Client refused channel to {remote}: {reason}")]
    ChannelRejected { remote: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A bidirectional byte channel to a client-side endpoint
pub trait ChannelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ChannelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A live connection to one client
#[async_trait]
pub trait ClientConnection: Send + Sync + Debug {
    /// Get the remote peer address
    fn remote_address(&self) -> SocketAddr;

    /// Open a channel that the client connects to `remote_host:remote_port`
    async fn open_channel(&self, remote: &Remote) -> Result<Box<dyn ChannelStream>, TransportError>;

    /// Close the connection
    async fn close(&self, reason: &str);

    /// Resolves once the connection is closed, from either side
    async fn closed(&self);

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A client living on the server host itself: channels are plain TCP dials
/// from the server to the remote endpoint.
#[derive(Debug)]
pub struct DirectConnection {
    remote_addr: SocketAddr,
    closed: CancellationToken,
}

impl DirectConnection {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl ClientConnection for DirectConnection {
    fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }

    async fn open_channel(&self, remote: &Remote) -> Result<Box<dyn ChannelStream>, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let target = remote.remote_addr();
        let stream = TcpStream::connect(&target).await?;
        debug!("Direct channel opened to {}", target);
        Ok(Box::new(stream))
    }

    async fn close(&self, reason: &str) {
        if !self.closed.is_cancelled() {
            info!("Closing direct connection from {}: {}", self.remote_addr, reason);
            self.closed.cancel();
        }
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
