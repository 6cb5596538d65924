//! Control plane for client sessions and their tunnels
//!
//! A [`SessionService`] turns an established client connection into a
//! [`ClientSession`], opens the tunnels the client asked for (assigning local
//! ports from a [`burrow_ports::PortAllocator`] when needed) and persists the
//! session through a [`SessionRepository`]. When the client goes away the
//! session is either deleted or kept as a lost session, depending on the
//! retention policy.

pub mod cleanup;
pub mod error;
pub mod forward;
pub mod handler;
pub mod record;
pub mod repository;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;
pub mod tunnel;

pub use cleanup::spawn_obsolete_sweeper;
pub use error::{RepositoryError, SessionError};
pub use handler::ClientConnectionHandler;
pub use record::{SessionRecord, TunnelRecord};
pub use repository::{ClientSessionRepository, SessionRepository};
pub use service::SessionService;
pub use session::{ClientSession, TunnelBatch};
pub use store::{DbSessionStore, SessionStore};
pub use transport::{ChannelStream, ClientConnection, DirectConnection, TransportError};
pub use tunnel::Tunnel;
