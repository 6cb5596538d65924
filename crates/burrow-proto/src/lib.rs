//! Shared data types for the reverse-tunnel broker
//!
//! Forward specifications, tunnel ACLs and the connection request a client
//! declares when it connects. Used by the control plane, the store and the API.

pub mod acl;
pub mod messages;
pub mod remote;

pub use acl::{AclError, IpNetwork, TunnelAcl};
pub use messages::{ConnectionRequest, User};
pub use remote::{Remote, RemoteError, ALL_INTERFACES, DEFAULT_REMOTE_HOST};
