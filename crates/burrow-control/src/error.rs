//! Control plane errors

use burrow_ports::PortError;
use burrow_proto::RemoteError;
use thiserror::Error;

/// Session repository and store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl From<sea_orm::DbErr> for RepositoryError {
    fn from(err: sea_orm::DbErr) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Storage(format!("record encoding: {}", err))
    }
}

/// Errors surfaced by session and tunnel operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No free port left in pool of {pool_size} ports")]
    PoolExhausted { pool_size: usize },

    #[error("Port occupancy source unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Invalid tunnel specification '{spec}': {reason}")]
    InvalidTunnelSpec { spec: String, reason: String },

    #[error("Local endpoint {local} is already used by tunnel {tunnel_id}")]
    DuplicateBinding { local: String, tunnel_id: String },

    #[error("Session {0} is not connected")]
    NotConnected(String),

    #[error("Failed to bind to {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Tunnel {tunnel_id} not found in session {session_id}")]
    TunnelNotFound {
        session_id: String,
        tunnel_id: String,
    },

    #[error("Session {0} is still active")]
    SessionActive(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SessionError {
    pub(crate) fn invalid_spec(spec: impl ToString, err: RemoteError) -> Self {
        SessionError::InvalidTunnelSpec {
            spec: spec.to_string(),
            reason: err.to_string(),
        }
    }

    /// True when the failure is a lookup miss rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::Repository(RepositoryError::NotFound(_))
                | SessionError::TunnelNotFound { .. }
        )
    }
}

impl From<PortError> for SessionError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::PoolExhausted { pool_size } => SessionError::PoolExhausted { pool_size },
            PortError::ResourceUnavailable(reason) => SessionError::ResourceUnavailable(reason),
            PortError::InvalidSpec { spec, reason } => {
                SessionError::InvalidTunnelSpec { spec, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_errors_keep_their_kind() {
        assert!(matches!(
            SessionError::from(PortError::PoolExhausted { pool_size: 3 }),
            SessionError::PoolExhausted { pool_size: 3 }
        ));
        assert!(matches!(
            SessionError::from(PortError::ResourceUnavailable("down".into())),
            SessionError::ResourceUnavailable(ref reason) if reason == "down"
        ));
    }

    #[test]
    fn test_repository_not_found_passes_through() {
        let err = SessionError::from(RepositoryError::NotFound("abc".into()));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Session not found: abc");
    }
}
