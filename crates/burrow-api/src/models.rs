use burrow_control::{ClientSession, Tunnel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Client is connected
    Connected,
    /// Client is gone; the session is kept until the retention window expires
    Lost,
}

/// Tunnel information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TunnelInfo {
    /// Tunnel identifier, unique within its session
    pub id: String,
    /// Forward in `local_host:local_port:remote_host:remote_port` form
    pub spec: String,
    pub local_host: String,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    /// Allowed caller networks; empty means unrestricted
    pub acl: Vec<String>,
    /// Whether the local port was assigned by the server
    pub auto_assigned: bool,
    pub created_at: DateTime<Utc>,
    pub accepted_connections: u64,
    pub rejected_connections: u64,
}

impl From<&Tunnel> for TunnelInfo {
    fn from(tunnel: &Tunnel) -> Self {
        let remote = tunnel.remote();
        Self {
            id: tunnel.id().to_string(),
            spec: remote.to_string(),
            local_host: remote.local_host().to_string(),
            local_port: tunnel.local_port(),
            remote_host: remote.remote_host.clone(),
            remote_port: remote.remote_port,
            acl: tunnel.acl().entries(),
            auto_assigned: tunnel.is_auto_assigned(),
            created_at: tunnel.created_at(),
            accepted_connections: tunnel.accepted_connections(),
            rejected_connections: tunnel.rejected_connections(),
        }
    }
}

/// Client session information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub os: String,
    pub hostname: String,
    pub version: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    /// Transport-level remote address
    pub address: String,
    /// User that established the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
    pub tunnels: Vec<TunnelInfo>,
}

impl SessionInfo {
    pub async fn from_session(session: &ClientSession) -> Self {
        let tunnels = session
            .tunnels()
            .await
            .iter()
            .map(|t| TunnelInfo::from(t.as_ref()))
            .collect();

        Self {
            id: session.id().to_string(),
            name: session.name().to_string(),
            tags: session.tags().to_vec(),
            os: session.os().to_string(),
            hostname: session.hostname().to_string(),
            version: session.version().to_string(),
            ipv4: session.ipv4().to_vec(),
            ipv6: session.ipv6().to_vec(),
            address: session.address().to_string(),
            username: session.user().map(|u| u.username.clone()),
            status: if session.is_active() {
                SessionStatus::Connected
            } else {
                SessionStatus::Lost
            },
            disconnected_at: session.disconnected_at(),
            tunnels,
        }
    }
}

/// List of sessions
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionList {
    pub sessions: Vec<SessionInfo>,
    pub total: usize,
}

/// Request to open tunnels on a connected session
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenTunnelsRequest {
    /// Forwards as `[local_host:][local_port:]remote_host:remote_port`
    pub remotes: Vec<String>,
    /// Allowed caller addresses or CIDR ranges
    #[serde(default)]
    pub acl: Vec<String>,
}

/// Tunnels opened by a request, in request order
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenTunnelsResponse {
    pub tunnels: Vec<TunnelInfo>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Sessions known to the server, connected or lost
    pub sessions: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
