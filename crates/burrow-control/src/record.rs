//! Serializable snapshots of sessions, as written to the session store

use burrow_proto::{Remote, TunnelAcl, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRecord {
    pub id: String,
    /// Remote endpoint with the resolved local side
    pub remote: Remote,
    #[serde(default)]
    pub acl: TunnelAcl,
    #[serde(default)]
    pub auto_assigned: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub os: String,
    pub hostname: String,
    pub version: String,
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub address: String,
    pub user: Option<User>,
    pub tunnels: Vec<TunnelRecord>,
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_lost(&self) -> bool {
        self.disconnected_at.is_some()
    }
}
