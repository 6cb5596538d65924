//! Messages exchanged when a client connects

use serde::{Deserialize, Serialize};

use crate::Remote;

/// What a client declares about itself when its transport connection is established
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    /// Forwards the client wants opened as soon as it is connected
    #[serde(default)]
    pub remotes: Vec<Remote>,
}

/// Authenticated principal that established a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_request_defaults() {
        let req: ConnectionRequest =
            serde_json::from_str(r#"{"name":"edge-1","remotes":[{"remote_host":"127.0.0.1","remote_port":22}]}"#)
                .unwrap();

        assert_eq!(req.name, "edge-1");
        assert!(req.tags.is_empty());
        assert_eq!(req.remotes.len(), 1);
        assert!(!req.remotes[0].is_local_specified());
    }

    #[test]
    fn test_user_serialization() {
        let user = User {
            username: "admin".to_string(),
            groups: vec!["Administrators".to_string()],
        };
        let json = serde_json::to_string(&user).unwrap();
        let decoded: User = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, user);
    }
}
