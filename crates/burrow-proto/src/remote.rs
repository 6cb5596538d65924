//! Forward specifications requested by clients
//!
//! A [`Remote`] maps an endpoint reachable from the client (`remote_host:remote_port`)
//! to a listening endpoint on the server (`local_host:local_port`). The local side
//! is optional in a request; the server assigns a port when it is missing.
//!
//! String form: `[local_host:][local_port:]remote_host:remote_port`
//!
//! - `3000` -> remote 127.0.0.1:3000, local port assigned by the server
//! - `db.internal:5432` -> remote db.internal:5432, local port assigned
//! - `15432:db.internal:5432` -> local 0.0.0.0:15432
//! - `127.0.0.1:15432:db.internal:5432` -> local 127.0.0.1:15432
//! - `[::1]:15432:[fd00::5]:5432` -> IPv6 hosts go in brackets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

/// Bind address used when the local host is not given
pub const ALL_INTERFACES: &str = "0.0.0.0";

/// Remote host used when a spec only names a port
pub const DEFAULT_REMOTE_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Invalid forward specification '{spec}': {reason}")]
    Parse { spec: String, reason: String },

    #[error("Remote host cannot be empty")]
    EmptyRemoteHost,

    #[error("Remote port cannot be 0")]
    ZeroRemotePort,

    #[error("Local port is not assigned")]
    MissingLocalPort,

    #[error("Local port cannot be 0")]
    ZeroLocalPort,

    #[error("Local host must be an IP address, got '{0}'")]
    InvalidLocalHost(String),
}

/// One requested forward
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Remote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,
    pub remote_host: String,
    pub remote_port: u16,
}

impl Remote {
    /// A forward to `remote_host:remote_port` with the local side left to the server
    pub fn new(remote_host: impl Into<String>, remote_port: u16) -> Self {
        Self {
            local_host: None,
            local_port: None,
            remote_host: remote_host.into(),
            remote_port,
        }
    }

    /// Pin the local side of the forward
    pub fn with_local(mut self, local_host: impl Into<String>, local_port: u16) -> Self {
        self.local_host = Some(local_host.into());
        self.local_port = Some(local_port);
        self
    }

    /// Whether the client asked for a specific local port
    pub fn is_local_specified(&self) -> bool {
        self.local_port.is_some()
    }

    /// Local bind host, defaulting to all interfaces
    pub fn local_host(&self) -> &str {
        self.local_host.as_deref().unwrap_or(ALL_INTERFACES)
    }

    /// `host:port` of the client-side endpoint
    pub fn remote_addr(&self) -> String {
        join_host_port(&self.remote_host, self.remote_port)
    }

    /// Check the spec is complete enough to bind and forward
    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.remote_host.trim().is_empty() {
            return Err(RemoteError::EmptyRemoteHost);
        }
        if self.remote_port == 0 {
            return Err(RemoteError::ZeroRemotePort);
        }
        match self.local_port {
            None => return Err(RemoteError::MissingLocalPort),
            Some(0) => return Err(RemoteError::ZeroLocalPort),
            Some(_) => {}
        }
        self.local_ip()?;
        Ok(())
    }

    /// Parsed local bind address
    pub fn local_ip(&self) -> Result<IpAddr, RemoteError> {
        match &self.local_host {
            None => Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            Some(host) => host
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .map_err(|_| RemoteError::InvalidLocalHost(host.clone())),
        }
    }

    /// Local socket address, once the spec is valid
    pub fn local_socket_addr(&self) -> Result<SocketAddr, RemoteError> {
        let port = self.local_port.ok_or(RemoteError::MissingLocalPort)?;
        Ok(SocketAddr::new(self.local_ip()?, port))
    }

    /// Whether two local bindings would collide on the same machine
    pub fn local_conflicts_with(&self, other: &Remote) -> bool {
        if self.local_port.is_none() || self.local_port != other.local_port {
            return false;
        }
        match (self.local_ip(), other.local_ip()) {
            (Ok(a), Ok(b)) => a == b || a.is_unspecified() || b.is_unspecified(),
            _ => self.local_host() == other.local_host(),
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    format!("{}:{}", bracket_host(host), port)
}

fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

fn parse_error(spec: &str, reason: impl Into<String>) -> RemoteError {
    RemoteError::Parse {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_port(spec: &str, value: &str, what: &str) -> Result<u16, RemoteError> {
    value
        .parse::<u16>()
        .map_err(|_| parse_error(spec, format!("invalid {}: '{}'", what, value)))
}

/// Split on `:`, keeping a `[...]` segment whole and without its brackets
fn split_spec(spec: &str) -> Result<Vec<&str>, RemoteError> {
    let mut parts = Vec::new();
    let mut rest = spec;
    loop {
        if let Some(inner) = rest.strip_prefix('[') {
            let end = inner
                .find(']')
                .ok_or_else(|| parse_error(spec, "unclosed '['"))?;
            parts.push(&inner[..end]);
            rest = &inner[end + 1..];
            if rest.is_empty() {
                return Ok(parts);
            }
            rest = rest
                .strip_prefix(':')
                .ok_or_else(|| parse_error(spec, "expected ':' after ']'"))?;
        } else {
            match rest.split_once(':') {
                Some((part, next)) => {
                    parts.push(part);
                    rest = next;
                }
                None => {
                    parts.push(rest);
                    return Ok(parts);
                }
            }
        }
    }
}

impl FromStr for Remote {
    type Err = RemoteError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parts = split_spec(spec.trim())?;

        let remote = match parts.as_slice() {
            [remote_port] => Remote::new(
                DEFAULT_REMOTE_HOST,
                parse_port(spec, remote_port, "remote port")?,
            ),
            [remote_host, remote_port] => Remote::new(
                *remote_host,
                parse_port(spec, remote_port, "remote port")?,
            ),
            [local_port, remote_host, remote_port] => {
                let mut remote = Remote::new(
                    *remote_host,
                    parse_port(spec, remote_port, "remote port")?,
                );
                remote.local_port = Some(parse_port(spec, local_port, "local port")?);
                remote
            }
            [local_host, local_port, remote_host, remote_port] => Remote::new(
                *remote_host,
                parse_port(spec, remote_port, "remote port")?,
            )
            .with_local(*local_host, parse_port(spec, local_port, "local port")?),
            _ => {
                return Err(parse_error(
                    spec,
                    "expected [local_host:][local_port:]remote_host:remote_port",
                ))
            }
        };

        if remote.remote_host.is_empty() {
            return Err(RemoteError::EmptyRemoteHost);
        }
        Ok(remote)
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(port) = self.local_port {
            write!(f, "{}:{}:", bracket_host(self.local_host()), port)?;
        }
        write!(f, "{}", self.remote_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_only() {
        let remote: Remote = "3000".parse().unwrap();
        assert_eq!(remote.remote_host, "127.0.0.1");
        assert_eq!(remote.remote_port, 3000);
        assert!(!remote.is_local_specified());
    }

    #[test]
    fn test_parse_host_and_port() {
        let remote: Remote = "db.internal:5432".parse().unwrap();
        assert_eq!(remote.remote_host, "db.internal");
        assert_eq!(remote.remote_port, 5432);
        assert_eq!(remote.local_host, None);
        assert_eq!(remote.local_port, None);
    }

    #[test]
    fn test_parse_with_local_port() {
        let remote: Remote = "15432:db.internal:5432".parse().unwrap();
        assert_eq!(remote.local_port, Some(15432));
        assert_eq!(remote.local_host(), ALL_INTERFACES);
        assert!(remote.is_local_specified());
    }

    #[test]
    fn test_parse_full_form() {
        let remote: Remote = "127.0.0.1:15432:db.internal:5432".parse().unwrap();
        assert_eq!(remote.local_host.as_deref(), Some("127.0.0.1"));
        assert_eq!(remote.local_port, Some(15432));
        assert_eq!(remote.to_string(), "127.0.0.1:15432:db.internal:5432");
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let remote: Remote = "[::1]:8080:db:5432".parse().unwrap();
        assert_eq!(remote.local_host.as_deref(), Some("::1"));
        assert_eq!(remote.local_port, Some(8080));
        assert_eq!(remote.remote_host, "db");
        assert_eq!(remote.remote_port, 5432);
        assert!(remote.validate().is_ok());
        assert_eq!(remote.to_string(), "[::1]:8080:db:5432");
        assert_eq!(remote.to_string().parse::<Remote>().unwrap(), remote);

        let remote: Remote = "15432:[fd00::5]:5432".parse().unwrap();
        assert_eq!(remote.remote_host, "fd00::5");
        assert_eq!(remote.remote_addr(), "[fd00::5]:5432");

        assert!(matches!(
            "[::1:8080:db:5432".parse::<Remote>(),
            Err(RemoteError::Parse { .. })
        ));
        assert!(matches!(
            "[::1]8080:db:5432".parse::<Remote>(),
            Err(RemoteError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "abc".parse::<Remote>(),
            Err(RemoteError::Parse { .. })
        ));
        assert!(matches!(
            "a:b:c:d:e".parse::<Remote>(),
            Err(RemoteError::Parse { .. })
        ));
        assert!(matches!(
            ":80".parse::<Remote>(),
            Err(RemoteError::EmptyRemoteHost)
        ));
        assert!(matches!(
            "70000:host:80".parse::<Remote>(),
            Err(RemoteError::Parse { .. })
        ));
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            Remote::new("host", 80).validate(),
            Err(RemoteError::MissingLocalPort)
        );
        assert_eq!(
            Remote::new("host", 0).with_local("0.0.0.0", 8080).validate(),
            Err(RemoteError::ZeroRemotePort)
        );
        assert_eq!(
            Remote::new("", 80).with_local("0.0.0.0", 8080).validate(),
            Err(RemoteError::EmptyRemoteHost)
        );
        assert_eq!(
            Remote::new("host", 80).with_local("example.com", 8080).validate(),
            Err(RemoteError::InvalidLocalHost("example.com".to_string()))
        );
        assert!(Remote::new("host", 80)
            .with_local("::1", 8080)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_local_conflicts() {
        let any = Remote::new("a", 80).with_local("0.0.0.0", 8080);
        let loopback = Remote::new("b", 81).with_local("127.0.0.1", 8080);
        let other_ip = Remote::new("c", 82).with_local("127.0.0.2", 8080);
        let other_port = Remote::new("d", 83).with_local("127.0.0.1", 8081);

        assert!(any.local_conflicts_with(&loopback));
        assert!(loopback.local_conflicts_with(&any));
        assert!(!loopback.local_conflicts_with(&other_ip));
        assert!(!loopback.local_conflicts_with(&other_port));
    }

    #[test]
    fn test_remote_addr_brackets_ipv6() {
        assert_eq!(Remote::new("::1", 22).remote_addr(), "[::1]:22");
        assert_eq!(Remote::new("host", 22).remote_addr(), "host:22");
    }
}
