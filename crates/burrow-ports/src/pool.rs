//! Port pool configuration
//!
//! The pool is the set of `used` ports minus the set of `excluded` ports.
//! Each spec is either a single port (`8080`) or an inclusive range (`20000-30000`).

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::PortError;

/// Ports eligible for auto-assignment, sorted ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPool {
    ports: Arc<[u16]>,
}

impl PortPool {
    /// Parse a pool from used and excluded port specs
    pub fn parse<S: AsRef<str>>(used: &[S], excluded: &[S]) -> Result<Self, PortError> {
        let mut ports = BTreeSet::new();
        for spec in used {
            ports.extend(parse_spec(spec.as_ref())?);
        }
        for spec in excluded {
            for port in parse_spec(spec.as_ref())? {
                ports.remove(&port);
            }
        }

        if ports.is_empty() {
            return Err(PortError::InvalidSpec {
                spec: used
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join(","),
                reason: "no ports left after exclusions".to_string(),
            });
        }

        Ok(Self {
            ports: ports.into_iter().collect(),
        })
    }

    /// A pool covering one inclusive range
    pub fn from_range(range: RangeInclusive<u16>) -> Result<Self, PortError> {
        if range.is_empty() || *range.start() == 0 {
            return Err(PortError::InvalidSpec {
                spec: format!("{}-{}", range.start(), range.end()),
                reason: "range must be non-empty and start above 0".to_string(),
            });
        }
        Ok(Self {
            ports: range.collect(),
        })
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.binary_search(&port).is_ok()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }
}

fn invalid(spec: &str, reason: impl Into<String>) -> PortError {
    PortError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}

fn parse_port(spec: &str, value: &str) -> Result<u16, PortError> {
    let port = value
        .trim()
        .parse::<u16>()
        .map_err(|_| invalid(spec, format!("'{}' is not a port number", value.trim())))?;
    if port == 0 {
        return Err(invalid(spec, "port 0 is not allowed"));
    }
    Ok(port)
}

fn parse_spec(spec: &str) -> Result<RangeInclusive<u16>, PortError> {
    match spec.split_once('-') {
        Some((start, end)) => {
            let start = parse_port(spec, start)?;
            let end = parse_port(spec, end)?;
            if start > end {
                return Err(invalid(spec, "start port must not exceed end port"));
            }
            Ok(start..=end)
        }
        None => {
            let port = parse_port(spec, spec)?;
            Ok(port..=port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_and_single_ports() {
        let pool = PortPool::parse(&["20000-20009", "30000"], &[]).unwrap();
        assert_eq!(pool.len(), 11);
        assert!(pool.contains(20000));
        assert!(pool.contains(20009));
        assert!(pool.contains(30000));
        assert!(!pool.contains(20010));
    }

    #[test]
    fn test_excluded_ports_are_removed() {
        let pool = PortPool::parse(&["1-2000"], &["1-1024", "1500"]).unwrap();
        assert_eq!(pool.len(), 2000 - 1024 - 1);
        assert!(!pool.contains(80));
        assert!(!pool.contains(1500));
        assert!(pool.contains(1025));
    }

    #[test]
    fn test_invalid_specs() {
        assert!(matches!(
            PortPool::parse(&["abc"], &[]),
            Err(PortError::InvalidSpec { .. })
        ));
        assert!(matches!(
            PortPool::parse(&["3000-2000"], &[]),
            Err(PortError::InvalidSpec { .. })
        ));
        assert!(matches!(
            PortPool::parse(&["0-10"], &[]),
            Err(PortError::InvalidSpec { .. })
        ));
        assert!(matches!(
            PortPool::parse(&["100-200"], &["1-65535"]),
            Err(PortError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_from_range() {
        let pool = PortPool::from_range(40000..=40004).unwrap();
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![40000, 40001, 40002, 40003, 40004]);
        assert!(PortPool::from_range(0..=10).is_err());
    }
}
