//! Local port management for tunnel listeners
//!
//! - [`PortPool`]: the set of ports eligible for auto-assignment, parsed from
//!   `used` / `excluded` port specs such as `20000-30000` or `8080`
//! - [`PortOccupancy`]: the authoritative source of ports already bound on the host
//! - [`PortAllocator`]: hands out random free ports from the pool, refreshed
//!   against the occupancy source once per allocation batch

pub mod allocator;
pub mod occupancy;
pub mod pool;

pub use allocator::{PortAllocator, DEFAULT_REFRESH_TIMEOUT};
pub use occupancy::{ListenerProbe, PortOccupancy, StaticOccupancy};
pub use pool::PortPool;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("No free port left in pool of {pool_size} ports")]
    PoolExhausted { pool_size: usize },

    #[error("Port occupancy source unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Invalid port specification '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
}
