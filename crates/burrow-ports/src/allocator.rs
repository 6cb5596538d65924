//! Random port allocation with refresh-then-allocate batches
//!
//! A batch calls [`PortAllocator::refresh`] once, then [`PortAllocator::get_random_port`]
//! for each port it needs. Ports handed out stay leased until
//! [`PortAllocator::release`], and every refresh snapshot keeps the leased set on
//! top of what the occupancy source reports. Two batches running concurrently
//! therefore never receive the same port, even if one refreshes between the
//! other's allocation and the moment its listener is bound.

use rand::seq::IteratorRandom;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{PortError, PortOccupancy, PortPool};

/// Upper bound for one occupancy query unless configured otherwise
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct AllocatorState {
    /// Busy ports reported by the occupancy source at the last refresh
    busy: HashSet<u16>,
    /// Ports handed out and not yet released
    leased: HashSet<u16>,
}

pub struct PortAllocator {
    pool: PortPool,
    occupancy: Arc<dyn PortOccupancy>,
    refresh_timeout: Duration,
    state: Mutex<AllocatorState>,
}

impl PortAllocator {
    pub fn new(pool: PortPool, occupancy: Arc<dyn PortOccupancy>) -> Self {
        info!("Port allocator pool: {} ports", pool.len());
        Self {
            pool,
            occupancy,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PortPool {
        &self.pool
    }

    fn state(&self) -> MutexGuard<'_, AllocatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resynchronize the busy set with the occupancy source.
    ///
    /// The query runs on the blocking pool and is abandoned after the refresh
    /// timeout; both a failed and a timed-out query leave the previous snapshot
    /// in place and report `ResourceUnavailable`.
    pub async fn refresh(&self) -> Result<(), PortError> {
        let occupancy = self.occupancy.clone();
        // Leased ports are never probed: their owner may be binding them right now.
        let candidates: Vec<u16> = {
            let state = self.state();
            self.pool
                .iter()
                .filter(|port| !state.leased.contains(port))
                .collect()
        };
        let query = tokio::task::spawn_blocking(move || occupancy.busy_ports(&candidates));

        let busy = match tokio::time::timeout(self.refresh_timeout, query).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                return Err(PortError::ResourceUnavailable(format!(
                    "occupancy query panicked: {}",
                    join_error
                )))
            }
            Err(_) => {
                warn!(
                    "Port occupancy query did not finish within {:?}",
                    self.refresh_timeout
                );
                return Err(PortError::ResourceUnavailable(format!(
                    "occupancy query timed out after {:?}",
                    self.refresh_timeout
                )));
            }
        };

        let mut state = self.state();
        debug!(
            busy = busy.len(),
            leased = state.leased.len(),
            "Refreshed port occupancy"
        );
        state.busy = busy;
        Ok(())
    }

    /// Lease a random port that is neither busy nor already leased
    pub fn get_random_port(&self) -> Result<u16, PortError> {
        let mut state = self.state();
        let port = self
            .pool
            .iter()
            .filter(|port| !state.busy.contains(port) && !state.leased.contains(port))
            .choose(&mut rand::thread_rng())
            .ok_or(PortError::PoolExhausted {
                pool_size: self.pool.len(),
            })?;

        state.leased.insert(port);
        debug!(port, "Leased port");
        Ok(port)
    }

    /// Return a leased port to the pool. Returns false if the port was not leased.
    pub fn release(&self, port: u16) -> bool {
        let released = self.state().leased.remove(&port);
        if released {
            debug!(port, "Released port");
        }
        released
    }

    pub fn is_leased(&self, port: u16) -> bool {
        self.state().leased.contains(&port)
    }

    pub fn leased_count(&self) -> usize {
        self.state().leased.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticOccupancy;

    struct FailingOccupancy;

    impl PortOccupancy for FailingOccupancy {
        fn busy_ports(&self, _candidates: &[u16]) -> Result<HashSet<u16>, PortError> {
            Err(PortError::ResourceUnavailable("netstat unavailable".to_string()))
        }
    }

    struct SlowOccupancy;

    impl PortOccupancy for SlowOccupancy {
        fn busy_ports(&self, _candidates: &[u16]) -> Result<HashSet<u16>, PortError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(HashSet::new())
        }
    }

    fn allocator(range: std::ops::RangeInclusive<u16>, busy: &[u16]) -> PortAllocator {
        PortAllocator::new(
            PortPool::from_range(range).unwrap(),
            Arc::new(StaticOccupancy::new(busy.iter().copied())),
        )
    }

    #[tokio::test]
    async fn test_allocates_only_free_ports() {
        let allocator = allocator(40000..=40004, &[40000, 40002]);
        allocator.refresh().await.unwrap();

        let mut ports = vec![
            allocator.get_random_port().unwrap(),
            allocator.get_random_port().unwrap(),
            allocator.get_random_port().unwrap(),
        ];
        ports.sort_unstable();
        assert_eq!(ports, vec![40001, 40003, 40004]);

        assert_eq!(
            allocator.get_random_port(),
            Err(PortError::PoolExhausted { pool_size: 5 })
        );
    }

    #[tokio::test]
    async fn test_release_returns_port_to_pool() {
        let allocator = allocator(40000..=40000, &[]);
        allocator.refresh().await.unwrap();

        let port = allocator.get_random_port().unwrap();
        assert!(allocator.is_leased(port));
        assert!(allocator.get_random_port().is_err());

        assert!(allocator.release(port));
        assert!(!allocator.release(port));
        assert_eq!(allocator.get_random_port().unwrap(), port);
    }

    #[tokio::test]
    async fn test_refresh_keeps_leases() {
        let allocator = allocator(40000..=40001, &[]);
        allocator.refresh().await.unwrap();
        let first = allocator.get_random_port().unwrap();

        allocator.refresh().await.unwrap();
        let second = allocator.get_random_port().unwrap();

        assert_ne!(first, second);
        assert_eq!(allocator.leased_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_resource_unavailable() {
        let allocator = PortAllocator::new(
            PortPool::from_range(40000..=40010).unwrap(),
            Arc::new(FailingOccupancy),
        );
        assert!(matches!(
            allocator.refresh().await,
            Err(PortError::ResourceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_is_bounded_by_timeout() {
        let allocator = PortAllocator::new(
            PortPool::from_range(40000..=40010).unwrap(),
            Arc::new(SlowOccupancy),
        )
        .with_refresh_timeout(Duration::from_millis(20));

        let err = allocator.refresh().await.unwrap_err();
        assert!(matches!(err, PortError::ResourceUnavailable(ref msg) if msg.contains("timed out")));
    }
}
