//! Concurrent allocation batches against one allocator

use burrow_ports::{PortAllocator, PortPool, StaticOccupancy};
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_never_share_a_port() {
    const BATCHES: usize = 16;
    const PER_BATCH: usize = 5;

    let busy_before: Vec<u16> = (41000..41020).collect();
    let allocator = Arc::new(PortAllocator::new(
        PortPool::from_range(41000..=41199).unwrap(),
        Arc::new(StaticOccupancy::new(busy_before.iter().copied())),
    ));

    let mut handles = Vec::new();
    for _ in 0..BATCHES {
        let allocator = allocator.clone();
        handles.push(tokio::spawn(async move {
            allocator.refresh().await.unwrap();
            let mut ports = Vec::new();
            for _ in 0..PER_BATCH {
                ports.push(allocator.get_random_port().unwrap());
                tokio::task::yield_now().await;
            }
            ports
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    let unique: HashSet<u16> = all.iter().copied().collect();
    assert_eq!(unique.len(), BATCHES * PER_BATCH, "a port was handed out twice");
    assert!(unique.iter().all(|port| !busy_before.contains(port)));
    assert_eq!(allocator.leased_count(), BATCHES * PER_BATCH);
}

#[tokio::test]
async fn test_exhaustion_after_concurrent_leases() {
    let allocator = Arc::new(PortAllocator::new(
        PortPool::from_range(41500..=41509).unwrap(),
        Arc::new(StaticOccupancy::default()),
    ));
    allocator.refresh().await.unwrap();

    let mut leased = Vec::new();
    while let Ok(port) = allocator.get_random_port() {
        leased.push(port);
    }
    assert_eq!(leased.len(), 10);

    allocator.release(leased[3]);
    allocator.refresh().await.unwrap();
    assert_eq!(allocator.get_random_port().unwrap(), leased[3]);
}
