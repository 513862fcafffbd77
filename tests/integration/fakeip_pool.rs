//! Fake-IP pool integration tests
//!
//! Exercises allocation, wraparound, reset and pool hot-swap through the
//! public API only.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;

use tun_dns::error::FakeIpError;
use tun_dns::fakeip::FakeIpPool;

// ============================================================================
// Test Helpers
// ============================================================================

fn pool(cidr: &str, max_entries: usize) -> FakeIpPool {
    FakeIpPool::new(cidr.parse().unwrap(), max_entries).unwrap()
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn test_geometry_for_default_range() {
    let pool = pool("198.18.0.0/16", 1000);
    assert_eq!(pool.gateway(), Ipv4Addr::new(198, 18, 0, 1));
    assert_eq!(pool.broadcast(), Ipv4Addr::new(198, 18, 255, 255));
    assert_eq!(pool.range().to_string(), "198.18.0.0/16");
    assert_eq!(pool.address_range().first(), Ipv4Addr::new(198, 18, 0, 4));
}

#[test]
fn test_degenerate_ranges_rejected() {
    for cidr in ["10.0.0.0/30", "10.0.0.0/31", "10.0.0.1/32"] {
        let result = FakeIpPool::new(cidr.parse().unwrap(), 16);
        assert!(
            matches!(result, Err(FakeIpError::InvalidRange { .. })),
            "{cidr} should be rejected"
        );
    }

    let result = FakeIpPool::new("10.0.0.0/24".parse().unwrap(), 0);
    assert!(matches!(result, Err(FakeIpError::InvalidCapacity(0))));
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn test_lookup_is_idempotent_and_normalized() {
    let pool = pool("198.18.0.0/16", 1000);
    let ip = pool.lookup("Example.COM.");
    assert_eq!(pool.lookup("example.com"), ip);
    assert_eq!(pool.look_back(ip).as_deref(), Some("example.com"));
    assert!(pool.exists(ip));
    assert!(pool.contains(ip));
}

#[test]
fn test_bijection_before_wraparound() {
    let pool = pool("10.0.0.0/24", 1000);
    let first = pool.address_range().first();
    let last = pool.broadcast();

    let mut seen = HashSet::new();
    for i in 0..100 {
        let host = format!("host-{i}.example.com");
        let ip = pool.lookup(&host);
        assert!(ip >= first && ip < last, "{ip} outside [{first}, {last})");
        assert!(seen.insert(ip), "{ip} handed out twice");
        assert_eq!(pool.look_back(ip), Some(host));
    }
    assert!(!pool.has_cycled());
}

#[test]
fn test_wraparound_transfers_reverse_mapping() {
    // first = .4, last = .15: eleven addresses per cycle
    let pool = pool("10.0.0.0/28", 1000);
    let first = pool.address_range().first();
    assert_eq!(first, Ipv4Addr::new(10, 0, 0, 4));

    for i in 0..11 {
        pool.lookup(&format!("h{i}"));
    }
    assert!(!pool.has_cycled());

    let ip = pool.lookup("late.example.com");
    assert_eq!(ip, first);
    assert!(pool.has_cycled());
    assert_eq!(pool.look_back(first).as_deref(), Some("late.example.com"));

    // the displaced host gets a fresh address on its next lookup
    let again = pool.lookup("h0");
    assert_ne!(again, first);
    assert_eq!(pool.look_back(again).as_deref(), Some("h0"));
    assert_eq!(pool.look_back(first).as_deref(), Some("late.example.com"));

    let stats = pool.stats().snapshot();
    assert_eq!(stats.wraparounds, 1);
}

#[test]
fn test_capacity_pressure_evicts_oldest() {
    let pool = pool("10.0.0.0/24", 2);
    let a = pool.lookup("a.test");
    let _b = pool.lookup("b.test");
    let _c = pool.lookup("c.test");

    assert_eq!(pool.look_back(a), None);
    let a_again = pool.lookup("a.test");
    assert_ne!(a_again, a);
}

#[test]
fn test_reset_restarts_at_first() {
    let pool = pool("10.0.0.0/28", 1000);
    for i in 0..20 {
        pool.lookup(&format!("h{i}"));
    }
    assert!(pool.has_cycled());

    pool.reset().unwrap();
    assert!(!pool.has_cycled());
    for octet in 4..15 {
        assert!(!pool.exists(Ipv4Addr::new(10, 0, 0, octet)));
    }
    assert_eq!(pool.lookup("fresh"), pool.address_range().first());
}

#[test]
fn test_concurrent_lookups_agree() {
    let pool = Arc::new(pool("198.18.0.0/16", 10_000));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                (0..200)
                    .map(|i| pool.lookup(&format!("svc-{i}.internal")))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<Ipv4Addr>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for other in &results[1..] {
        assert_eq!(other, &results[0]);
    }
    let unique: HashSet<_> = results[0].iter().collect();
    assert_eq!(unique.len(), 200);
}

// ============================================================================
// Hot-swap
// ============================================================================

#[test]
fn test_import_from_carries_mappings() {
    let old = pool("198.18.0.0/16", 1000);
    let ip = old.lookup("api.example.com");

    let new = pool("198.18.0.0/16", 1000);
    new.import_from(&old);
    assert_eq!(new.look_back(ip).as_deref(), Some("api.example.com"));
    assert_eq!(new.lookup("api.example.com"), ip);
}
