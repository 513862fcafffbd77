//! Fake-IP ring allocator
//!
//! [`FakeIpPool`] hands out addresses from an [`AddressRange`] in order,
//! wrapping to the start of the range once the end is reached. After the
//! first wrap every allocation takes its address over from whatever host held
//! it before: the newest claimant always wins and allocation never fails.
//!
//! All state (allocator cursor and store) sits behind one mutex, so lookups,
//! allocations and reverse lookups are linearized.
//!
//! # Takeover asymmetry
//!
//! A takeover deletes the reverse entry of the displaced host but leaves its
//! forward entry in place. The pool only trusts a forward entry whose reverse
//! entry still names the same host, so the displaced host gets a fresh address
//! on its next lookup. Short DNS TTLs keep clients from holding on to the
//! recycled address in between.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::range::AddressRange;
use super::store::{FakeIpStore, MemoryStore};
use crate::error::FakeIpError;

/// Statistics for the fake-IP pool
#[derive(Debug, Default)]
pub struct FakeIpStats {
    /// New addresses handed out
    allocations: AtomicU64,
    /// Lookups answered from an existing mapping
    hits: AtomicU64,
    /// Allocations that displaced another host
    takeovers: AtomicU64,
    /// Times the cursor wrapped to the start of the range
    wraparounds: AtomicU64,
    /// Reverse lookups
    look_backs: AtomicU64,
}

impl FakeIpStats {
    /// Get a snapshot of current stats
    #[must_use]
    pub fn snapshot(&self) -> FakeIpStatsSnapshot {
        FakeIpStatsSnapshot {
            allocations: self.allocations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            takeovers: self.takeovers.load(Ordering::Relaxed),
            wraparounds: self.wraparounds.load(Ordering::Relaxed),
            look_backs: self.look_backs.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeIpStatsSnapshot {
    pub allocations: u64,
    pub hits: u64,
    pub takeovers: u64,
    pub wraparounds: u64,
    pub look_backs: u64,
}

/// Allocator cursor and backing store, guarded together
#[derive(Debug)]
struct PoolState {
    /// Last address handed out, `first - 1` when nothing has been allocated
    offset: u32,
    /// Set once the cursor has wrapped; every later allocation is a takeover
    cycled: bool,
    store: Box<dyn FakeIpStore>,
}

/// Fake-IP pool mapping hostnames to addresses and back
#[derive(Debug)]
pub struct FakeIpPool {
    range: AddressRange,
    state: Mutex<PoolState>,
    stats: FakeIpStats,
}

impl FakeIpPool {
    /// Create a pool over `prefix` backed by an in-memory LRU store
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::InvalidRange` for degenerate prefixes and
    /// `FakeIpError::InvalidCapacity` when `max_entries` is zero.
    pub fn new(prefix: Ipv4Net, max_entries: usize) -> Result<Self, FakeIpError> {
        let store = MemoryStore::new(max_entries)?;
        Self::with_store(prefix, Box::new(store))
    }

    /// Create a pool with a caller-supplied store
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::InvalidRange` for degenerate prefixes.
    pub fn with_store(prefix: Ipv4Net, store: Box<dyn FakeIpStore>) -> Result<Self, FakeIpError> {
        let range = AddressRange::new(prefix)?;
        debug!(
            range = %range.prefix(),
            gateway = %range.gateway(),
            first = %range.first(),
            capacity = range.capacity(),
            "fake-IP pool created"
        );
        Ok(Self {
            state: Mutex::new(PoolState {
                offset: range.first_raw() - 1,
                cycled: false,
                store,
            }),
            range,
            stats: FakeIpStats::default(),
        })
    }

    /// Return the fake address for `host`, allocating one if needed
    ///
    /// The host is lowercased and stripped of its trailing dot first.
    pub fn lookup(&self, host: &str) -> Ipv4Addr {
        let host = normalize_host(host);
        let mut state = self.state.lock();

        if let Some(ip) = state.store.get_by_host(&host) {
            // only trust the forward entry while it still owns the address
            if state.store.get_by_ip(ip).as_deref() == Some(host.as_str()) {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                trace!(host = %host, ip = %ip, "fake-IP hit");
                return ip;
            }
        }

        let ip = self.allocate(&mut state, &host);
        state.store.put_by_host(host, ip);
        ip
    }

    /// Return the host currently owning `ip`
    #[must_use]
    pub fn look_back(&self, ip: Ipv4Addr) -> Option<String> {
        self.stats.look_backs.fetch_add(1, Ordering::Relaxed);
        self.state.lock().store.get_by_ip(ip)
    }

    /// Check if `ip` currently maps to a host
    #[must_use]
    pub fn exists(&self, ip: Ipv4Addr) -> bool {
        self.state.lock().store.exists(ip)
    }

    /// Check if `ip` lies inside the configured prefix
    #[must_use]
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.range.contains(ip)
    }

    /// Gateway address for the tunnel interface
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        self.range.gateway()
    }

    /// Last address of the prefix
    #[must_use]
    pub fn broadcast(&self) -> Ipv4Addr {
        self.range.last()
    }

    /// The configured prefix
    #[must_use]
    pub fn range(&self) -> Ipv4Net {
        self.range.prefix()
    }

    /// Full range geometry
    #[must_use]
    pub fn address_range(&self) -> &AddressRange {
        &self.range
    }

    /// Whether the allocator has wrapped at least once since creation or reset
    #[must_use]
    pub fn has_cycled(&self) -> bool {
        self.state.lock().cycled
    }

    /// Import every mapping held by `other`
    ///
    /// Used on reconfiguration so established mappings survive a pool swap.
    /// Both locks are taken in address order.
    pub fn import_from(&self, other: &FakeIpPool) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (source, mut target) = if (self as *const Self) < (other as *const Self) {
            let target = self.state.lock();
            (other.state.lock(), target)
        } else {
            let source = other.state.lock();
            (source, self.state.lock())
        };
        source.store.clone_into(target.store.as_mut());
        debug!(from = %other.range(), to = %self.range(), "fake-IP mappings imported");
    }

    /// Clear all mappings and rewind the allocator
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::Flush` if the store cannot be cleared; the
    /// allocator cursor is left untouched in that case.
    pub fn reset(&self) -> Result<(), FakeIpError> {
        let mut state = self.state.lock();
        state.store.flush().map_err(FakeIpError::Flush)?;
        state.cycled = false;
        state.offset = self.range.first_raw() - 1;
        debug!(range = %self.range.prefix(), "fake-IP pool reset");
        Ok(())
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> &FakeIpStats {
        &self.stats
    }

    fn allocate(&self, state: &mut PoolState, host: &str) -> Ipv4Addr {
        let mut next = state.offset + 1;
        if next >= self.range.last_raw() {
            state.cycled = true;
            next = self.range.first_raw();
            self.stats.wraparounds.fetch_add(1, Ordering::Relaxed);
        }
        state.offset = next;

        let ip = Ipv4Addr::from(next);
        if state.cycled || state.store.exists(ip) {
            if state.store.exists(ip) {
                self.stats.takeovers.fetch_add(1, Ordering::Relaxed);
            }
            state.store.del_by_ip(ip);
        }

        state.store.put_by_ip(ip, host.to_string());
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        trace!(host = %host, ip = %ip, "fake-IP allocated");
        ip
    }
}

/// Lowercase and strip the trailing root dot
pub(crate) fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}
