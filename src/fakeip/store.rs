//! Bounded bidirectional storage for fake-IP mappings
//!
//! The pool owns a [`FakeIpStore`] behind its lock, so implementations are
//! plain single-threaded structures. [`MemoryStore`] keeps two LRU maps, one
//! per direction, and drops the least-recently-used entries under capacity
//! pressure independently of the pool's ring reuse.

use std::fmt::Debug;
use std::io;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::error::FakeIpError;

/// Backing store for host <-> address mappings
///
/// Methods take `&mut self` because reads refresh recency.
pub trait FakeIpStore: Send + Debug {
    /// Forward lookup
    fn get_by_host(&mut self, host: &str) -> Option<Ipv4Addr>;

    /// Insert or replace a forward mapping
    fn put_by_host(&mut self, host: String, ip: Ipv4Addr);

    /// Reverse lookup
    fn get_by_ip(&mut self, ip: Ipv4Addr) -> Option<String>;

    /// Insert or replace a reverse mapping
    fn put_by_ip(&mut self, ip: Ipv4Addr, host: String);

    /// Remove a reverse mapping
    fn del_by_ip(&mut self, ip: Ipv4Addr);

    /// Check if an address currently has a reverse mapping
    fn exists(&self, ip: Ipv4Addr) -> bool;

    /// Copy every mapping into another store
    fn clone_into(&self, other: &mut dyn FakeIpStore);

    /// Remove every mapping
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the underlying medium cannot be cleared.
    fn flush(&mut self) -> io::Result<()>;
}

/// In-memory LRU store
#[derive(Debug)]
pub struct MemoryStore {
    host_to_ip: LruCache<String, Ipv4Addr>,
    ip_to_host: LruCache<Ipv4Addr, String>,
}

impl MemoryStore {
    /// Create a store holding at most `max_entries` mappings per direction
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::InvalidCapacity` when `max_entries` is zero.
    pub fn new(max_entries: usize) -> Result<Self, FakeIpError> {
        let cap = NonZeroUsize::new(max_entries).ok_or(FakeIpError::InvalidCapacity(max_entries))?;
        Ok(Self {
            host_to_ip: LruCache::new(cap),
            ip_to_host: LruCache::new(cap),
        })
    }

    /// Number of forward entries
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.host_to_ip.len()
    }

    /// Number of reverse entries
    #[must_use]
    pub fn ip_count(&self) -> usize {
        self.ip_to_host.len()
    }

    /// Maximum entries per direction
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.host_to_ip.cap().get()
    }
}

impl FakeIpStore for MemoryStore {
    fn get_by_host(&mut self, host: &str) -> Option<Ipv4Addr> {
        let ip = *self.host_to_ip.get(host)?;
        // keep the partner entry warm so both directions age together
        let _ = self.ip_to_host.get(&ip);
        Some(ip)
    }

    fn put_by_host(&mut self, host: String, ip: Ipv4Addr) {
        self.host_to_ip.put(host, ip);
    }

    fn get_by_ip(&mut self, ip: Ipv4Addr) -> Option<String> {
        let host = self.ip_to_host.get(&ip)?.clone();
        let _ = self.host_to_ip.get(host.as_str());
        Some(host)
    }

    fn put_by_ip(&mut self, ip: Ipv4Addr, host: String) {
        self.ip_to_host.put(ip, host);
    }

    fn del_by_ip(&mut self, ip: Ipv4Addr) {
        self.ip_to_host.pop(&ip);
    }

    fn exists(&self, ip: Ipv4Addr) -> bool {
        self.ip_to_host.contains(&ip)
    }

    fn clone_into(&self, other: &mut dyn FakeIpStore) {
        // oldest first, so the newest entries end up most recent in `other`
        for (host, ip) in self.host_to_ip.iter().rev() {
            other.put_by_host(host.clone(), *ip);
        }
        for (ip, host) in self.ip_to_host.iter().rev() {
            other.put_by_ip(*ip, host.clone());
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.host_to_ip.clear();
        self.ip_to_host.clear();
        Ok(())
    }
}
