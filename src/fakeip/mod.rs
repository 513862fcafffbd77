//! Fake-IP address pool
//!
//! Maps domain names to ephemeral addresses from an unrouted range (for
//! example `198.18.0.0/16`) and back. When a client resolves a name through
//! the interception DNS server it receives one of these addresses; when it
//! later connects to that address the tunnel recovers the original name via
//! [`FakeIpPool::look_back`].
//!
//! ## Layout
//!
//! - [`range`]: gateway and allocatable bounds derived from the prefix
//! - [`store`]: bounded bidirectional storage with LRU eviction
//! - [`pool`]: the ring allocator tying both together
//!
//! ## Example
//!
//! ```
//! use tun_dns::fakeip::FakeIpPool;
//!
//! let pool = FakeIpPool::new("198.18.0.0/16".parse().unwrap(), 1000).unwrap();
//! let ip = pool.lookup("example.com");
//! assert_eq!(ip.to_string(), "198.18.0.4");
//! assert_eq!(pool.look_back(ip).as_deref(), Some("example.com"));
//! ```

pub mod pool;
pub mod range;
pub mod store;

pub use pool::{FakeIpPool, FakeIpStats, FakeIpStatsSnapshot};
pub use range::AddressRange;
pub use store::{FakeIpStore, MemoryStore};
