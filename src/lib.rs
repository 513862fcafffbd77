//! tun-dns: fake-IP DNS interception for transparent tunnels
//!
//! This crate answers DNS queries arriving on a tunnel interface with
//! addresses from a private "fake" range, remembers which hostname each
//! address stands for, and rewrites connection destinations back to those
//! hostnames before they are dialed.
//!
//! # Features
//!
//! - **Fake-IP Pool**: bounded ring allocator over an IPv4 prefix with LRU-backed mappings
//! - **DNS Server**: UDP listener answering A queries from the pool, TTL 1
//! - **Skip List**: exact, suffix, keyword and regex domain exemptions
//! - **Upstream Forwarding**: UDP resolver with retries and optional response cache
//! - **Metadata Rewriting**: fake destination to hostname before dial
//!
//! # Architecture
//!
//! ```text
//! App → DNS query → DnsService → FakeIpPool::lookup() → 198.18.x.y
//!                                     ↑
//! App → connect(198.18.x.y) → MetadataRewriter::rewrite() → dial "host:port"
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tun_dns::config::load_config;
//! use tun_dns::dns::{DnsService, ServerOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/tun-dns/config.json")?;
//!
//! let mut service = DnsService::new();
//! service.start(ServerOptions::new(config.dns)).await?;
//!
//! let rewriter = service.rewriter().clone();
//! // hand `rewriter` to the connection dialer...
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration types and loading
//! - [`dns`]: DNS server, upstream client and response cache
//! - [`error`]: Error types
//! - [`fakeip`]: Fake-IP address pool
//! - [`metadata`]: Connection metadata rewriting
//! - [`rules`]: Domain matching for the skip list

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod dns;
pub mod error;
pub mod fakeip;
pub mod metadata;
pub mod rules;

// Re-export commonly used types at the crate root
pub use config::{Config, LogConfig};
pub use dns::{DnsConfig, DnsMode, DnsService, ServerOptions};
pub use error::{ConfigError, FakeIpError, RuleError, TunDnsError};
pub use fakeip::FakeIpPool;
pub use metadata::{Metadata, MetadataRewriter, Network};
pub use rules::{DomainMatch, DomainMatcher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
