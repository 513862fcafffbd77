//! Connection metadata and fake-destination rewriting
//!
//! Before a tunneled connection is dialed, its destination is checked
//! against the active fake-IP pool. A destination that was handed out by
//! the DNS server is replaced by the hostname it stands for, so the dialer
//! resolves the real address itself.
//!
//! # Example
//!
//! ```
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//! use tun_dns::fakeip::FakeIpPool;
//! use tun_dns::metadata::{Metadata, MetadataRewriter, Network};
//!
//! let pool = Arc::new(FakeIpPool::new("198.18.0.0/16".parse().unwrap(), 1000).unwrap());
//! let fake = pool.lookup("api.example.com");
//!
//! let rewriter = MetadataRewriter::new();
//! rewriter.install(Some(pool));
//!
//! let mut metadata = Metadata::new(Network::Tcp, IpAddr::V4(fake), 443);
//! assert!(rewriter.rewrite(&mut metadata));
//! assert_eq!(metadata.dst_name.as_deref(), Some("api.example.com"));
//! assert!(metadata.dst_ip.is_none());
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::trace;

use crate::fakeip::FakeIpPool;

/// Transport of a tunneled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Description of a connection about to be dialed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub network: Network,
    pub src_ip: IpAddr,
    pub src_port: u16,
    /// Destination address, cleared when replaced by a hostname
    pub dst_ip: Option<IpAddr>,
    pub dst_port: u16,
    /// Destination hostname, set by rewriting
    pub dst_name: Option<String>,
}

impl Metadata {
    /// Metadata for a connection to `dst_ip:dst_port` from an unspecified source
    #[must_use]
    pub fn new(network: Network, dst_ip: IpAddr, dst_port: u16) -> Self {
        Self {
            network,
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_ip: Some(dst_ip),
            dst_port,
            dst_name: None,
        }
    }

    /// Set the source endpoint
    #[must_use]
    pub fn with_source(mut self, src_ip: IpAddr, src_port: u16) -> Self {
        self.src_ip = src_ip;
        self.src_port = src_port;
        self
    }

    /// Host part of the destination, name preferred over address
    #[must_use]
    pub fn destination_host(&self) -> Option<String> {
        self.dst_name
            .clone()
            .or_else(|| self.dst_ip.map(|ip| ip.to_string()))
    }
}

/// Rewrites fake destinations back to hostnames
///
/// The active pool is swapped atomically when the DNS service restarts, so
/// rewrites racing a restart see either the old or the new pool.
#[derive(Debug, Default)]
pub struct MetadataRewriter {
    pool: ArcSwapOption<FakeIpPool>,
}

impl MetadataRewriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active pool; `None` disables rewriting
    pub fn install(&self, pool: Option<Arc<FakeIpPool>>) {
        self.pool.store(pool);
    }

    /// Currently active pool
    #[must_use]
    pub fn active_pool(&self) -> Option<Arc<FakeIpPool>> {
        self.pool.load_full()
    }

    /// Rewrite a fake destination to its hostname
    ///
    /// Returns `true` if `metadata` was changed.
    pub fn rewrite(&self, metadata: &mut Metadata) -> bool {
        let Some(IpAddr::V4(ip)) = metadata.dst_ip else {
            return false;
        };

        let guard = self.pool.load();
        let Some(pool) = guard.as_ref() else {
            return false;
        };

        let Some(host) = pool.look_back(ip) else {
            return false;
        };

        trace!(network = %metadata.network, ip = %ip, host = %host, "rewrote fake destination");
        metadata.dst_name = Some(host);
        metadata.dst_ip = None;
        true
    }
}
