//! DNS interception for the tunnel
//!
//! This module answers DNS queries arriving on the tunnel's DNS address.
//! In virtual mode, A queries are answered from the fake-IP pool so the
//! later connection carries an address that maps back to the hostname;
//! everything else is forwarded to a real upstream resolver or refused.
//!
//! # Features
//!
//! - **Virtual answers**: A queries resolved to fake addresses with TTL 1
//! - **Skip list**: domains exempted from fake answers via [`crate::rules`]
//! - **Upstream forwarding**: plain UDP with retries and an optional cache
//! - **Lifecycle**: [`DnsService`] restarts in place, keeping pool mappings
//!
//! # Architecture
//!
//! ```text
//! Client Query
//!     │
//!     ▼
//! ┌─────────────────┐
//! │  UdpDnsServer   │ ─── unparseable ──▶ FORMERR
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   DnsHandler    │ ─── virtual A ──▶ FakeIpPool::lookup()
//! └────────┬────────┘
//!          │ skip / non-A / upstream mode
//!          ▼
//! ┌─────────────────┐
//! │     Cache       │ ─── Hit ──▶ Cached Response
//! └────────┬────────┘
//!          │ Miss
//!          ▼
//! ┌─────────────────┐
//! │   UdpUpstream   │ ─── Query ──▶ Upstream Server
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use tun_dns::dns::{DnsConfig, DnsMode};
//!
//! let config = DnsConfig::new()
//!     .with_mode(DnsMode::Virtual)
//!     .with_listen("127.0.0.1:5353")
//!     .with_redirect_upstream(true)
//!     .with_skip_domains(["+.lan", "keyword:ntp"]);
//!
//! config.validate().expect("valid DNS config");
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod server;

pub use cache::{CacheEntry, CacheKey, CacheStats, CacheStatsSnapshot, CachedExchange};
pub use client::{DirectDialer, DnsExchange, PacketDialer, UdpUpstream};
pub use config::{DnsConfig, DnsMode};
pub use error::{DnsError, DnsResult};
pub use server::{
    DnsHandler, DnsService, HandlerStats, HandlerStatsSnapshot, ServerOptions, UdpDnsServer,
    UdpServerStats, UdpServerStatsSnapshot,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = DnsConfig::default();
        assert_eq!(config.mode, DnsMode::Virtual);
        assert_eq!(config.listen, "127.0.0.1:5353");
        assert_eq!(config.virtual_range.to_string(), "198.18.0.0/16");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_classification() {
        let timeout = DnsError::timeout("query", std::time::Duration::from_secs(5));
        assert!(timeout.is_recoverable());
        assert!(timeout.is_timeout());

        let config_err = DnsError::config("invalid address");
        assert!(!config_err.is_recoverable());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DnsConfig::new()
            .with_mode(DnsMode::Upstream)
            .with_upstream("1.1.1.1:53")
            .with_upstream_cache(true);

        let json = serde_json::to_string_pretty(&config).expect("serialize");
        let parsed: DnsConfig = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed, config);
    }
}
