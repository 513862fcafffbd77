//! DNS server
//!
//! # Architecture
//!
//! ```text
//! Client Query (UDP)
//!     |
//!     v
//! +-------------------+
//! |  UdpDnsServer     | -- unparseable --> FORMERR
//! +-------------------+
//!     |  task per datagram
//!     v
//! +-------------------+
//! |  DnsHandler       | -- fake-IP answer / upstream exchange / SERVFAIL
//! +-------------------+
//! ```
//!
//! # Components
//!
//! - [`handler`]: per-query dispatch
//! - [`udp`]: UDP listener
//! - [`service`]: owned lifecycle context tying listener, pool and rewriter together

pub mod handler;
pub mod service;
pub mod udp;

pub use handler::{
    servfail_response, DnsHandler, DnsHandlerBuilder, HandlerStats, HandlerStatsSnapshot,
    DEFAULT_UPSTREAM_TIMEOUT, FAKE_IP_TTL,
};
pub use service::{DnsService, ServerOptions};
pub use udp::{UdpDnsServer, UdpServerStats, UdpServerStatsSnapshot};
