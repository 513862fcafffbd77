//! Upstream DNS clients
//!
//! ```text
//!        ┌──────────────┐          ┌──────────────┐
//!        │ DnsExchange  │ (trait)  │ PacketDialer │ (trait)
//!        └──────┬───────┘          └──────┬───────┘
//!        ┌──────┴───────┐          ┌──────┴───────┐
//!        │ UdpUpstream  │─────────>│ DirectDialer │
//!        └──────────────┘  dials   └──────────────┘
//! ```
//!
//! [`crate::dns::cache::CachedExchange`] wraps any exchange with a response
//! cache.

pub mod traits;
pub mod udp;

pub use traits::{
    validate_response, DirectDialer, DnsExchange, PacketDialer, DEFAULT_ATTEMPT_TIMEOUT,
    DEFAULT_UDP_RETRIES, MAX_UDP_MESSAGE_SIZE, UDP_RECV_BUFFER_SIZE,
};
pub use udp::{UdpUpstream, DEFAULT_DNS_PORT};
