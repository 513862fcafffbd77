//! Upstream exchange traits
//!
//! [`DnsExchange`] is the capability the DNS handler forwards queries to.
//! [`PacketDialer`] lets the embedding tunnel decide how upstream sockets
//! are opened, e.g. routed through a proxy instead of the host network.
//!
//! # Example
//!
//! ```no_run
//! use tun_dns::dns::client::DnsExchange;
//! use hickory_proto::op::Message;
//!
//! async fn forward(upstream: &dyn DnsExchange, query: &Message) {
//!     match upstream.exchange(query).await {
//!         Ok(response) => println!("{} answers", response.answers().len()),
//!         Err(e) => println!("exchange failed: {e}"),
//!     }
//! }
//! ```

use std::fmt::Debug;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::net::UdpSocket;

use crate::dns::error::DnsResult;

/// Default per-attempt timeout for UDP exchanges
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of retries for UDP exchanges
pub const DEFAULT_UDP_RETRIES: u32 = 1;

/// Maximum DNS message size for UDP queries (without EDNS)
pub const MAX_UDP_MESSAGE_SIZE: usize = 512;

/// Receive buffer size, large enough for EDNS0 responses
pub const UDP_RECV_BUFFER_SIZE: usize = 4096;

/// Query-in, response-out capability used for forwarding
///
/// Implementations must be thread-safe; one instance is shared by every
/// in-flight query task.
#[async_trait]
pub trait DnsExchange: Send + Sync + Debug {
    /// Send `query` upstream and await the matching response
    ///
    /// # Errors
    ///
    /// Returns `DnsError` if the network fails, the exchange times out, or
    /// the response does not match the query.
    async fn exchange(&self, query: &Message) -> DnsResult<Message>;

    /// Human-readable upstream address for logging
    fn address(&self) -> &str;
}

/// Opens sockets used to reach an upstream server
#[async_trait]
pub trait PacketDialer: Send + Sync + Debug {
    /// Open a UDP socket able to exchange datagrams with `server`
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while creating the socket.
    async fn dial_udp(&self, server: SocketAddr) -> io::Result<UdpSocket>;
}

/// Dialer using the host network stack directly
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

#[async_trait]
impl PacketDialer for DirectDialer {
    async fn dial_udp(&self, server: SocketAddr) -> io::Result<UdpSocket> {
        let bind: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        UdpSocket::bind(bind).await
    }
}

/// Validate that a response belongs to a query
///
/// The ID must match and the first question must agree on name, type and
/// class.
pub fn validate_response(query: &Message, response: &Message) -> bool {
    if query.id() != response.id() {
        return false;
    }

    match (query.queries().first(), response.queries().first()) {
        (Some(q), Some(r)) => {
            q.name() == r.name()
                && q.query_type() == r.query_type()
                && q.query_class() == r.query_class()
        }
        (None, None) => true,
        _ => false,
    }
}
