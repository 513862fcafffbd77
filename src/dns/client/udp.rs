//! UDP upstream exchange
//!
//! Plain DNS over UDP (RFC 1035). Each attempt opens a fresh socket through
//! the configured [`PacketDialer`], sends the query once, and waits for a
//! response from the server address.
//!
//! # Address forms
//!
//! - `8.8.8.8:53`, `[2001:4860:4860::8888]:53`
//! - `1.1.1.1` (port 53 implied)
//! - `udp://9.9.9.9:53`
//!
//! Other schemes (`tcp://`, `tls://`, `https://`, ...) are rejected.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tun_dns::dns::client::{DirectDialer, DnsExchange, UdpUpstream};
//! use hickory_proto::op::Message;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let upstream = UdpUpstream::new("udp://1.1.1.1", Arc::new(DirectDialer))?;
//! assert_eq!(upstream.server_addr().port(), 53);
//!
//! let mut query = Message::new();
//! query.set_id(0x1234);
//! let response = upstream.exchange(&query).await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tokio::time::timeout;
use tracing::debug;

use super::traits::{
    validate_response, DnsExchange, PacketDialer, DEFAULT_ATTEMPT_TIMEOUT, DEFAULT_UDP_RETRIES,
    MAX_UDP_MESSAGE_SIZE, UDP_RECV_BUFFER_SIZE,
};
use crate::dns::error::{DnsError, DnsResult};

/// Default DNS port
pub const DEFAULT_DNS_PORT: u16 = 53;

/// UDP upstream exchange
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    /// Address as configured
    address: String,

    /// Parsed server address
    server_addr: SocketAddr,

    /// Per-attempt timeout
    timeout: Duration,

    /// Number of retries on failure
    retries: u32,

    dialer: Arc<dyn PacketDialer>,
}

impl UdpUpstream {
    /// Create a UDP upstream
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if the address cannot be parsed or
    /// names an unsupported scheme.
    pub fn new(address: &str, dialer: Arc<dyn PacketDialer>) -> DnsResult<Self> {
        let server_addr = parse_upstream_addr(address)?;
        Ok(Self {
            address: address.trim().to_string(),
            server_addr,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
            retries: DEFAULT_UDP_RETRIES,
            dialer,
        })
    }

    /// Set the per-attempt timeout (minimum 1 ms)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Set the number of retries
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Get the server socket address
    #[must_use]
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Get the number of configured retries
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Get the per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform a single UDP exchange attempt
    async fn query_once(&self, query: &Message, query_bytes: &[u8]) -> DnsResult<Message> {
        let socket = self.dialer.dial_udp(self.server_addr).await.map_err(|e| {
            DnsError::network_io(format!("failed to open socket for {}", self.server_addr), e)
        })?;

        socket.send_to(query_bytes, self.server_addr).await.map_err(|e| {
            DnsError::network_io(format!("failed to send UDP query to {}", self.server_addr), e)
        })?;

        let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];
        let recv_result = timeout(self.timeout, socket.recv_from(&mut recv_buf)).await;

        match recv_result {
            Ok(Ok((len, src))) => {
                if src != self.server_addr {
                    return Err(DnsError::upstream(
                        &self.address,
                        format!(
                            "response from unexpected source: {src} (expected {})",
                            self.server_addr
                        ),
                    ));
                }

                let response = Message::from_vec(&recv_buf[..len])
                    .map_err(|e| DnsError::parse(format!("failed to parse DNS response: {e}")))?;

                if !validate_response(query, &response) {
                    return Err(DnsError::upstream(
                        &self.address,
                        "response validation failed (ID or question mismatch)",
                    ));
                }

                Ok(response)
            }
            Ok(Err(e)) => Err(DnsError::network_io(
                format!("failed to receive UDP response from {}", self.server_addr),
                e,
            )),
            Err(_) => Err(DnsError::timeout(
                format!("UDP query to {}", self.server_addr),
                self.timeout,
            )),
        }
    }
}

#[async_trait]
impl DnsExchange for UdpUpstream {
    async fn exchange(&self, query: &Message) -> DnsResult<Message> {
        let query_bytes = query
            .to_vec()
            .map_err(|e| DnsError::serialize(format!("failed to serialize DNS query: {e}")))?;

        if query_bytes.len() > MAX_UDP_MESSAGE_SIZE {
            return Err(DnsError::serialize(format!(
                "UDP query too large: {} bytes (max {MAX_UDP_MESSAGE_SIZE})",
                query_bytes.len()
            )));
        }

        let mut last_error = None;

        for attempt in 0..=self.retries {
            match self.query_once(query, &query_bytes).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    debug!(
                        upstream = %self.address,
                        attempt = attempt + 1,
                        max_attempts = self.retries + 1,
                        error = %e,
                        "UDP exchange attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DnsError::upstream(&self.address, "all UDP attempts failed")))
    }

    fn address(&self) -> &str {
        &self.address
    }
}

/// Parse an upstream address in one of the accepted forms
fn parse_upstream_addr(address: &str) -> DnsResult<SocketAddr> {
    let address = address.trim();
    if address.is_empty() {
        return Err(DnsError::config_field("upstream cannot be empty", "dns.upstream"));
    }

    let bare = match address.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("udp") => rest.trim_end_matches('/'),
        Some((scheme, _)) => {
            return Err(DnsError::config_field(
                format!("unsupported upstream scheme '{scheme}' in '{address}'"),
                "dns.upstream",
            ));
        }
        None => address,
    };

    if let Ok(addr) = bare.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let host = bare
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(bare);
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_DNS_PORT));
    }

    Err(DnsError::config_field(
        format!("invalid UDP server address '{address}': expected IP[:port]"),
        "dns.upstream",
    ))
}
