//! UDP DNS server
//!
//! One listener loop receives datagrams; every datagram is handled in its
//! own task so a slow upstream exchange never blocks other clients.
//!
//! ```text
//! UDP Socket (SO_REUSEADDR)
//!     |
//!     v
//! recv_from() ──spawn──> DnsHandler::handle_bytes() ──> send_to()
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tun_dns::dns::{DnsHandler, DnsMode, UdpDnsServer};
//! use tun_dns::fakeip::FakeIpPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Arc::new(FakeIpPool::new("198.18.0.0/16".parse()?, 1000)?);
//! let handler = Arc::new(DnsHandler::builder(DnsMode::Virtual).pool(pool).build()?);
//! let server = UdpDnsServer::bind("127.0.0.1:5353".parse()?, handler)?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
//! server.run_until_shutdown(shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace, warn};

use super::handler::DnsHandler;
use crate::dns::client::UDP_RECV_BUFFER_SIZE;
use crate::dns::error::{DnsError, DnsResult};

/// Statistics for the UDP DNS server
#[derive(Debug, Default)]
pub struct UdpServerStats {
    /// Total packets received
    packets_received: AtomicU64,
    /// Total packets sent
    packets_sent: AtomicU64,
    /// Packets received without a reply being sent
    packets_dropped: AtomicU64,
    /// Total bytes received
    bytes_received: AtomicU64,
    /// Total bytes sent
    bytes_sent: AtomicU64,
    /// Non-fatal receive errors
    recv_errors: AtomicU64,
}

impl UdpServerStats {
    /// Get a snapshot of all stats
    #[must_use]
    pub fn snapshot(&self) -> UdpServerStatsSnapshot {
        UdpServerStatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of UDP server statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UdpServerStatsSnapshot {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub recv_errors: u64,
}

impl UdpServerStatsSnapshot {
    /// Fraction of received packets that were answered
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.packets_received == 0 {
            return 1.0;
        }
        self.packets_sent as f64 / self.packets_received as f64
    }
}

/// UDP DNS server
#[derive(Debug)]
pub struct UdpDnsServer {
    socket: Arc<UdpSocket>,
    handler: Arc<DnsHandler>,
    stats: Arc<UdpServerStats>,
    local_addr: SocketAddr,
}

impl UdpDnsServer {
    /// Bind a server socket with `SO_REUSEADDR`
    ///
    /// Failure to set `SO_REUSEADDR` is logged and otherwise ignored. Must
    /// be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `DnsError::NetworkError` if the socket cannot be created or bound.
    pub fn bind(addr: SocketAddr, handler: Arc<DnsHandler>) -> DnsResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| DnsError::network_io("failed to create UDP socket", e))?;

        if let Err(e) = socket.set_reuse_address(true) {
            warn!(addr = %addr, error = %e, "failed to set SO_REUSEADDR on DNS socket");
        }

        socket
            .bind(&addr.into())
            .map_err(|e| DnsError::network_io(format!("failed to bind UDP socket to {addr}"), e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| DnsError::network_io("failed to set O_NONBLOCK", e))?;

        let socket = UdpSocket::from_std(socket.into())
            .map_err(|e| DnsError::network_io("failed to register UDP socket", e))?;

        Self::from_socket(socket, handler)
    }

    /// Create a server from an existing socket
    ///
    /// # Errors
    ///
    /// Returns `DnsError::NetworkError` if the local address is unavailable.
    pub fn from_socket(socket: UdpSocket, handler: Arc<DnsHandler>) -> DnsResult<Self> {
        let local_addr = socket
            .local_addr()
            .map_err(|e| DnsError::network_io("failed to get local address", e))?;

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            stats: Arc::new(UdpServerStats::default()),
            local_addr,
        })
    }

    /// Get the local address this server is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get server statistics
    #[must_use]
    pub fn stats(&self) -> &Arc<UdpServerStats> {
        &self.stats
    }

    /// Get the query handler
    #[must_use]
    pub fn handler(&self) -> &Arc<DnsHandler> {
        &self.handler
    }

    /// Serve until `shutdown_rx` fires or its sender is dropped
    ///
    /// # Errors
    ///
    /// Returns an error if the socket fails fatally.
    pub async fn run_until_shutdown(&self, mut shutdown_rx: oneshot::Receiver<()>) -> DnsResult<()> {
        info!(addr = %self.local_addr, "UDP DNS server starting");

        loop {
            let mut recv_buf = vec![0u8; UDP_RECV_BUFFER_SIZE];

            tokio::select! {
                result = self.socket.recv_from(&mut recv_buf) => {
                    match result {
                        Ok((len, src)) => {
                            recv_buf.truncate(len);
                            self.dispatch(recv_buf, src);
                        }
                        Err(e) => {
                            let err = DnsError::network_io("UDP recv_from failed", e);
                            if is_fatal_error(&err) {
                                error!(addr = %self.local_addr, error = %err, "fatal UDP error, shutting down");
                                return Err(err);
                            }
                            self.stats.recv_errors.fetch_add(1, Ordering::Relaxed);
                            debug!(error = %err, "non-fatal UDP error");
                        }
                    }
                }
                _ = &mut shutdown_rx => {
                    info!(addr = %self.local_addr, "UDP DNS server received shutdown signal");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one datagram on its own task
    fn dispatch(&self, packet: Vec<u8>, src: SocketAddr) {
        self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_received
            .fetch_add(packet.len() as u64, Ordering::Relaxed);
        trace!(src = %src, len = packet.len(), "received UDP DNS packet");

        let socket = Arc::clone(&self.socket);
        let handler = Arc::clone(&self.handler);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            let Some(response) = handler.handle_bytes(&packet).await else {
                stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            };

            match socket.send_to(&response, src).await {
                Ok(sent) => {
                    stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                    stats.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                    trace!(dst = %src, len = sent, "sent UDP DNS response");
                }
                Err(e) => {
                    stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(dst = %src, error = %e, "failed to send UDP response");
                }
            }
        });
    }
}

/// Check if an error is fatal (server should stop)
///
/// Permission and resource-exhaustion errors are fatal; resets and
/// interruptions are not.
fn is_fatal_error(err: &DnsError) -> bool {
    let DnsError::NetworkError {
        source: Some(io_err),
        ..
    } = err
    else {
        return false;
    };

    match io_err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::AddrInUse | io::ErrorKind::OutOfMemory => {
            true
        }
        // ENOMEM, ENFILE, EMFILE, ENETDOWN, ENOBUFS
        io::ErrorKind::Other => io_err
            .raw_os_error()
            .is_some_and(|code| matches!(code, 12 | 23 | 24 | 100 | 105)),
        _ => false,
    }
}
