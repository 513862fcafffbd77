//! DNS service lifecycle
//!
//! [`DnsService`] owns everything a running DNS interception setup needs:
//! the listener task and its shutdown channel, the active fake-IP pool and
//! the [`MetadataRewriter`] that consults it. Calling
//! [`DnsService::start`] again reconfigures in place: the old listener is
//! shut down and the old pool's mappings are imported into a freshly built one.
//!
//! # Example
//!
//! ```no_run
//! use tun_dns::dns::{DnsConfig, DnsService, ServerOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut service = DnsService::new();
//! service
//!     .start(ServerOptions::new(DnsConfig::new().with_listen("127.0.0.1:5353")))
//!     .await?;
//!
//! let pool = service.pool().expect("virtual mode");
//! println!("gateway {}", pool.gateway());
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::handler::DnsHandler;
use super::udp::{UdpDnsServer, UdpServerStatsSnapshot};
use crate::dns::cache::CachedExchange;
use crate::dns::client::{DirectDialer, DnsExchange, PacketDialer, UdpUpstream};
use crate::dns::config::{DnsConfig, DnsMode};
use crate::dns::error::{DnsError, DnsResult};
use crate::error::FakeIpError;
use crate::fakeip::FakeIpPool;
use crate::metadata::MetadataRewriter;
use crate::rules::{DomainMatch, DomainMatcher};

/// Everything [`DnsService::start`] needs
#[derive(Debug, Clone)]
pub struct ServerOptions {
    config: DnsConfig,
    skip: Option<Arc<dyn DomainMatch>>,
    upstream: Option<Arc<dyn DnsExchange>>,
    dialer: Arc<dyn PacketDialer>,
}

impl ServerOptions {
    /// Options for `config` with a direct dialer
    #[must_use]
    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            skip: None,
            upstream: None,
            dialer: Arc::new(DirectDialer),
        }
    }

    /// Use `matcher` instead of compiling `config.skip_domains`
    #[must_use]
    pub fn with_skip_matcher(mut self, matcher: Arc<dyn DomainMatch>) -> Self {
        self.skip = Some(matcher);
        self
    }

    /// Use `upstream` instead of building one from `config.upstream`
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn DnsExchange>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Dial upstream sockets through `dialer`
    #[must_use]
    pub fn with_dialer(mut self, dialer: Arc<dyn PacketDialer>) -> Self {
        self.dialer = dialer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    fn build_upstream(&self) -> DnsResult<Arc<dyn DnsExchange>> {
        let upstream: Arc<dyn DnsExchange> = match &self.upstream {
            Some(upstream) => Arc::clone(upstream),
            None => Arc::new(UdpUpstream::new(
                &self.config.upstream,
                Arc::clone(&self.dialer),
            )?),
        };

        if self.config.upstream_cache {
            debug!(upstream = %upstream.address(), "upstream response cache enabled");
            return Ok(Arc::new(CachedExchange::new(upstream)));
        }
        Ok(upstream)
    }

    fn build_skip_matcher(&self) -> DnsResult<Option<Arc<dyn DomainMatch>>> {
        if let Some(skip) = &self.skip {
            return Ok(Some(Arc::clone(skip)));
        }
        if self.config.skip_domains.is_empty() {
            return Ok(None);
        }
        let matcher = DomainMatcher::from_patterns(&self.config.skip_domains)
            .map_err(|e| DnsError::config_field(e.to_string(), "dns.skip_domains"))?;
        Ok(Some(Arc::new(matcher)))
    }
}

/// A running listener
#[derive(Debug)]
struct Listener {
    server: Arc<UdpDnsServer>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<DnsResult<()>>,
}

/// Owned DNS interception context
#[derive(Debug, Default)]
pub struct DnsService {
    rewriter: Arc<MetadataRewriter>,
    pool: Option<Arc<FakeIpPool>>,
    listener: Option<Listener>,
}

impl DnsService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service sharing an existing rewriter
    #[must_use]
    pub fn with_rewriter(rewriter: Arc<MetadataRewriter>) -> Self {
        Self {
            rewriter,
            pool: None,
            listener: None,
        }
    }

    /// Start or reconfigure the service
    ///
    /// A listen address without a port, or with port 0, installs the pool
    /// and leaves the listener stopped. Listen host names are resolved here.
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if [`DnsConfig::validate`] fails, the
    /// listen host does not resolve, or the upstream is bad;
    /// `DnsError::NetworkError` if the socket cannot be bound.
    pub async fn start(&mut self, options: ServerOptions) -> DnsResult<()> {
        let config = options.config();
        config.validate()?;
        let listen = config.listen_addr().await?;

        let upstream = if config.needs_upstream() {
            Some(options.build_upstream()?)
        } else {
            None
        };

        let pool = match config.mode {
            DnsMode::Virtual => {
                let pool = FakeIpPool::new(config.virtual_range, config.max_entries)?;
                if let Some(previous) = &self.pool {
                    pool.import_from(previous);
                }
                Some(Arc::new(pool))
            }
            DnsMode::Upstream => None,
        };

        let mut builder = DnsHandler::builder(config.mode)
            .redirect_upstream(config.redirect_upstream)
            .upstream_timeout(config.upstream_timeout());
        if let Some(pool) = &pool {
            builder = builder.pool(Arc::clone(pool));
        }
        if let Some(upstream) = upstream {
            builder = builder.upstream(upstream);
        }
        if let Some(skip) = options.build_skip_matcher()? {
            builder = builder.skip_matcher(skip);
        }
        let handler = Arc::new(builder.build()?);

        self.rewriter.install(pool.clone());
        self.pool = pool;

        self.shutdown().await;

        let Some(addr) = listen else {
            info!(listen = %config.listen, "DNS server disabled");
            return Ok(());
        };

        let server = Arc::new(UdpDnsServer::bind(addr, handler)?);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task_server = Arc::clone(&server);
        let handle = tokio::spawn(async move { task_server.run_until_shutdown(shutdown_rx).await });

        info!(
            addr = %server.local_addr(),
            mode = %config.mode,
            redirect_upstream = config.redirect_upstream,
            "DNS server listening"
        );

        self.listener = Some(Listener {
            server,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop the listener and wait for it to exit
    ///
    /// The pool and rewriter stay installed.
    pub async fn shutdown(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let addr = listener.server.local_addr();

        // the task may already have exited on a fatal error
        let _ = listener.shutdown_tx.send(());

        match listener.handle.await {
            Ok(Ok(())) => debug!(addr = %addr, "DNS server stopped"),
            Ok(Err(e)) => warn!(addr = %addr, error = %e, "DNS server exited with error"),
            Err(e) => warn!(addr = %addr, error = %e, "DNS server task failed"),
        }
    }

    /// Drop every fake-IP mapping of the active pool
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::Flush` if the store cannot be cleared.
    pub fn flush_fake_ip(&self) -> Result<(), FakeIpError> {
        match &self.pool {
            Some(pool) => {
                pool.reset()?;
                info!(range = %pool.range(), "fake-IP pool flushed");
                Ok(())
            }
            None => {
                debug!("no fake-IP pool to flush");
                Ok(())
            }
        }
    }

    /// Address the listener is bound to
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.server.local_addr())
    }

    /// Active fake-IP pool, `None` in upstream mode or before start
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<FakeIpPool>> {
        self.pool.as_ref()
    }

    #[must_use]
    pub fn rewriter(&self) -> &Arc<MetadataRewriter> {
        &self.rewriter
    }

    /// Whether the listener task is alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.listener
            .as_ref()
            .is_some_and(|l| !l.handle.is_finished())
    }

    /// Listener statistics
    #[must_use]
    pub fn server_stats(&self) -> Option<UdpServerStatsSnapshot> {
        self.listener.as_ref().map(|l| l.server.stats().snapshot())
    }

    /// Query handler of the running listener
    #[must_use]
    pub fn handler(&self) -> Option<&Arc<DnsHandler>> {
        self.listener.as_ref().map(|l| l.server.handler())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::metadata::{Metadata, Network};

    fn local_config() -> DnsConfig {
        DnsConfig::new().with_listen("127.0.0.1:0")
    }

    fn free_udp_port() -> u16 {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_empty_listen_is_fatal() {
        let mut service = DnsService::new();
        let result = service
            .start(ServerOptions::new(DnsConfig::new().with_listen("")))
            .await;
        assert!(matches!(result, Err(DnsError::ConfigError { .. })));
        assert!(service.pool().is_none());
    }

    #[tokio::test]
    async fn test_port_zero_is_disabled() {
        let mut service = DnsService::new();
        service.start(ServerOptions::new(local_config())).await.unwrap();

        assert!(!service.is_running());
        assert!(service.local_addr().is_none());
        assert!(service.server_stats().is_none());

        // pool is still installed for the rewriter
        let pool = Arc::clone(service.pool().unwrap());
        assert!(service.rewriter().active_pool().is_some());
        assert_eq!(pool.gateway(), Ipv4Addr::new(198, 18, 0, 1));
    }

    #[tokio::test]
    async fn test_start_binds_and_shuts_down() {
        let mut service = DnsService::new();
        let port = free_udp_port();
        let config = DnsConfig::new().with_listen(format!("127.0.0.1:{port}"));
        service.start(ServerOptions::new(config)).await.unwrap();

        assert!(service.is_running());
        assert_eq!(service.local_addr().map(|a| a.port()), Some(port));
        assert!(service.handler().is_some());

        service.shutdown().await;
        assert!(!service.is_running());
        assert!(service.local_addr().is_none());
        assert!(service.pool().is_some());

        // second shutdown is a no-op
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_keeps_mappings() {
        let mut service = DnsService::new();
        service.start(ServerOptions::new(local_config())).await.unwrap();
        let ip = service.pool().unwrap().lookup("api.example.com");

        service.start(ServerOptions::new(local_config())).await.unwrap();
        let pool = service.pool().unwrap();
        assert_eq!(pool.look_back(ip).as_deref(), Some("api.example.com"));
        assert_eq!(pool.lookup("api.example.com"), ip);

        let mut metadata = Metadata::new(Network::Tcp, IpAddr::V4(ip), 443);
        assert!(service.rewriter().rewrite(&mut metadata));
        assert_eq!(metadata.dst_name.as_deref(), Some("api.example.com"));
    }

    #[tokio::test]
    async fn test_restart_with_new_range_builds_new_pool() {
        let mut service = DnsService::new();
        service.start(ServerOptions::new(local_config())).await.unwrap();
        let old = Arc::clone(service.pool().unwrap());
        let ip = old.lookup("api.example.com");

        let range: ipnet::Ipv4Net = "10.10.0.0/16".parse().unwrap();
        let config = local_config().with_virtual_range(range).with_max_entries(64);
        service.start(ServerOptions::new(config)).await.unwrap();

        let pool = service.pool().unwrap();
        assert!(!Arc::ptr_eq(pool, &old));
        assert_eq!(pool.range(), range);
        assert_eq!(pool.gateway(), Ipv4Addr::new(10, 10, 0, 1));
        assert!(Arc::ptr_eq(&service.rewriter().active_pool().unwrap(), pool));

        // mappings from the previous range are still resolvable
        assert_eq!(pool.look_back(ip).as_deref(), Some("api.example.com"));

        let fresh = pool.lookup("new.example.com");
        assert!(range.contains(&fresh));
    }

    #[tokio::test]
    async fn test_start_resolves_listen_host() {
        let mut service = DnsService::new();
        let port = free_udp_port();
        let config = DnsConfig::new().with_listen(format!("localhost:{port}"));
        service.start(ServerOptions::new(config)).await.unwrap();

        let addr = service.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), port);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let mut service = DnsService::new();
        let mut config = local_config().with_redirect_upstream(true);
        config.upstream_timeout_secs = 0;

        let result = service.start(ServerOptions::new(config)).await;
        assert!(matches!(result, Err(DnsError::ConfigError { .. })));
        assert!(service.pool().is_none());
    }

    #[tokio::test]
    async fn test_upstream_mode_clears_pool() {
        let mut service = DnsService::new();
        service.start(ServerOptions::new(local_config())).await.unwrap();
        assert!(service.pool().is_some());

        let config = local_config().with_mode(DnsMode::Upstream);
        service.start(ServerOptions::new(config)).await.unwrap();
        assert!(service.pool().is_none());
        assert!(service.rewriter().active_pool().is_none());
        assert!(service.flush_fake_ip().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let mut service = DnsService::new();

        let config = local_config()
            .with_mode(DnsMode::Upstream)
            .with_upstream("tcp://8.8.8.8:53");
        assert!(service.start(ServerOptions::new(config)).await.is_err());

        let config = local_config().with_skip_domains(["regexp:("]);
        assert!(service.start(ServerOptions::new(config)).await.is_err());

        let config = local_config().with_virtual_range("10.0.0.0/31".parse().unwrap());
        assert!(service.start(ServerOptions::new(config)).await.is_err());
    }

    #[tokio::test]
    async fn test_flush_fake_ip() {
        let mut service = DnsService::new();
        service.start(ServerOptions::new(local_config())).await.unwrap();

        let pool = Arc::clone(service.pool().unwrap());
        let ip = pool.lookup("example.com");
        assert!(pool.exists(ip));

        service.flush_fake_ip().unwrap();
        assert!(!pool.exists(ip));
        assert_eq!(pool.lookup("other.example.com"), pool.address_range().first());
    }
}
