//! DNS interception configuration
//!
//! # Configuration Structure
//!
//! ```text
//! DnsConfig
//! ├── mode: virtual | upstream
//! ├── listen: String            ("host:port", port 0 disables the listener)
//! ├── virtual_range: Ipv4Net
//! ├── upstream: String
//! ├── upstream_cache: bool
//! ├── redirect_upstream: bool
//! ├── upstream_timeout_secs: u64
//! ├── max_entries: usize
//! └── skip_domains: Vec<String>
//! ```
//!
//! Field names also accept the kebab-case keys used by older tunnel
//! configuration files (`dns-mode`, `dns-listen-addr`, `fakedns-ipv4-cidr`, ...).
//!
//! # Example
//!
//! ```
//! use tun_dns::dns::{DnsConfig, DnsMode};
//!
//! let config = DnsConfig::default();
//! assert_eq!(config.mode, DnsMode::Virtual);
//! assert_eq!(config.virtual_range.to_string(), "198.18.0.0/16");
//! assert!(config.validate().is_ok());
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tokio::net::lookup_host;

use super::error::{DnsError, DnsResult};
use crate::fakeip::AddressRange;
use crate::rules::DomainMatcher;

/// How the server answers queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DnsMode {
    /// A queries receive fake addresses from the pool
    #[default]
    #[serde(alias = "fake-ip", alias = "fakeip")]
    Virtual,
    /// Every query is forwarded to the upstream
    Upstream,
}

impl std::fmt::Display for DnsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Virtual => write!(f, "virtual"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

impl std::str::FromStr for DnsMode {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "virtual" | "fake-ip" | "fakeip" => Ok(Self::Virtual),
            "upstream" => Ok(Self::Upstream),
            other => Err(DnsError::config_field(
                format!("unknown DNS mode: {other}"),
                "dns.mode",
            )),
        }
    }
}

/// DNS interception configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Answering mode
    #[serde(default, alias = "dns-mode")]
    pub mode: DnsMode,

    /// UDP listen address (`host:port`)
    ///
    /// An empty string is a configuration error. Port `0` (or no port) is
    /// accepted and leaves the listener disabled.
    #[serde(default = "default_listen", alias = "dns-listen-addr")]
    pub listen: String,

    /// Fake-IP prefix used in virtual mode
    #[serde(default = "default_virtual_range", alias = "fakedns-ipv4-cidr")]
    pub virtual_range: Ipv4Net,

    /// Upstream DNS server (`host:port`, bare IP, or `udp://host:port`)
    #[serde(default = "default_upstream", alias = "dns-upstream")]
    pub upstream: String,

    /// Cache positive upstream responses
    #[serde(default, alias = "dns-upstream-cache")]
    pub upstream_cache: bool,

    /// Forward non-A and skipped queries upstream in virtual mode
    #[serde(default, alias = "fakedns-redirect-upstream")]
    pub redirect_upstream: bool,

    /// Upper bound on one forwarded exchange
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Mappings kept per direction in the fake-IP store
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Domain patterns exempt from fake-IP assignment
    ///
    /// See [`crate::rules::domain`] for the pattern syntax.
    #[serde(default)]
    pub skip_domains: Vec<String>,
}

fn default_listen() -> String {
    "127.0.0.1:5353".to_string()
}

fn default_virtual_range() -> Ipv4Net {
    Ipv4Net::new_assert(Ipv4Addr::new(198, 18, 0, 0), 16)
}

fn default_upstream() -> String {
    "8.8.8.8:53".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    5
}

fn default_max_entries() -> usize {
    1000
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            mode: DnsMode::default(),
            listen: default_listen(),
            virtual_range: default_virtual_range(),
            upstream: default_upstream(),
            upstream_cache: false,
            redirect_upstream: false,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            max_entries: default_max_entries(),
            skip_domains: Vec::new(),
        }
    }
}

impl DnsConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the answering mode
    #[must_use]
    pub fn with_mode(mut self, mode: DnsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the listen address
    #[must_use]
    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    /// Set the fake-IP prefix
    #[must_use]
    pub fn with_virtual_range(mut self, range: Ipv4Net) -> Self {
        self.virtual_range = range;
        self
    }

    /// Set the fake-IP store capacity
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the upstream server
    #[must_use]
    pub fn with_upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = upstream.into();
        self
    }

    /// Enable or disable upstream redirect in virtual mode
    #[must_use]
    pub fn with_redirect_upstream(mut self, redirect: bool) -> Self {
        self.redirect_upstream = redirect;
        self
    }

    /// Enable or disable the upstream response cache
    #[must_use]
    pub fn with_upstream_cache(mut self, cache: bool) -> Self {
        self.upstream_cache = cache;
        self
    }

    /// Set the skip-domain patterns
    #[must_use]
    pub fn with_skip_domains<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_domains = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Forwarded exchange timeout as a `Duration`
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Whether an upstream exchange must be built for this configuration
    #[must_use]
    pub fn needs_upstream(&self) -> bool {
        self.mode == DnsMode::Upstream || self.redirect_upstream
    }

    /// Parse the listen address into host and port
    ///
    /// Returns `Ok(None)` when the port is `0` or missing, meaning the
    /// listener stays disabled. An empty host means `0.0.0.0`. The host is
    /// not resolved here; see [`DnsConfig::listen_addr`].
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if the address is empty or the port
    /// is not a number.
    ///
    /// # Example
    ///
    /// ```
    /// use tun_dns::dns::DnsConfig;
    ///
    /// let config = DnsConfig::new().with_listen("localhost:1053");
    /// assert_eq!(
    ///     config.listen_endpoint().unwrap(),
    ///     Some(("localhost".to_string(), 1053))
    /// );
    ///
    /// let config = DnsConfig::new().with_listen("127.0.0.1:0");
    /// assert!(config.listen_endpoint().unwrap().is_none());
    /// ```
    pub fn listen_endpoint(&self) -> DnsResult<Option<(String, u16)>> {
        let listen = self.listen.trim();
        if listen.is_empty() {
            return Err(DnsError::config_field("empty listen address", "dns.listen"));
        }

        let Some((host, port)) = split_host_port(listen) else {
            return Ok(None);
        };
        if port.is_empty() || port == "0" {
            return Ok(None);
        }

        let port: u16 = port.parse().map_err(|_| {
            DnsError::config_field(format!("invalid listen port: {port}"), "dns.listen")
        })?;
        if port == 0 {
            return Ok(None);
        }

        let host = if host.is_empty() { "0.0.0.0" } else { host };
        Ok(Some((host.to_string(), port)))
    }

    /// Resolve the listen address
    ///
    /// IP literals are used as-is; other hosts are resolved, preferring the
    /// first IPv4 address. Returns `Ok(None)` when the listener is disabled.
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if the address is malformed or the
    /// host does not resolve.
    pub async fn listen_addr(&self) -> DnsResult<Option<SocketAddr>> {
        let Some((host, port)) = self.listen_endpoint()? else {
            return Ok(None);
        };

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Some(SocketAddr::new(ip, port)));
        }

        let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), port))
            .await
            .map_err(|e| {
                DnsError::config_field(
                    format!("cannot resolve listen host {host}: {e}"),
                    "dns.listen",
                )
            })?
            .collect();
        let preferred = addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied();
        preferred.map(Some).ok_or_else(|| {
            DnsError::config_field(
                format!("listen host {host} has no addresses"),
                "dns.listen",
            )
        })
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` describing the first invalid field.
    pub fn validate(&self) -> DnsResult<()> {
        self.listen_endpoint()?;

        if self.mode == DnsMode::Virtual {
            AddressRange::new(self.virtual_range).map_err(|e| {
                DnsError::config_field(e.to_string(), "dns.virtual_range")
            })?;

            if self.max_entries == 0 {
                return Err(DnsError::config_field(
                    "max_entries must be positive",
                    "dns.max_entries",
                ));
            }
        }

        if self.needs_upstream() && self.upstream.trim().is_empty() {
            return Err(DnsError::config_field(
                "upstream cannot be empty",
                "dns.upstream",
            ));
        }

        if self.upstream_timeout_secs == 0 {
            return Err(DnsError::config_field(
                "timeout must be positive",
                "dns.upstream_timeout_secs",
            ));
        }

        DomainMatcher::from_patterns(&self.skip_domains)
            .map_err(|e| DnsError::config_field(e.to_string(), "dns.skip_domains"))?;

        Ok(())
    }
}

/// Split `host:port`, handling bracketed IPv6 hosts
///
/// Returns `None` when no port separator is present.
pub(crate) fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = tail.strip_prefix(':')?;
        return Some((host, port));
    }
    let (host, port) = addr.rsplit_once(':')?;
    // an unbracketed IPv6 literal has no port
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}
