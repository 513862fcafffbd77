//! Error types for the DNS interception module
//!
//! # Error Categories
//!
//! - **Parse/Serialize errors**: DNS message encoding/decoding failures
//! - **Network errors**: Socket I/O and bind failures
//! - **Timeout errors**: Upstream exchange exceeded its deadline
//! - **Upstream errors**: Invalid or missing upstream responses
//! - **Redirect disabled**: A skipped name was queried with forwarding off
//! - **Config errors**: Invalid configuration parameters
//!
//! # Example
//!
//! ```
//! use tun_dns::dns::DnsError;
//!
//! let err = DnsError::timeout("query to 8.8.8.8:53", std::time::Duration::from_secs(5));
//! assert!(err.is_recoverable());
//! assert!(err.to_string().contains("timed out"));
//! ```

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Error types for DNS operations
///
/// # Recoverability
///
/// - **Recoverable**: Transient issues that may succeed on retry (timeouts, network errors)
/// - **Non-recoverable**: Permanent failures requiring configuration changes
#[derive(Debug, Error)]
pub enum DnsError {
    /// DNS message parsing failed
    #[error("Failed to parse DNS message: {reason}")]
    ParseError {
        /// Description of what went wrong during parsing
        reason: String,
    },

    /// DNS message serialization failed
    #[error("Failed to serialize DNS message: {reason}")]
    SerializeError {
        /// Description of what went wrong during serialization
        reason: String,
    },

    /// Network I/O error
    ///
    /// Wraps socket failures such as bind errors or connection resets.
    #[error("Network error: {reason}")]
    NetworkError {
        /// Description of the network failure
        reason: String,
        /// The underlying I/O error, if available
        #[source]
        source: Option<io::Error>,
    },

    /// Query timeout
    #[error("DNS query timed out after {timeout:?}: {context}")]
    TimeoutError {
        /// Description of what timed out
        context: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// Upstream server error
    ///
    /// The upstream answered with something unusable (wrong ID, truncated
    /// packet, unexpected source) or could not be reached.
    #[error("Upstream server error ({upstream}): {reason}")]
    UpstreamError {
        /// The upstream server address
        upstream: String,
        /// Description of the upstream failure
        reason: String,
    },

    /// A skipped domain was queried while upstream redirect is disabled
    #[error("upstream redirect disabled for {domain}")]
    RedirectDisabled {
        /// The queried name
        domain: String,
    },

    /// No upstream configured
    #[error("No upstream DNS server available: {reason}")]
    NoUpstream {
        /// Reason why no upstream is available
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid DNS configuration: {reason}")]
    ConfigError {
        /// Description of the configuration error
        reason: String,
        /// The configuration field that is invalid, if applicable
        field: Option<String>,
    },

    /// Invalid query
    ///
    /// The received query is well-formed on the wire but unusable, e.g. it
    /// carries an empty question section.
    #[error("Invalid DNS query: {reason}")]
    InvalidQuery {
        /// Description of why the query is invalid
        reason: String,
        /// The query ID, if available
        query_id: Option<u16>,
    },
}

impl DnsError {
    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError {
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialize(reason: impl Into<String>) -> Self {
        Self::SerializeError {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a network error from an I/O error
    ///
    /// # Example
    ///
    /// ```
    /// use tun_dns::dns::DnsError;
    /// use std::io;
    ///
    /// let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
    /// let err = DnsError::network_io("bind 127.0.0.1:53", io_err);
    /// assert!(err.to_string().contains("bind 127.0.0.1:53"));
    /// ```
    pub fn network_io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::NetworkError {
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Create a timeout error
    pub fn timeout(context: impl Into<String>, timeout: Duration) -> Self {
        Self::TimeoutError {
            context: context.into(),
            timeout,
        }
    }

    /// Create an upstream error
    pub fn upstream(upstream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UpstreamError {
            upstream: upstream.into(),
            reason: reason.into(),
        }
    }

    /// Create a redirect-disabled error for `domain`
    pub fn redirect_disabled(domain: impl Into<String>) -> Self {
        Self::RedirectDisabled {
            domain: domain.into(),
        }
    }

    /// Create a no upstream available error
    pub fn no_upstream(reason: impl Into<String>) -> Self {
        Self::NoUpstream {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: None,
        }
    }

    /// Create a configuration error with field context
    ///
    /// # Example
    ///
    /// ```
    /// use tun_dns::dns::DnsError;
    ///
    /// let err = DnsError::config_field("must not be empty", "dns.listen");
    /// assert!(err.to_string().contains("must not be empty"));
    /// ```
    pub fn config_field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ConfigError {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid query error with query ID
    pub fn invalid_query(reason: impl Into<String>, query_id: u16) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
            query_id: Some(query_id),
        }
    }

    /// Check if this error is recoverable
    ///
    /// # Example
    ///
    /// ```
    /// use tun_dns::dns::DnsError;
    /// use std::time::Duration;
    ///
    /// assert!(DnsError::timeout("query", Duration::from_secs(5)).is_recoverable());
    /// assert!(!DnsError::config("invalid address").is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NetworkError { source, .. } => source.as_ref().map_or(true, |e| {
                matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                )
            }),
            Self::TimeoutError { .. } | Self::UpstreamError { .. } => true,
            Self::ParseError { .. }
            | Self::SerializeError { .. }
            | Self::RedirectDisabled { .. }
            | Self::NoUpstream { .. }
            | Self::ConfigError { .. }
            | Self::InvalidQuery { .. } => false,
        }
    }

    /// Check if this error indicates a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutError { .. })
    }
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        Self::NetworkError {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

/// Type alias for Result with [`DnsError`]
pub type DnsResult<T> = std::result::Result<T, DnsError>;
