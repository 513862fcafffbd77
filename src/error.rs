//! Error types for tun-dns
//!
//! This module defines the error hierarchy shared by the fake-IP pool, the
//! skip-domain matcher and configuration loading. DNS request handling keeps
//! its own error type in [`crate::dns::DnsError`].

use std::io;

use ipnet::Ipv4Net;
use thiserror::Error;

use crate::dns::DnsError;

/// Top-level error type for tun-dns
#[derive(Debug, Error)]
pub enum TunDnsError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fake-IP pool errors
    #[error("Fake-IP error: {0}")]
    FakeIp(#[from] FakeIpError),

    /// Skip-domain rule errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// DNS server errors
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TunDnsError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Rule(_) => false,
            Self::FakeIp(e) => e.is_recoverable(),
            Self::Dns(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are generally not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Fake-IP pool errors
#[derive(Debug, Error)]
pub enum FakeIpError {
    /// The configured prefix leaves no room for allocation
    #[error("Invalid fake-IP range {prefix}: {reason}")]
    InvalidRange { prefix: Ipv4Net, reason: String },

    /// Store capacity must be non-zero
    #[error("Invalid fake-IP store capacity: {0}")]
    InvalidCapacity(usize),

    /// The backing store failed to flush
    #[error("Failed to flush fake-IP store: {0}")]
    Flush(#[source] io::Error),
}

impl FakeIpError {
    /// Create a range error
    pub fn invalid_range(prefix: Ipv4Net, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            prefix,
            reason: reason.into(),
        }
    }

    /// Only store flush failures may succeed on retry
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Flush(_))
    }
}

/// Skip-domain rule errors
#[derive(Debug, Error)]
pub enum RuleError {
    /// Regex pattern failed to compile
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// Pattern string could not be interpreted
    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    /// Matcher automaton failed to build
    #[error("Failed to compile domain rules: {0}")]
    CompilationError(String),
}

impl From<FakeIpError> for DnsError {
    fn from(err: FakeIpError) -> Self {
        match err {
            FakeIpError::Flush(source) => Self::network_io("fake-IP store flush failed", source),
            other => Self::config(other.to_string()),
        }
    }
}

impl From<RuleError> for ConfigError {
    fn from(err: RuleError) -> Self {
        Self::ValidationError(err.to_string())
    }
}
