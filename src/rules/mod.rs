//! Domain rules deciding which names bypass fake-IP assignment
//!
//! The DNS handler consults a [`DomainMatch`] implementation for every
//! virtual-mode query. Matching names are forwarded upstream (when redirect
//! is enabled) instead of receiving a synthesized address.
//!
//! [`domain::DomainMatcher`] is the stock implementation, built from the
//! `skip_domains` configuration list:
//!
//! ```
//! use tun_dns::rules::{DomainMatch, domain::DomainMatcher};
//!
//! let skip = DomainMatcher::from_patterns(["+.lan", "keyword:captive"]).unwrap();
//! assert!(skip.matches("router.lan"));
//! assert!(skip.matches("captive.apple.com"));
//! assert!(!skip.matches("example.com"));
//! ```

use std::fmt::Debug;

pub mod domain;

pub use domain::{DomainMatcher, DomainMatcherBuilder};

/// Predicate over domain names
///
/// Implementations receive the queried name as it appeared on the wire
/// (possibly with a trailing dot and mixed case).
pub trait DomainMatch: Send + Sync + Debug {
    /// Check if `domain` is covered by this rule set
    fn matches(&self, domain: &str) -> bool;
}

impl DomainMatch for DomainMatcher {
    fn matches(&self, domain: &str) -> bool {
        self.is_match(domain)
    }
}
