//! Cache key for upstream responses
//!
//! Names are lowercased and stripped of the trailing root dot, so
//! `Example.COM.` and `example.com` share one entry.
//!
//! # Example
//!
//! ```
//! use tun_dns::dns::cache::CacheKey;
//!
//! let key1 = CacheKey::new("Example.COM.", 1, 1);
//! let key2 = CacheKey::new("example.com", 1, 1);
//! assert_eq!(key1, key2);
//! ```

use hickory_proto::op::Message;

/// Cache key: normalized query name, type and class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    qname: String,
    qtype: u16,
    qclass: u16,
}

impl CacheKey {
    /// Create a new cache key
    #[must_use]
    pub fn new(qname: impl AsRef<str>, qtype: u16, qclass: u16) -> Self {
        Self {
            qname: normalize_domain(qname.as_ref()),
            qtype,
            qclass,
        }
    }

    /// Extract a cache key from the first question of a message
    ///
    /// Returns `None` if the message has no questions.
    #[must_use]
    pub fn from_query(query: &Message) -> Option<Self> {
        let q = query.queries().first()?;
        Some(Self::new(
            q.name().to_string(),
            q.query_type().into(),
            u16::from(q.query_class()),
        ))
    }

    /// Get the normalized query name
    #[must_use]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    /// Get the query type
    #[must_use]
    pub fn qtype(&self) -> u16 {
        self.qtype
    }

    /// Get the query class
    #[must_use]
    pub fn qclass(&self) -> u16 {
        self.qclass
    }
}

fn normalize_domain(domain: &str) -> String {
    let domain = domain.to_ascii_lowercase();
    match domain.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => domain,
    }
}
