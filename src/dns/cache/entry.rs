//! Cached upstream response
//!
//! Entries hold the encoded response and the TTL it was cached for. On a hit
//! the message is decoded again, stamped with the caller's query ID, and
//! every record TTL is capped at the remaining lifetime.
//!
//! # Example
//!
//! ```
//! use tun_dns::dns::cache::CacheEntry;
//!
//! let entry = CacheEntry::new_with_ttl(vec![0u8; 12], 60);
//! assert!(!entry.is_expired());
//! assert!(entry.remaining_ttl() <= 60);
//! ```

use std::time::Instant;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::Record;

/// A cached DNS response entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized DNS response bytes
    response: Vec<u8>,
    /// TTL the entry was cached for (in seconds)
    ttl: u32,
    /// When this entry was inserted into the cache
    inserted_at: Instant,
}

impl CacheEntry {
    /// Create a new cache entry
    #[must_use]
    pub fn new_with_ttl(response: Vec<u8>, ttl: u32) -> Self {
        Self {
            response,
            ttl,
            inserted_at: Instant::now(),
        }
    }

    /// Create a cache entry from a positive response
    ///
    /// Returns `None` unless the response is `NoError` with at least one
    /// answer and a non-zero minimum answer TTL, or if it cannot be encoded.
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        if !is_positive_response(message) {
            return None;
        }

        let ttl = message.answers().iter().map(Record::ttl).min()?;
        if ttl == 0 {
            return None;
        }

        let response = message.to_vec().ok()?;
        Some(Self::new_with_ttl(response, ttl))
    }

    /// Check if the entry has outlived its TTL
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining_ttl() == 0
    }

    /// Seconds of lifetime left
    #[must_use]
    pub fn remaining_ttl(&self) -> u32 {
        let elapsed = u32::try_from(self.inserted_at.elapsed().as_secs()).unwrap_or(u32::MAX);
        self.ttl.saturating_sub(elapsed)
    }

    /// TTL the entry was cached for
    #[must_use]
    pub fn original_ttl(&self) -> u32 {
        self.ttl
    }

    /// Decode the cached response for a new query
    ///
    /// Returns `None` if the stored bytes no longer decode.
    #[must_use]
    pub fn to_adjusted_message(&self, query_id: u16) -> Option<Message> {
        let mut message = Message::from_vec(&self.response).ok()?;
        message.set_id(query_id);

        let remaining = self.remaining_ttl();
        let cap = |mut records: Vec<Record>| {
            for record in &mut records {
                record.set_ttl(record.ttl().min(remaining));
            }
            records
        };

        let answers = cap(message.take_answers());
        let name_servers = cap(message.take_name_servers());
        let additionals = cap(message.take_additionals());
        message.insert_answers(answers);
        message.insert_name_servers(name_servers);
        message.insert_additionals(additionals);

        Some(message)
    }

    /// Size of the encoded response
    #[must_use]
    pub fn size(&self) -> usize {
        self.response.len()
    }
}

/// Check if a response is worth caching
#[must_use]
pub fn is_positive_response(message: &Message) -> bool {
    message.response_code() == ResponseCode::NoError && !message.answers().is_empty()
}
