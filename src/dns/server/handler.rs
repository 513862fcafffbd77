//! DNS query handler
//!
//! Decides, per query, between a synthesized fake-IP answer and a forwarded
//! upstream exchange. Only the first question of a message is considered.
//!
//! # Dispatch
//!
//! ```text
//! Incoming Query
//!     |
//!     v
//! First question? ── no ──────────────────────────────> SERVFAIL
//!     |
//!     v
//! Virtual mode, type A, not skipped? ── yes ──> fake-IP answer (TTL 1)
//!     |
//!     v
//! Virtual mode without redirect? ── yes ──────────────> SERVFAIL
//!     |
//!     v
//! Upstream exchange (bounded by timeout) ── error ────> SERVFAIL
//!     |
//!     v
//! Upstream response, unmodified
//! ```
//!
//! Failed queries are answered with a copy of the request marked as a
//! response with `SERVFAIL`, so clients never wait on a dropped packet.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tracing::{debug, trace, warn};

use crate::dns::client::DnsExchange;
use crate::dns::config::DnsMode;
use crate::dns::error::{DnsError, DnsResult};
use crate::fakeip::FakeIpPool;
use crate::rules::DomainMatch;

/// TTL applied to every record of a synthesized answer
pub const FAKE_IP_TTL: u32 = 1;

/// Default bound on one forwarded exchange
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Statistics for the DNS handler
#[derive(Debug, Default)]
pub struct HandlerStats {
    /// Total queries handled
    queries: AtomicU64,
    /// Queries answered with a fake address
    synthesized: AtomicU64,
    /// Queries answered by the upstream
    forwarded: AtomicU64,
    /// Queries answered with SERVFAIL
    failures: AtomicU64,
    /// Failures caused by the upstream deadline
    timeouts: AtomicU64,
    /// Responses received on the listener and ignored
    ignored: AtomicU64,
    /// Datagrams that could not be parsed
    parse_errors: AtomicU64,
}

impl HandlerStats {
    /// Create a snapshot of current stats
    #[must_use]
    pub fn snapshot(&self) -> HandlerStatsSnapshot {
        HandlerStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of handler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerStatsSnapshot {
    pub queries: u64,
    pub synthesized: u64,
    pub forwarded: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub ignored: u64,
    pub parse_errors: u64,
}

/// Per-query dispatcher shared by all request tasks
#[derive(Debug)]
pub struct DnsHandler {
    mode: DnsMode,
    redirect_upstream: bool,
    pool: Option<Arc<FakeIpPool>>,
    upstream: Option<Arc<dyn DnsExchange>>,
    skip: Option<Arc<dyn DomainMatch>>,
    upstream_timeout: Duration,
    stats: HandlerStats,
}

impl DnsHandler {
    /// Start building a handler for `mode`
    #[must_use]
    pub fn builder(mode: DnsMode) -> DnsHandlerBuilder {
        DnsHandlerBuilder {
            mode,
            redirect_upstream: false,
            pool: None,
            upstream: None,
            skip: None,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Answering mode
    #[must_use]
    pub fn mode(&self) -> DnsMode {
        self.mode
    }

    /// Fake-IP pool used in virtual mode
    #[must_use]
    pub fn pool(&self) -> Option<&Arc<FakeIpPool>> {
        self.pool.as_ref()
    }

    /// Get handler statistics
    #[must_use]
    pub fn stats(&self) -> &HandlerStats {
        &self.stats
    }

    /// Produce the response for one query
    ///
    /// Never fails: any error becomes a SERVFAIL copy of the request.
    pub async fn handle(&self, query: &Message) -> Message {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        match self.resolve(query).await {
            Ok(response) => response,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_timeout() {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                // refusals and transient upstream trouble are routine
                let routine = e.is_recoverable()
                    || matches!(e, DnsError::RedirectDisabled { .. } | DnsError::InvalidQuery { .. });
                if routine {
                    debug!(id = query.id(), error = %e, "answering SERVFAIL");
                } else {
                    warn!(id = query.id(), error = %e, "answering SERVFAIL");
                }
                servfail_response(query)
            }
        }
    }

    /// Handle one raw datagram and return the encoded reply
    ///
    /// Unparseable datagrams carrying at least an ID get a `FORMERR` reply;
    /// shorter ones are dropped (`None`). Messages with the QR bit set are
    /// responses, not queries, and are dropped too.
    pub async fn handle_bytes(&self, data: &[u8]) -> Option<Vec<u8>> {
        let query = match Message::from_vec(data) {
            Ok(query) => query,
            Err(e) => {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                debug!(len = data.len(), error = %e, "failed to parse DNS query");
                return formerr_response(data);
            }
        };

        if query.message_type() == MessageType::Response {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(id = query.id(), "ignoring DNS response sent to the listener");
            return None;
        }

        let response = self.handle(&query).await;
        match encode(&response) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(id = query.id(), error = %e, "failed to encode response");
                encode(&servfail_response(&query)).ok()
            }
        }
    }

    async fn resolve(&self, query: &Message) -> DnsResult<Message> {
        let question = query
            .queries()
            .first()
            .ok_or_else(|| DnsError::invalid_query("at least one question is required", query.id()))?;

        if self.mode == DnsMode::Virtual {
            let name = question.name().to_string();

            if question.query_type() == RecordType::A && !self.is_skipped(&name) {
                if let Some(pool) = &self.pool {
                    let ip = pool.lookup(&name);
                    self.stats.synthesized.fetch_add(1, Ordering::Relaxed);
                    trace!(qname = %name, ip = %ip, "synthesized fake-IP answer");
                    return Ok(virtual_response(query, question.name().clone(), ip));
                }
            }

            if !self.redirect_upstream {
                return Err(DnsError::redirect_disabled(name));
            }
        }

        let upstream = self
            .upstream
            .as_ref()
            .ok_or_else(|| DnsError::no_upstream("no upstream exchange configured"))?;

        let response = tokio::time::timeout(self.upstream_timeout, upstream.exchange(query))
            .await
            .map_err(|_| {
                DnsError::timeout(format!("exchange with {}", upstream.address()), self.upstream_timeout)
            })??;

        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(response)
    }

    fn is_skipped(&self, name: &str) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip.matches(name))
    }
}

/// Builder for [`DnsHandler`]
#[derive(Debug)]
pub struct DnsHandlerBuilder {
    mode: DnsMode,
    redirect_upstream: bool,
    pool: Option<Arc<FakeIpPool>>,
    upstream: Option<Arc<dyn DnsExchange>>,
    skip: Option<Arc<dyn DomainMatch>>,
    upstream_timeout: Duration,
}

impl DnsHandlerBuilder {
    /// Forward non-A and skipped queries in virtual mode
    #[must_use]
    pub fn redirect_upstream(mut self, redirect: bool) -> Self {
        self.redirect_upstream = redirect;
        self
    }

    /// Set the fake-IP pool
    #[must_use]
    pub fn pool(mut self, pool: Arc<FakeIpPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the upstream exchange
    #[must_use]
    pub fn upstream(mut self, upstream: Arc<dyn DnsExchange>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Set the matcher for names exempt from fake-IP assignment
    #[must_use]
    pub fn skip_matcher(mut self, skip: Arc<dyn DomainMatch>) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the bound on one forwarded exchange
    #[must_use]
    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Build the handler
    ///
    /// # Errors
    ///
    /// Returns `DnsError::ConfigError` if virtual mode has no pool.
    pub fn build(self) -> DnsResult<DnsHandler> {
        if self.mode == DnsMode::Virtual && self.pool.is_none() {
            return Err(DnsError::config_field(
                "virtual mode requires a fake-IP pool",
                "dns.virtual_range",
            ));
        }

        Ok(DnsHandler {
            mode: self.mode,
            redirect_upstream: self.redirect_upstream,
            pool: self.pool,
            upstream: self.upstream,
            skip: self.skip,
            upstream_timeout: self.upstream_timeout,
            stats: HandlerStats::default(),
        })
    }
}

/// Build the fake-IP answer for `query`
///
/// The response is a copy of the request with exactly one A answer, every
/// record TTL set to [`FAKE_IP_TTL`], `NOERROR` and recursion available.
fn virtual_response(query: &Message, name: Name, ip: Ipv4Addr) -> Message {
    let mut response = query.clone();
    response.take_answers();
    response.add_answer(Record::from_rdata(name, FAKE_IP_TTL, RData::A(A(ip))));

    let set_ttl = |mut records: Vec<Record>| {
        for record in &mut records {
            record.set_ttl(FAKE_IP_TTL);
        }
        records
    };
    let name_servers = set_ttl(response.take_name_servers());
    let additionals = set_ttl(response.take_additionals());
    response.insert_name_servers(name_servers);
    response.insert_additionals(additionals);

    response.set_message_type(MessageType::Response);
    response.set_response_code(ResponseCode::NoError);
    response.set_recursion_available(true);
    response
}

/// Copy of the request marked as a SERVFAIL response
#[must_use]
pub fn servfail_response(query: &Message) -> Message {
    let mut response = query.clone();
    response.set_message_type(MessageType::Response);
    response.set_response_code(ResponseCode::ServFail);
    response
}

/// FORMERR reply for an unparseable datagram, keyed by its raw ID
fn formerr_response(data: &[u8]) -> Option<Vec<u8>> {
    let id = u16::from_be_bytes([*data.first()?, *data.get(1)?]);

    let mut header = Header::new();
    header.set_id(id);
    header.set_message_type(MessageType::Response);
    header.set_op_code(OpCode::Query);
    header.set_response_code(ResponseCode::FormErr);

    let mut response = Message::new();
    response.set_header(header);
    encode(&response).ok()
}

/// Encode a response with name compression
fn encode(message: &Message) -> DnsResult<Vec<u8>> {
    message
        .to_vec()
        .map_err(|e| DnsError::serialize(format!("failed to serialize response: {e}")))
}
