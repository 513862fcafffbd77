//! DNS server integration tests
//!
//! Starts a `DnsService` on loopback and drives it with real UDP queries.
//! Forwarded queries go to a mock upstream that answers every A question
//! with `203.0.113.7` (TTL 300) and counts what it receives.
//!
//! # Test Categories
//!
//! 1. **Virtual answers**: fake-IP synthesis and rewriting
//! 2. **Skip list and redirect**: exempt domains and non-A queries
//! 3. **Upstream mode**: plain forwarding and response caching
//! 4. **Failure handling**: timeouts and malformed datagrams
//! 5. **Lifecycle**: restart and shutdown

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use tun_dns::dns::{DnsConfig, DnsMode, DnsService, ServerOptions};
use tun_dns::metadata::{Metadata, Network};

/// Address every mock upstream answer carries
const UPSTREAM_ANSWER: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 7);

// ============================================================================
// Test Helpers
// ============================================================================

/// Mock upstream resolver on loopback
struct MockUpstream {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    /// Answer A questions with [`UPSTREAM_ANSWER`], others with an empty `NoError`
    async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Count queries but never answer
    async fn silent() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(answer: bool) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let queries = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&queries);

        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                if !answer {
                    continue;
                }
                let Ok(request) = Message::from_vec(&buf[..len]) else {
                    continue;
                };

                let mut response = request.clone();
                response.set_message_type(MessageType::Response);
                response.set_recursion_available(true);
                response.set_response_code(ResponseCode::NoError);
                if let Some(query) = request.queries().first() {
                    if query.query_type() == RecordType::A {
                        response.add_answer(Record::from_rdata(
                            query.name().clone(),
                            300,
                            RData::A(A(UPSTREAM_ANSWER)),
                        ));
                    }
                }
                let _ = socket.send_to(&response.to_vec().unwrap(), src).await;
            }
        });

        Self {
            addr,
            queries,
            handle,
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reserve an ephemeral port; port 0 itself means "disabled" to the service
fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

fn local_config(upstream: &MockUpstream) -> DnsConfig {
    DnsConfig::new()
        .with_listen(format!("127.0.0.1:{}", free_udp_port()))
        .with_upstream(upstream.addr.to_string())
}

async fn start_service(config: DnsConfig) -> (DnsService, SocketAddr) {
    let mut service = DnsService::new();
    service.start(ServerOptions::new(config)).await.unwrap();
    let addr = service.local_addr().unwrap();
    (service, addr)
}

async fn query(server: SocketAddr, domain: &str, qtype: RecordType, id: u16) -> Message {
    let mut request = Message::new();
    request.set_id(id);
    request.set_recursion_desired(true);
    request.add_query(Query::query(Name::from_str(domain).unwrap(), qtype));
    exchange_raw(server, &request.to_vec().unwrap()).await
}

async fn exchange_raw(server: SocketAddr, bytes: &[u8]) -> Message {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(bytes, server).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no reply from DNS server")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

fn first_a(message: &Message) -> Ipv4Addr {
    match message.answers().first().and_then(Record::data) {
        Some(RData::A(a)) => a.0,
        other => panic!("expected A answer, got {other:?}"),
    }
}

// ============================================================================
// Virtual answers
// ============================================================================

#[tokio::test]
async fn test_virtual_answer_is_stable() {
    let upstream = MockUpstream::start().await;
    let (mut service, addr) = start_service(local_config(&upstream)).await;

    let first = query(addr, "example.com.", RecordType::A, 0x1111).await;
    let second = query(addr, "EXAMPLE.com.", RecordType::A, 0x2222).await;

    assert_eq!(first.id(), 0x1111);
    assert_eq!(second.id(), 0x2222);
    for response in [&first, &second] {
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert!(response.recursion_available());
        assert_eq!(response.answers().len(), 1);
        assert_eq!(response.answers()[0].ttl(), 1);
    }

    let ip = first_a(&first);
    assert_eq!(first_a(&second), ip);
    assert!(service.pool().unwrap().contains(ip));
    assert_eq!(upstream.queries(), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_virtual_answer_rewrites_back() {
    let upstream = MockUpstream::start().await;
    let (mut service, addr) = start_service(local_config(&upstream)).await;

    let response = query(addr, "api.example.com.", RecordType::A, 7).await;
    let ip = first_a(&response);

    let mut metadata = Metadata::new(Network::Tcp, IpAddr::V4(ip), 443)
        .with_source(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 40000);
    assert!(service.rewriter().rewrite(&mut metadata));
    assert_eq!(metadata.dst_name.as_deref(), Some("api.example.com"));
    assert_eq!(metadata.dst_ip, None);

    service.shutdown().await;
}

// ============================================================================
// Skip list and redirect
// ============================================================================

#[tokio::test]
async fn test_skipped_domain_without_redirect_fails() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream).with_skip_domains(["+.lan"]);
    let (mut service, addr) = start_service(config).await;

    let response = query(addr, "nas.lan.", RecordType::A, 42).await;
    assert_eq!(response.id(), 42);
    assert_eq!(response.response_code(), ResponseCode::ServFail);
    assert!(response.answers().is_empty());
    assert_eq!(upstream.queries(), 0);

    service.shutdown().await;
}

#[tokio::test]
async fn test_skipped_domain_with_redirect_is_forwarded() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream)
        .with_skip_domains(["+.lan"])
        .with_redirect_upstream(true);
    let (mut service, addr) = start_service(config).await;

    let response = query(addr, "nas.lan.", RecordType::A, 43).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(first_a(&response), UPSTREAM_ANSWER);
    assert_eq!(response.answers()[0].ttl(), 300);
    assert_eq!(upstream.queries(), 1);

    // non-skipped names are still synthesized
    let response = query(addr, "example.com.", RecordType::A, 44).await;
    assert_ne!(first_a(&response), UPSTREAM_ANSWER);
    assert_eq!(upstream.queries(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_non_a_queries_follow_redirect_flag() {
    let upstream = MockUpstream::start().await;

    let (mut service, addr) = start_service(local_config(&upstream)).await;
    let response = query(addr, "example.com.", RecordType::AAAA, 1).await;
    assert_eq!(response.response_code(), ResponseCode::ServFail);
    service.shutdown().await;

    let config = local_config(&upstream).with_redirect_upstream(true);
    let (mut service, addr) = start_service(config).await;
    let response = query(addr, "example.com.", RecordType::AAAA, 2).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
    assert_eq!(upstream.queries(), 1);
    service.shutdown().await;
}

// ============================================================================
// Upstream mode
// ============================================================================

#[tokio::test]
async fn test_upstream_mode_forwards_everything() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream).with_mode(DnsMode::Upstream);
    let (mut service, addr) = start_service(config).await;

    assert!(service.pool().is_none());
    let response = query(addr, "example.com.", RecordType::A, 5).await;
    assert_eq!(first_a(&response), UPSTREAM_ANSWER);
    assert_eq!(upstream.queries(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_upstream_cache_absorbs_repeats() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream)
        .with_mode(DnsMode::Upstream)
        .with_upstream_cache(true);
    let (mut service, addr) = start_service(config).await;

    let first = query(addr, "cached.example.com.", RecordType::A, 10).await;
    let second = query(addr, "cached.example.com.", RecordType::A, 11).await;

    assert_eq!(first_a(&first), UPSTREAM_ANSWER);
    assert_eq!(first_a(&second), UPSTREAM_ANSWER);
    assert_eq!(second.id(), 11);
    assert_eq!(upstream.queries(), 1);

    service.shutdown().await;
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_unresponsive_upstream_times_out_to_servfail() {
    let upstream = MockUpstream::silent().await;
    let mut config = local_config(&upstream).with_mode(DnsMode::Upstream);
    config.upstream_timeout_secs = 1;
    let (mut service, addr) = start_service(config).await;

    let started = std::time::Instant::now();
    let response = query(addr, "slow.example.com.", RecordType::A, 99).await;
    assert_eq!(response.id(), 99);
    assert_eq!(response.response_code(), ResponseCode::ServFail);
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(upstream.queries() >= 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_malformed_datagram_gets_formerr() {
    let upstream = MockUpstream::start().await;
    let (mut service, addr) = start_service(local_config(&upstream)).await;

    let response = exchange_raw(addr, &[0x12, 0x34, 0xFF, 0xFF, 0x00]).await;
    assert_eq!(response.id(), 0x1234);
    assert_eq!(response.response_code(), ResponseCode::FormErr);

    // the listener keeps serving afterwards
    let response = query(addr, "example.com.", RecordType::A, 3).await;
    assert_eq!(response.response_code(), ResponseCode::NoError);

    let stats = service.server_stats().unwrap();
    assert_eq!(stats.packets_received, 2);

    service.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_restart_on_same_port_keeps_answers() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream);
    let (mut service, addr) = start_service(config.clone()).await;

    let before = first_a(&query(addr, "keep.example.com.", RecordType::A, 1).await);

    service.start(ServerOptions::new(config)).await.unwrap();
    assert_eq!(service.local_addr(), Some(addr));
    assert!(service.is_running());

    let after = first_a(&query(addr, "keep.example.com.", RecordType::A, 2).await);
    assert_eq!(before, after);

    service.shutdown().await;
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_restart_with_new_range_serves_from_new_pool() {
    let upstream = MockUpstream::start().await;
    let config = local_config(&upstream);
    let (mut service, addr) = start_service(config.clone()).await;
    let old_pool = Arc::clone(service.pool().unwrap());

    let before = first_a(&query(addr, "keep.example.com.", RecordType::A, 1).await);

    let range: ipnet::Ipv4Net = "10.10.0.0/16".parse().unwrap();
    let config = config.with_virtual_range(range).with_max_entries(128);
    service.start(ServerOptions::new(config)).await.unwrap();
    assert_eq!(service.local_addr(), Some(addr));

    let pool = service.pool().unwrap();
    assert!(!Arc::ptr_eq(pool, &old_pool));
    assert_eq!(pool.range(), range);
    assert_eq!(pool.look_back(before).as_deref(), Some("keep.example.com"));

    // an existing mapping keeps answering, new names come from the new range
    let kept = first_a(&query(addr, "keep.example.com.", RecordType::A, 2).await);
    assert_eq!(kept, before);
    let fresh = first_a(&query(addr, "fresh.example.com.", RecordType::A, 3).await);
    assert!(range.contains(&fresh), "{fresh} outside {range}");

    service.shutdown().await;
}

#[tokio::test]
async fn test_disabled_listener_still_installs_pool() {
    let config = DnsConfig::new().with_listen("127.0.0.1");
    let mut service = DnsService::new();
    service.start(ServerOptions::new(config)).await.unwrap();

    assert!(!service.is_running());
    let pool = service.pool().unwrap();
    let ip = pool.lookup("offline.example.com");

    let mut metadata = Metadata::new(Network::Udp, IpAddr::V4(ip), 53);
    assert!(service.rewriter().rewrite(&mut metadata));
}
