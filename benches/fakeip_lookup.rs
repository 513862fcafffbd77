//! Performance benchmarks for fake-IP lookups and virtual answers.
//!
//! Run with: `cargo bench --bench fakeip_lookup`
//!
//! Every intercepted A query takes the pool lock once, so lookups on warm
//! mappings and the full parse/synthesize/encode path are the numbers to watch.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};

use tun_dns::dns::{DnsHandler, DnsMode};
use tun_dns::fakeip::FakeIpPool;

// ============================================================================
// Test Data Generation
// ============================================================================

fn create_pool(max_entries: usize) -> FakeIpPool {
    FakeIpPool::new("198.18.0.0/16".parse().expect("valid prefix"), max_entries).expect("valid pool")
}

fn hostnames(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("host-{i}.example.com")).collect()
}

fn a_query(domain: &str) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(0x1234);
    message.set_recursion_desired(true);
    let name = Name::from_ascii(domain).expect("valid name");
    message.add_query(Query::query(name, RecordType::A));
    message.to_vec().expect("serialize message")
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_lookup_warm(c: &mut Criterion) {
    let mut group = c.benchmark_group("fakeip_lookup_warm");

    for size in [100usize, 1_000, 10_000] {
        let pool = create_pool(size);
        let hosts = hostnames(size);
        for host in &hosts {
            pool.lookup(host);
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &hosts, |b, hosts| {
            let mut i = 0;
            b.iter(|| {
                let ip = pool.lookup(black_box(&hosts[i % hosts.len()]));
                i += 1;
                ip
            });
        });
    }

    group.finish();
}

fn bench_lookup_allocate(c: &mut Criterion) {
    // small store so the benchmark also covers eviction and ring reuse
    let pool = create_pool(1_000);
    let mut i: u64 = 0;

    c.bench_function("fakeip_lookup_allocate", |b| {
        b.iter(|| {
            i += 1;
            pool.lookup(black_box(&format!("new-{i}.example.com")))
        });
    });
}

fn bench_look_back(c: &mut Criterion) {
    let pool = create_pool(1_000);
    let ips: Vec<_> = hostnames(1_000).iter().map(|h| pool.lookup(h)).collect();
    let mut i = 0;

    c.bench_function("fakeip_look_back", |b| {
        b.iter(|| {
            let host = pool.look_back(black_box(ips[i % ips.len()]));
            i += 1;
            host
        });
    });
}

fn bench_virtual_answer(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime");
    let pool = Arc::new(create_pool(1_000));
    let handler = DnsHandler::builder(DnsMode::Virtual)
        .pool(pool)
        .build()
        .expect("valid handler");
    let query = a_query("api.example.com");

    let mut group = c.benchmark_group("virtual_answer");
    group.throughput(Throughput::Bytes(query.len() as u64));
    group.bench_function("handle_bytes", |b| {
        b.iter(|| runtime.block_on(handler.handle_bytes(black_box(&query))));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_lookup_warm,
    bench_lookup_allocate,
    bench_look_back,
    bench_virtual_answer
);
criterion_main!(benches);
