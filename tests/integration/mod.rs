//! Integration tests for tun-dns
//!
//! # Test Organization
//!
//! - `fakeip_pool`: allocator properties through the public pool API
//! - `dns_server`: real UDP round trips against a running `DnsService`
//!   and a mock upstream resolver
//!
//! All tests bind loopback sockets only and need no network access.

pub mod dns_server;
pub mod fakeip_pool;
