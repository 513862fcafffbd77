//! Fake-IP address range geometry
//!
//! Derives the gateway and allocatable bounds from a configured prefix.
//! For `198.18.0.0/16` the layout is:
//!
//! - `198.18.0.0` network address (never allocated)
//! - `198.18.0.1` gateway, assigned to the tunnel interface
//! - `198.18.0.2` - `198.18.0.3` reserved
//! - `198.18.0.4` first allocatable address
//! - `198.18.255.255` last address; allocation stops one short of it

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::FakeIpError;

/// Offset of the first allocatable address from the gateway
const FIRST_OFFSET_FROM_GATEWAY: u32 = 3;

/// Validated fake-IP range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    prefix: Ipv4Net,
    gateway: u32,
    first: u32,
    last: u32,
}

impl AddressRange {
    /// Derive the range geometry from a prefix
    ///
    /// # Errors
    ///
    /// Returns `FakeIpError::InvalidRange` if the prefix leaves no room between
    /// the first allocatable address and the broadcast address.
    pub fn new(prefix: Ipv4Net) -> Result<Self, FakeIpError> {
        let prefix = prefix.trunc();
        let network = u32::from(prefix.network());
        let last = u32::from(prefix.broadcast());

        let gateway = network
            .checked_add(1)
            .ok_or_else(|| FakeIpError::invalid_range(prefix, "no gateway address"))?;
        let first = gateway
            .checked_add(FIRST_OFFSET_FROM_GATEWAY)
            .ok_or_else(|| FakeIpError::invalid_range(prefix, "no allocatable address"))?;

        if first >= last {
            return Err(FakeIpError::invalid_range(
                prefix,
                format!(
                    "first usable {} is not below last {}",
                    Ipv4Addr::from(first),
                    Ipv4Addr::from(last)
                ),
            ));
        }

        Ok(Self {
            prefix,
            gateway,
            first,
            last,
        })
    }

    /// The configured prefix (host bits cleared)
    #[must_use]
    pub const fn prefix(&self) -> Ipv4Net {
        self.prefix
    }

    /// Network address + 1, reserved for the tunnel interface
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.gateway)
    }

    /// First address handed out by the allocator
    #[must_use]
    pub fn first(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.first)
    }

    /// Broadcast address of the prefix; the allocator never reaches it
    #[must_use]
    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.last)
    }

    /// Number of addresses in one allocation cycle
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.last - self.first
    }

    /// Check if an address lies anywhere inside the prefix
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.prefix.contains(&addr)
    }

    /// Check if an address lies in the allocatable window `[first, last)`
    #[must_use]
    pub fn is_allocatable(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        addr >= self.first && addr < self.last
    }

    pub(crate) const fn first_raw(&self) -> u32 {
        self.first
    }

    pub(crate) const fn last_raw(&self) -> u32 {
        self.last
    }
}
