//! Target addresses

use std::fmt;

/// An address in the target's address space.
///
/// Has no relationship to local addresses and is never dereferenced
/// locally. The raw value is what crosses the function-table boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RemoteAddress(u64);

impl RemoteAddress {
    /// Returned by symbol lookups that fail to resolve.
    pub const INVALID: RemoteAddress = RemoteAddress(0);

    pub const fn new(address_data: u64) -> Self {
        Self(address_data)
    }

    /// The raw value passed to foreign implementations.
    pub const fn address_data(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl From<u64> for RemoteAddress {
    fn from(address_data: u64) -> Self {
        Self(address_data)
    }
}

impl From<RemoteAddress> for u64 {
    fn from(address: RemoteAddress) -> Self {
        address.0
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
