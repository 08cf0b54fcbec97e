//! The fixed capability identifier set and its parsing.
//!
//! Capabilities are named effects a definition must declare (via
//! `effects(...)` / `capabilities(...)`) before invoking builtins or other
//! definitions that trigger them.

use std::fmt;

/// One capability identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    IoOut,
    IoErr,
    AssetRead,
    HeapAlloc,
    Gpu,
    GpuQueue,
    PathspaceNotify,
    PathspaceInsert,
    PathspaceTake,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 9] = [
        Capability::IoOut,
        Capability::IoErr,
        Capability::AssetRead,
        Capability::HeapAlloc,
        Capability::Gpu,
        Capability::GpuQueue,
        Capability::PathspaceNotify,
        Capability::PathspaceInsert,
        Capability::PathspaceTake,
    ];

    /// The surface identifier.
    pub fn name(self) -> &'static str {
        match self {
            Capability::IoOut => "io_out",
            Capability::IoErr => "io_err",
            Capability::AssetRead => "asset_read",
            Capability::HeapAlloc => "heap_alloc",
            Capability::Gpu => "gpu",
            Capability::GpuQueue => "gpu_queue",
            Capability::PathspaceNotify => "pathspace_notify",
            Capability::PathspaceInsert => "pathspace_insert",
            Capability::PathspaceTake => "pathspace_take",
        }
    }

    /// Parse a surface identifier.
    pub fn parse(name: &str) -> Option<Capability> {
        Capability::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::parse(cap.name()), Some(cap));
        }
        assert_eq!(Capability::parse("io"), None);
        assert_eq!(Capability::parse(""), None);
    }
}
