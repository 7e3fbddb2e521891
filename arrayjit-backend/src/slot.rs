//! `Slot`: an opaque, backend-owned reference to a buffer (§3.3).

use core::fmt;

/// A handle returned by `Backend::malloc`. Opaque to callers; only the
/// backend that created it knows how to resolve it to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot(pub(crate) u64);

impl Slot {
    /// Exposed for backends and tests that need a stable key; not meant for
    /// cross-backend comparison.
    pub fn raw_id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}
