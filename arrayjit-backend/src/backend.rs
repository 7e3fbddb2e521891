//! The backend contract (§4.5): the only seam through which the core
//! reaches execution.
//!
//! Kept as a plain trait with an associated `Executable` type, rather than
//! a trait object, the way `miden-processor`'s `Host` trait is generic over
//! the concrete host implementation — callers pick one concrete backend per
//! program rather than paying for dynamic dispatch on every kernel launch.

use arrayjit_core::kernel::Kernel;
use arrayjit_core::scalar_expr::ScalarGraph;

use crate::errors::BackendError;
use crate::slot::Slot;

/// Opaque, backend-owned buffer storage plus kernel prepare/dispatch.
///
/// All methods are blocking in this crate; §4.5/§5 allow a backend to
/// suspend internally (e.g. a GPU-compute backend awaiting a device
/// round-trip), which is exactly the kind of detail the core treats as an
/// external collaborator and never inspects.
pub trait Backend {
    /// The backend's compiled form of a `Kernel` (§4.4 step 5).
    type Executable;

    /// Allocates a buffer, optionally seeded with `initial_data`, rounded up
    /// to a 64-byte alignment. Returns a `Slot` with refcount 1.
    fn malloc(&self, size_bytes: usize, initial_data: Option<&[u8]>) -> Result<Slot, BackendError>;

    fn inc_ref(&self, slot: Slot) -> Result<(), BackendError>;

    /// Decrements the refcount; frees the buffer when it reaches zero.
    fn dec_ref(&self, slot: Slot) -> Result<(), BackendError>;

    /// Reads `count` bytes (or the whole buffer when `None`) starting at
    /// `start`.
    fn read(&self, slot: Slot, start: usize, count: Option<usize>) -> Result<Vec<u8>, BackendError>;

    /// Compiles a kernel. Implementations are expected to cache by kernel
    /// source the way the wasm/GPU emitters do (§4.5); the CPU reference
    /// backend has no compile step worth caching.
    fn prepare(&self, kernel: &Kernel, graph: &ScalarGraph) -> Result<Self::Executable, BackendError>;

    /// Runs a prepared kernel, reading `inputs` in `GlobalIndex` gid order
    /// and writing `output`.
    fn dispatch(
        &self,
        exe: &Self::Executable,
        inputs: &[Slot],
        output: Slot,
    ) -> Result<(), BackendError>;

    fn name(&self) -> &'static str;
}
