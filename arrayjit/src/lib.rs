//! `arrayjit`: a JAX-flavored lazy array library (§1 OVERVIEW) — a scalar
//! arithmetic IR and shape-tracked views (`arrayjit-core`), materialized
//! against a backend (`arrayjit-backend`), driven by the tracing/transform
//! layer below (`jvp`, `vmap`, `jit`).
//!
//! Each concern gets its own module, and the common surface is re-exported
//! flat through [`prelude`].

pub mod array;
mod bytes;
pub mod conv;
pub mod device;
pub mod errors;
pub mod linalg;
mod materialize;
pub mod random;
pub mod trace;
pub mod transforms;

pub use array::Array;
pub use device::{available_devices, cpu_backend, default_device, set_default_device, Device};
pub use errors::{ArrayError, TreeMismatchError, UnsupportedError};

/// Re-exports the surface most callers need in one place (§6's public API
/// listing), flattened at the crate root instead of making callers reach
/// into submodules.
pub mod prelude {
    pub use crate::array::Array;
    pub use crate::conv::conv1d_same;
    pub use crate::device::{available_devices, cpu_backend, default_device, set_default_device, Device};
    pub use crate::errors::{ArrayError, TreeMismatchError, UnsupportedError};
    pub use crate::linalg::{dot, einsum_path, eye, eye_default, matmul, EinsumPlan};
    pub use crate::random::{bits, key, normal, normal_array, split, uniform, uniform_array, Key};
    pub use crate::trace::tree::{Flatten, TreeDef};
    pub use crate::transforms::higher_order::{
        first_derivative, second_derivative, third_derivative, DifferentiableFn, GenDual, Numeric,
    };
    pub use crate::transforms::jit::{jit, jit_call, trace_jaxpr, Jaxpr};
    pub use crate::transforms::jvp::{grad, jacfwd, jvp, Dual};
    pub use crate::transforms::vmap::{vmap, Batched};

    pub use arrayjit_core::dtype::{DType, Literal};
}
