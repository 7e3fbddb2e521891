//! Tracing transformations (§4.2–§4.4): forward-mode differentiation,
//! vectorization, and jit fusion.

pub mod higher_order;
pub mod jit;
pub mod jvp;
pub mod vmap;
