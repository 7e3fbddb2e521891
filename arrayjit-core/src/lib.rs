//! Scalar expression IR, shape tracker and kernel types (§3 of the design).
//!
//! This crate has no I/O and no notion of execution; it is the pure data
//! model shared by the tracing core, the transforms, and the kernel
//! materializer in the `arrayjit` crate, plus the backend contract in
//! `arrayjit-backend`.

pub mod dtype;
pub mod errors;
pub mod kernel;
pub mod scalar_expr;
pub mod shape_tracker;
pub mod view;

pub mod prelude {
    pub use crate::dtype::{zero_of, DType, Literal};
    pub use crate::errors::{DtypeError, ShapeError};
    pub use crate::kernel::{Kernel, Reduction};
    pub use crate::scalar_expr::{
        evaluate, simplify, BufferSource, EvalContext, EvalError, ExprArg, Op, ScalarExprId,
        ScalarGraph, SpecialKind,
    };
    pub use crate::shape_tracker::ShapeTracker;
    pub use crate::view::View;
}
