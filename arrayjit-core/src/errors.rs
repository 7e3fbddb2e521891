//! Error kinds owned by the core data model (§7).
//!
//! These are leaves of the top-level `arrayjit::errors::ArrayError`; keeping
//! them here (rather than in the root crate) mirrors
//! `miden-core`'s `errors.rs` owning the error types for the types it
//! defines, with the processor crate wrapping them later.

use crate::dtype::DType;

/// Mismatched or unsupported dtypes (§7 `DtypeError`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DtypeError {
    #[error("operation '{op}' requires matching dtypes, got {lhs} and {rhs}")]
    Mismatch { op: &'static str, lhs: DType, rhs: DType },

    #[error("operation '{op}' requires a float dtype, got {found}")]
    NotFloat { op: &'static str, found: DType },

    #[error("operation '{op}' requires a boolean condition, got {found}")]
    NotBool { op: &'static str, found: DType },

    #[error("literal dtype {literal} does not match declared dtype {declared}")]
    LiteralMismatch { literal: DType, declared: DType },
}

/// Shape/view errors (§7 `ShapeError`), also covers `View`/`ShapeTracker`
/// construction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("cannot broadcast shape {lhs:?} against {rhs:?}")]
    Broadcast { lhs: Vec<i64>, rhs: Vec<i64> },

    #[error("reshape of size {from_size} into shape {to:?} (size {to_size}) changes total size")]
    ReshapeSize { from_size: i64, to: Vec<i64>, to_size: i64 },

    #[error("axis {axis} out of bounds for rank {rank}")]
    AxisOutOfBounds { axis: i64, rank: usize },

    #[error("expected {expected} begin/end pairs for rank {rank}, got {found}")]
    RankMismatch { expected: usize, rank: usize, found: usize },

    #[error("shrink/pad bounds [{begin},{end}) invalid for dimension of size {size}")]
    InvalidBounds { begin: i64, end: i64, size: i64 },
}
