//! Top-level error taxonomy (§7): unifies the core's errors with the ones
//! owned by tracing/transforms, the way `miden-processor`'s `errors.rs`
//! wraps `miden-air`/`vm-core` errors behind one `#[from]`-based enum.

use arrayjit_core::errors::{DtypeError, ShapeError};
use arrayjit_backend::errors::{BackendError, ReferenceError};

/// Two argument trees differ structurally (§7 `TreeMismatchError`); carries
/// both structures' string renderings so the mismatch is visible without a
/// debugger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tree mismatch between {lhs_path} and {rhs_path}: {lhs_desc} vs {rhs_desc}")]
pub struct TreeMismatchError {
    pub lhs_path: String,
    pub rhs_path: String,
    pub lhs_desc: String,
    pub rhs_desc: String,
}

/// A primitive has no rule for the transform currently active (§7
/// `UnsupportedError`), e.g. JVP requested through a boolean-producing op.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("primitive '{primitive}' has no {transform} rule")]
pub struct UnsupportedError {
    pub primitive: &'static str,
    pub transform: &'static str,
}

/// Every error a public `arrayjit` call can return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArrayError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Dtype(#[from] DtypeError),
    #[error(transparent)]
    TreeMismatch(#[from] TreeMismatchError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedError),
}
