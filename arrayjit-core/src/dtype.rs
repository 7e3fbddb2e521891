//! Scalar dtypes and the literal/runtime value types tagged by them.

use core::fmt;

/// A scalar dtype supported by the expression IR.
///
/// `F16` only exists when the `f16` feature is enabled, matching §3.1's
/// "plus optionally 16-bit float".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I32,
    U32,
    F32,
    Bool,
    #[cfg(feature = "f16")]
    F16,
}

impl DType {
    /// Whether this dtype participates in `sin`/`cos` and other float-only ops.
    pub fn is_float(self) -> bool {
        match self {
            DType::F32 => true,
            #[cfg(feature = "f16")]
            DType::F16 => true,
            DType::I32 | DType::U32 | DType::Bool => false,
        }
    }

    pub fn is_bool(self) -> bool {
        matches!(self, DType::Bool)
    }

    /// Size in bytes of one scalar of this dtype, rounded as the backend's
    /// `malloc` would see it (§4.5).
    pub fn size_bytes(self) -> usize {
        match self {
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::Bool => 1,
            #[cfg(feature = "f16")]
            DType::F16 => 2,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::I32 => "i32",
            DType::U32 => "u32",
            DType::F32 => "f32",
            DType::Bool => "bool",
            #[cfg(feature = "f16")]
            DType::F16 => "f16",
        };
        f.write_str(s)
    }
}

/// A literal value of a declared dtype, used as the `arg` of a `Const` node
/// and as the result of evaluation.
#[derive(Debug, Clone, Copy)]
pub enum Literal {
    I32(i32),
    U32(u32),
    F32(f32),
    Bool(bool),
    #[cfg(feature = "f16")]
    F16(half::f16),
}

impl Literal {
    pub fn dtype(self) -> DType {
        match self {
            Literal::I32(_) => DType::I32,
            Literal::U32(_) => DType::U32,
            Literal::F32(_) => DType::F32,
            Literal::Bool(_) => DType::Bool,
            #[cfg(feature = "f16")]
            Literal::F16(_) => DType::F16,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Literal::I32(v) => v == 0,
            Literal::U32(v) => v == 0,
            Literal::F32(v) => v == 0.0,
            Literal::Bool(v) => !v,
            #[cfg(feature = "f16")]
            Literal::F16(v) => v == half::f16::ZERO,
        }
    }

    pub fn is_one(self) -> bool {
        match self {
            Literal::I32(v) => v == 1,
            Literal::U32(v) => v == 1,
            Literal::F32(v) => v == 1.0,
            Literal::Bool(v) => v,
            #[cfg(feature = "f16")]
            Literal::F16(v) => v == half::f16::ONE,
        }
    }

    /// Hash/equality key that treats floats bitwise, so that `Literal` can
    /// live inside a hash-consing key (`f32` is not `Eq`/`Hash` by itself).
    pub(crate) fn bit_key(self) -> (u8, u64) {
        match self {
            Literal::I32(v) => (0, v as u32 as u64),
            Literal::U32(v) => (1, v as u64),
            Literal::F32(v) => (2, v.to_bits() as u64),
            Literal::Bool(v) => (3, v as u64),
            #[cfg(feature = "f16")]
            Literal::F16(v) => (4, v.to_bits() as u64),
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        self.bit_key() == other.bit_key()
    }
}
impl Eq for Literal {}
impl core::hash::Hash for Literal {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.bit_key().hash(state)
    }
}

/// The boolean zero value used when a masked `View` read falls outside the
/// valid interior (§3.2).
pub fn zero_of(dtype: DType) -> Literal {
    match dtype {
        DType::I32 => Literal::I32(0),
        DType::U32 => Literal::U32(0),
        DType::F32 => Literal::F32(0.0),
        DType::Bool => Literal::Bool(false),
        #[cfg(feature = "f16")]
        DType::F16 => Literal::F16(half::f16::ZERO),
    }
}
