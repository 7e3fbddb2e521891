//! The primitive set (§4.1) and the single place their scalar semantics are
//! defined.
//!
//! Every other piece that needs to know what `add` or `sin` *means* —
//! eager array ops, the JVP/vmap rule tables, the jit materializer's
//! fusion — calls through here instead of re-deriving it.

use arrayjit_core::prelude::*;
use smallvec::SmallVec;

use crate::errors::{ArrayError, UnsupportedError};

pub type Axes = SmallVec<[usize; 4]>;
pub type Shape = SmallVec<[i64; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Ne,
    Le,
    Gt,
    Ge,
    Eq,
}

/// The atomic array operation every transform recognizes (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Add,
    Mul,
    Idiv,
    Mod,
    Neg,
    Reciprocal,
    Sin,
    Cos,
    Min,
    Max,
    Compare(CompareOp),
    ReduceSum { axes: Axes, keepdims: bool },
    Where,
    Transpose { perm: Axes },
    Broadcast { shape: Shape, axes: Axes },
    Reshape { shape: Shape },
    Flip { axes: Axes },
    JitCall { num_consts: usize },
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Add => "add",
            Primitive::Mul => "mul",
            Primitive::Idiv => "idiv",
            Primitive::Mod => "mod",
            Primitive::Neg => "neg",
            Primitive::Reciprocal => "reciprocal",
            Primitive::Sin => "sin",
            Primitive::Cos => "cos",
            Primitive::Min => "min",
            Primitive::Max => "max",
            Primitive::Compare(_) => "compare",
            Primitive::ReduceSum { .. } => "reduce_sum",
            Primitive::Where => "where",
            Primitive::Transpose { .. } => "transpose",
            Primitive::Broadcast { .. } => "broadcast",
            Primitive::Reshape { .. } => "reshape",
            Primitive::Flip { .. } => "flip",
            Primitive::JitCall { .. } => "jit_call",
        }
    }

    /// Whether this primitive's tangents are forced to zero under JVP (§4.2:
    /// "compare, all boolean-producing ops").
    pub fn produces_bool(&self) -> bool {
        matches!(self, Primitive::Compare(_))
    }

    /// Builds this primitive's scalar-IR body given its already-folded
    /// operand expressions. Only valid for primitives with a pointwise
    /// scalar encoding (arithmetic, compare, where, min/max, neg,
    /// reciprocal, sin/cos); shape-only primitives and `ReduceSum`/`JitCall`
    /// are handled by `array`/`materialize`/`transforms::jit` directly.
    pub fn apply_scalar(
        &self,
        graph: &mut ScalarGraph,
        args: &[ScalarExprId],
    ) -> Result<ScalarExprId, ArrayError> {
        Ok(match self {
            Primitive::Add => graph.add(args[0], args[1])?,
            Primitive::Mul => graph.mul(args[0], args[1])?,
            Primitive::Idiv => graph.idiv(args[0], args[1])?,
            Primitive::Mod => graph.modulo(args[0], args[1])?,
            Primitive::Neg => {
                let dtype = graph.dtype(args[0]);
                let neg_one = graph.konst(dtype, neg_one_of(dtype))?;
                graph.mul(args[0], neg_one)?
            }
            Primitive::Reciprocal => {
                let dtype = graph.dtype(args[0]);
                let one = graph.konst(dtype, one_of(dtype))?;
                graph.idiv(one, args[0])?
            }
            Primitive::Sin => graph.sin(args[0])?,
            Primitive::Cos => graph.cos(args[0])?,
            Primitive::Min => {
                let lt = graph.cmplt(args[1], args[0])?;
                graph.where_(lt, args[1], args[0])?
            }
            Primitive::Max => {
                let lt = graph.cmplt(args[0], args[1])?;
                graph.where_(lt, args[1], args[0])?
            }
            Primitive::Compare(cmp) => apply_compare(graph, *cmp, args[0], args[1])?,
            Primitive::Where => graph.where_(args[0], args[1], args[2])?,
            other => {
                return Err(ArrayError::Unsupported(UnsupportedError {
                    primitive: other.name(),
                    transform: "apply_scalar (not a pointwise-scalar primitive)",
                }))
            }
        })
    }
}

fn apply_compare(
    graph: &mut ScalarGraph,
    cmp: CompareOp,
    a: ScalarExprId,
    b: ScalarExprId,
) -> Result<ScalarExprId, arrayjit_core::errors::DtypeError> {
    Ok(match cmp {
        CompareOp::Lt => graph.cmplt(a, b)?,
        CompareOp::Ne => graph.cmpne(a, b)?,
        CompareOp::Gt => graph.cmplt(b, a)?,
        // le(a,b) = not lt(b,a); ge(a,b) = not lt(a,b) -- NOT via cmpne(_, true).
        CompareOp::Le => {
            let gt = graph.cmplt(b, a)?;
            let t = graph.konst(DType::Bool, Literal::Bool(true))?;
            graph.cmpne(gt, t)?
        }
        CompareOp::Ge => {
            let lt = graph.cmplt(a, b)?;
            let t = graph.konst(DType::Bool, Literal::Bool(true))?;
            graph.cmpne(lt, t)?
        }
        // eq(a,b) = not ne(a,b).
        CompareOp::Eq => {
            let ne = graph.cmpne(a, b)?;
            let t = graph.konst(DType::Bool, Literal::Bool(true))?;
            graph.cmpne(ne, t)?
        }
    })
}

fn neg_one_of(dtype: DType) -> Literal {
    match dtype {
        DType::I32 => Literal::I32(-1),
        DType::F32 => Literal::F32(-1.0),
        DType::U32 => Literal::U32(u32::MAX),
        DType::Bool => Literal::Bool(true),
        #[cfg(feature = "f16")]
        DType::F16 => Literal::F16(half::f16::from_f32(-1.0)),
    }
}

fn one_of(dtype: DType) -> Literal {
    match dtype {
        DType::I32 => Literal::I32(1),
        DType::U32 => Literal::U32(1),
        DType::F32 => Literal::F32(1.0),
        DType::Bool => Literal::Bool(true),
        #[cfg(feature = "f16")]
        DType::F16 => Literal::F16(half::f16::ONE),
    }
}
