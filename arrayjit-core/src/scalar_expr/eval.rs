//! Concrete evaluation of a `ScalarExpr` under a binding context.
//!
//! Used two ways: directly, by the CPU reference backend materializing a
//! kernel one output index at a time, and internally, by the simplifier's
//! constant-folding rule for subtrees with no free variables (§3.1).

use rustc_hash::FxHashMap;

use super::graph::{ScalarExprId, ScalarGraph};
use super::op::{ExprArg, Op, SpecialKind};
use crate::dtype::{DType, Literal};

/// Supplies the runtime value backing a `GlobalIndex` read.
///
/// The CPU backend implements this over its own buffers; the simplifier
/// never needs an implementation because it only evaluates subtrees with no
/// `GlobalIndex` node (see `is_closed` in `simplify.rs`). `dtype` is the
/// `GlobalIndex` node's own declared dtype, needed to interpret the raw
/// bytes at `linear_index`.
pub trait BufferSource {
    fn read(&self, gid: u32, dtype: DType, linear_index: i64) -> Literal;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("no binding for special variable '{0}' in this context")]
    UnboundSpecial(SpecialKind),
    #[error("global_index(#{0}) evaluated without a buffer source")]
    NoBufferSource(u32),
    #[error("integer division or modulo by zero")]
    DivByZero,
}

/// Bindings for a single evaluation: one value per `SpecialKind` plus an
/// optional buffer source for `GlobalIndex` nodes.
///
/// `Gidx`/`Ridx` are conventionally bound with `Literal::I32`; `Acc`/`Elem`
/// (see `SpecialKind`) may carry any dtype, matching the kernel's output.
#[derive(Default, Clone)]
pub struct EvalContext<'a> {
    specials: FxHashMap<SpecialKind, Literal>,
    buffers: Option<&'a dyn BufferSource>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self { specials: FxHashMap::default(), buffers: None }
    }

    pub fn with_special(mut self, kind: SpecialKind, value: Literal) -> Self {
        self.specials.insert(kind, value);
        self
    }

    pub fn with_index_special(self, kind: SpecialKind, value: i64) -> Self {
        self.with_special(kind, Literal::I32(value as i32))
    }

    pub fn with_buffers(mut self, buffers: &'a dyn BufferSource) -> Self {
        self.buffers = Some(buffers);
        self
    }
}

pub fn evaluate(
    graph: &ScalarGraph,
    id: ScalarExprId,
    ctx: &EvalContext<'_>,
) -> Result<Literal, EvalError> {
    let node = graph.node(id);
    match node.op {
        Op::Const => match node.arg {
            ExprArg::Const(lit) => Ok(lit),
            _ => unreachable!("Const node without a Const arg"),
        },
        Op::Special => match node.arg {
            ExprArg::Special { name, .. } => {
                ctx.specials.get(&name).copied().ok_or(EvalError::UnboundSpecial(name))
            }
            _ => unreachable!("Special node without a Special arg"),
        },
        Op::GlobalIndex => {
            let gid = match node.arg {
                ExprArg::Global(gid) => gid,
                _ => unreachable!("GlobalIndex node without a Global arg"),
            };
            let index = evaluate(graph, node.sources[0], ctx)?;
            let buffers = ctx.buffers.ok_or(EvalError::NoBufferSource(gid))?;
            Ok(buffers.read(gid, node.dtype, literal_as_i64(index)))
        }
        Op::Add | Op::Sub | Op::Mul | Op::Idiv | Op::Mod => {
            let a = evaluate(graph, node.sources[0], ctx)?;
            let b = evaluate(graph, node.sources[1], ctx)?;
            eval_binary(node.op, a, b)
        }
        Op::CmpLt | Op::CmpNe => {
            let a = evaluate(graph, node.sources[0], ctx)?;
            let b = evaluate(graph, node.sources[1], ctx)?;
            Ok(Literal::Bool(eval_compare(node.op, a, b)))
        }
        Op::Sin | Op::Cos => {
            let x = evaluate(graph, node.sources[0], ctx)?;
            Ok(eval_unary_float(node.op, x))
        }
        Op::Where => {
            let c = evaluate(graph, node.sources[0], ctx)?;
            let cond = match c {
                Literal::Bool(b) => b,
                _ => unreachable!("where condition is always bool by construction"),
            };
            if cond {
                evaluate(graph, node.sources[1], ctx)
            } else {
                evaluate(graph, node.sources[2], ctx)
            }
        }
    }
}

fn literal_as_i64(lit: Literal) -> i64 {
    match lit {
        Literal::I32(v) => v as i64,
        Literal::U32(v) => v as i64,
        Literal::F32(v) => v as i64,
        Literal::Bool(v) => v as i64,
        #[cfg(feature = "f16")]
        Literal::F16(v) => v.to_f32() as i64,
    }
}

/// Floor division/modulo, per §3.1 ("Integer `idiv` truncates toward
/// negative infinity ... `mod` is the complement").
fn floor_div_mod(a: i64, b: i64) -> Result<(i64, i64), EvalError> {
    if b == 0 {
        return Err(EvalError::DivByZero);
    }
    let q = a.div_euclid(b);
    let r = a.rem_euclid(b);
    // `div_euclid`/`rem_euclid` round toward the remainder's sign matching
    // the divisor's magnitude; adjust to floor semantics (remainder takes
    // the divisor's sign).
    if r != 0 && (r < 0) != (b < 0) {
        Ok((q - 1, r + b))
    } else {
        Ok((q, r))
    }
}

fn eval_binary(op: Op, a: Literal, b: Literal) -> Result<Literal, EvalError> {
    Ok(match (a, b) {
        (Literal::I32(x), Literal::I32(y)) => match op {
            Op::Add => Literal::I32(x.wrapping_add(y)),
            Op::Sub => Literal::I32(x.wrapping_sub(y)),
            Op::Mul => Literal::I32(x.wrapping_mul(y)),
            Op::Idiv => Literal::I32(floor_div_mod(x as i64, y as i64)?.0 as i32),
            Op::Mod => Literal::I32(floor_div_mod(x as i64, y as i64)?.1 as i32),
            _ => unreachable!(),
        },
        (Literal::U32(x), Literal::U32(y)) => match op {
            Op::Add => Literal::U32(x.wrapping_add(y)),
            Op::Sub => Literal::U32(x.wrapping_sub(y)),
            Op::Mul => Literal::U32(x.wrapping_mul(y)),
            Op::Idiv => {
                if y == 0 {
                    return Err(EvalError::DivByZero);
                }
                Literal::U32(x / y)
            }
            Op::Mod => {
                if y == 0 {
                    return Err(EvalError::DivByZero);
                }
                Literal::U32(x % y)
            }
            _ => unreachable!(),
        },
        (Literal::F32(x), Literal::F32(y)) => match op {
            Op::Add => Literal::F32(x + y),
            Op::Sub => Literal::F32(x - y),
            Op::Mul => Literal::F32(x * y),
            // Floor semantics (§3.1) are scoped to integer `idiv`; on floats
            // `idiv`/`mod` are ordinary division and its remainder, which is
            // what a `reciprocal` primitive (`1 idiv x`) needs.
            Op::Idiv => Literal::F32(x / y),
            Op::Mod => Literal::F32(x % y),
            _ => unreachable!(),
        },
        (Literal::Bool(x), Literal::Bool(y)) => match op {
            // §3.1: boolean `add` means OR, boolean `mul` means AND.
            Op::Add => Literal::Bool(x || y),
            Op::Mul => Literal::Bool(x && y),
            Op::Sub => Literal::Bool(x && !y),
            Op::Idiv | Op::Mod => Literal::Bool(x && y),
        },
        _ => unreachable!("binary op on mismatched dtypes; graph construction forbids this"),
    })
}

fn eval_compare(op: Op, a: Literal, b: Literal) -> bool {
    match (a, b) {
        (Literal::I32(x), Literal::I32(y)) => cmp_scalar(op, x, y),
        (Literal::U32(x), Literal::U32(y)) => cmp_scalar(op, x, y),
        (Literal::F32(x), Literal::F32(y)) => match op {
            Op::CmpLt => x < y,
            Op::CmpNe => x != y,
            _ => unreachable!(),
        },
        (Literal::Bool(x), Literal::Bool(y)) => match op {
            Op::CmpLt => !x & y,
            Op::CmpNe => x != y,
            _ => unreachable!(),
        },
        _ => unreachable!("compare op on mismatched dtypes; graph construction forbids this"),
    }
}

fn cmp_scalar<T: PartialOrd + PartialEq>(op: Op, x: T, y: T) -> bool {
    match op {
        Op::CmpLt => x < y,
        Op::CmpNe => x != y,
        _ => unreachable!(),
    }
}

fn eval_unary_float(op: Op, x: Literal) -> Literal {
    match x {
        Literal::F32(v) => match op {
            Op::Sin => Literal::F32(v.sin()),
            Op::Cos => Literal::F32(v.cos()),
            _ => unreachable!(),
        },
        #[cfg(feature = "f16")]
        Literal::F16(v) => {
            let f = v.to_f32();
            let r = match op {
                Op::Sin => f.sin(),
                Op::Cos => f.cos(),
                _ => unreachable!(),
            };
            Literal::F16(half::f16::from_f32(r))
        }
        _ => unreachable!("sin/cos on non-float dtype; graph construction forbids this"),
    }
}
