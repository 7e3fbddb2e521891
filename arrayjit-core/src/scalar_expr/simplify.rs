//! Bottom-up, memoized algebraic simplification (§3.1 "Simplification
//! rules").
//!
//! `simplify` is idempotent: rewriting an already-simplified tree produces
//! the same id, because hash-consing means "no rule applies" and "rewrite
//! to the canonical form" converge on the same interned node either way.

use rustc_hash::FxHashMap;

use super::eval::{evaluate, EvalContext};
use super::graph::{ScalarExprId, ScalarGraph};
use super::op::{ExprArg, Op};
use crate::dtype::Literal;

pub fn simplify(graph: &mut ScalarGraph, root: ScalarExprId) -> ScalarExprId {
    let mut memo = FxHashMap::default();
    simplify_rec(graph, root, &mut memo)
}

fn simplify_rec(
    graph: &mut ScalarGraph,
    id: ScalarExprId,
    memo: &mut FxHashMap<ScalarExprId, ScalarExprId>,
) -> ScalarExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let op = graph.op(id);
    let sources: Vec<ScalarExprId> = graph.sources(id).to_vec();
    let simplified_sources: Vec<ScalarExprId> =
        sources.iter().map(|&s| simplify_rec(graph, s, memo)).collect();

    let rebuilt = rebuild(graph, id, op, &simplified_sources);
    let result = apply_rules(graph, rebuilt);
    memo.insert(id, result);
    result
}

/// Re-interns the node with its (already-simplified) sources; leaves
/// leaves (`Const`/`Special`) untouched since they have no sources to
/// rewrite.
fn rebuild(
    graph: &mut ScalarGraph,
    original: ScalarExprId,
    op: Op,
    simplified_sources: &[ScalarExprId],
) -> ScalarExprId {
    match op {
        Op::Const | Op::Special => original,
        Op::GlobalIndex => {
            let gid = match graph.arg(original) {
                ExprArg::Global(gid) => *gid,
                _ => unreachable!(),
            };
            let dtype = graph.dtype(original);
            graph.global_index(gid, dtype, simplified_sources[0])
        }
        Op::Add => graph.add(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::Sub => graph.sub(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::Mul => graph.mul(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::Idiv => graph.idiv(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::Mod => graph.modulo(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::CmpLt => graph.cmplt(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::CmpNe => graph.cmpne(simplified_sources[0], simplified_sources[1]).expect("dtype preserved"),
        Op::Sin => graph.sin(simplified_sources[0]).expect("dtype preserved"),
        Op::Cos => graph.cos(simplified_sources[0]).expect("dtype preserved"),
        Op::Where => graph
            .where_(simplified_sources[0], simplified_sources[1], simplified_sources[2])
            .expect("dtype preserved"),
    }
}

fn apply_rules(graph: &mut ScalarGraph, id: ScalarExprId) -> ScalarExprId {
    // Full constant folding for closed subtrees (no Special/GlobalIndex).
    if is_closed(graph, id) {
        if let Ok(lit) = evaluate(graph, id, &EvalContext::new()) {
            let dtype = graph.dtype(id);
            return graph.konst(dtype, lit).expect("literal dtype matches");
        }
    }

    let op = graph.op(id);
    let sources = graph.sources(id).to_vec();

    match op {
        Op::Where => {
            if let Some(lit) = const_bool(graph, sources[0]) {
                return if lit { sources[1] } else { sources[2] };
            }
        }
        Op::Add => {
            if is_const_zero(graph, sources[1]) {
                return sources[0];
            }
            if is_const_zero(graph, sources[0]) {
                return sources[1];
            }
            // a + (-1)*b  =>  a - b, and its mirror (-1)*b + a  =>  a - b.
            if let Some(b) = match_neg_mul(graph, sources[1]) {
                return graph.sub(sources[0], b).expect("dtype preserved");
            }
            if let Some(b) = match_neg_mul(graph, sources[0]) {
                return graph.sub(sources[1], b).expect("dtype preserved");
            }
        }
        Op::Sub => {
            if is_const_zero(graph, sources[1]) {
                return sources[0];
            }
        }
        Op::Mul => {
            if is_const_one(graph, sources[1]) {
                return sources[0];
            }
            if is_const_one(graph, sources[0]) {
                return sources[1];
            }
            if is_const_zero(graph, sources[0]) || is_const_zero(graph, sources[1]) {
                let dtype = graph.dtype(id);
                return graph
                    .konst(dtype, crate::dtype::zero_of(dtype))
                    .expect("zero literal matches dtype");
            }
        }
        Op::Idiv => {
            if is_const_one(graph, sources[1]) {
                return sources[0];
            }
        }
        _ => {}
    }

    id
}

fn is_closed(graph: &ScalarGraph, id: ScalarExprId) -> bool {
    match graph.op(id) {
        Op::Special | Op::GlobalIndex => false,
        Op::Const => true,
        _ => graph.sources(id).to_vec().iter().all(|&s| is_closed(graph, s)),
    }
}

fn const_bool(graph: &ScalarGraph, id: ScalarExprId) -> Option<bool> {
    match (graph.op(id), graph.arg(id)) {
        (Op::Const, ExprArg::Const(Literal::Bool(b))) => Some(*b),
        _ => None,
    }
}

fn is_const_zero(graph: &ScalarGraph, id: ScalarExprId) -> bool {
    matches!((graph.op(id), graph.arg(id)), (Op::Const, ExprArg::Const(lit)) if lit.is_zero())
}

fn is_const_one(graph: &ScalarGraph, id: ScalarExprId) -> bool {
    matches!((graph.op(id), graph.arg(id)), (Op::Const, ExprArg::Const(lit)) if lit.is_one())
}

/// Recognizes `(-1) * b`, returning `b`, for the `a + (-1)*b => a - b` rule.
fn match_neg_mul(graph: &ScalarGraph, id: ScalarExprId) -> Option<ScalarExprId> {
    if graph.op(id) != Op::Mul {
        return None;
    }
    let sources = graph.sources(id);
    let (lhs, rhs) = (sources[0], sources[1]);
    if is_const_neg_one(graph, lhs) {
        Some(rhs)
    } else if is_const_neg_one(graph, rhs) {
        Some(lhs)
    } else {
        None
    }
}

fn is_const_neg_one(graph: &ScalarGraph, id: ScalarExprId) -> bool {
    match (graph.op(id), graph.arg(id)) {
        (Op::Const, ExprArg::Const(Literal::I32(-1))) => true,
        (Op::Const, ExprArg::Const(Literal::F32(v))) if *v == -1.0 => true,
        _ => false,
    }
}
