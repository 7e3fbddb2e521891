//! The scalar arithmetic expression IR (§3.1) and its simplifier.

mod eval;
mod graph;
mod op;
mod simplify;

pub use eval::{evaluate, BufferSource, EvalContext, EvalError};
pub use graph::{ScalarExprId, ScalarGraph};
pub use op::{ExprArg, Op, SpecialKind};
pub use simplify::simplify;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::{DType, Literal};

    #[test]
    fn identity_folds() {
        let mut g = ScalarGraph::new();
        let x = g.special(SpecialKind::Gidx, 16, DType::I32);
        let zero = g.konst(DType::I32, Literal::I32(0)).unwrap();
        let one = g.konst(DType::I32, Literal::I32(1)).unwrap();

        let x_plus_zero = g.add(x, zero).unwrap();
        assert_eq!(simplify(&mut g, x_plus_zero), x);

        let x_times_one = g.mul(x, one).unwrap();
        assert_eq!(simplify(&mut g, x_times_one), x);

        let x_times_zero = g.mul(x, zero).unwrap();
        let folded = simplify(&mut g, x_times_zero);
        assert_eq!(g.op(folded), Op::Const);
    }

    #[test]
    fn sub_rewrite() {
        let mut g = ScalarGraph::new();
        let a = g.special(SpecialKind::Gidx, 16, DType::I32);
        let b = g.special(SpecialKind::Ridx, 4, DType::I32);
        let neg_one = g.konst(DType::I32, Literal::I32(-1)).unwrap();
        let neg_b = g.mul(neg_one, b).unwrap();
        let sum = g.add(a, neg_b).unwrap();

        let simplified = simplify(&mut g, sum);
        assert_eq!(g.op(simplified), Op::Sub);
        assert_eq!(g.sources(simplified), &[a, b]);
    }

    #[test]
    fn where_const_condition() {
        let mut g = ScalarGraph::new();
        let a = g.special(SpecialKind::Gidx, 16, DType::I32);
        let b = g.special(SpecialKind::Ridx, 4, DType::I32);
        let t = g.konst(DType::Bool, Literal::Bool(true)).unwrap();
        let w = g.where_(t, a, b).unwrap();
        assert_eq!(simplify(&mut g, w), a);
    }

    #[test]
    fn constant_folding_is_bit_exact() {
        let mut g = ScalarGraph::new();
        let two = g.konst(DType::F32, Literal::F32(2.0)).unwrap();
        let three = g.konst(DType::F32, Literal::F32(3.0)).unwrap();
        let sum = g.add(two, three).unwrap();
        let folded = simplify(&mut g, sum);
        match g.arg(folded) {
            ExprArg::Const(Literal::F32(v)) => assert_eq!(*v, 5.0),
            other => panic!("expected folded f32 const, got {other:?}"),
        }
    }

    #[test]
    fn simplify_is_idempotent() {
        let mut g = ScalarGraph::new();
        let a = g.special(SpecialKind::Gidx, 16, DType::I32);
        let zero = g.konst(DType::I32, Literal::I32(0)).unwrap();
        let one = g.konst(DType::I32, Literal::I32(1)).unwrap();
        let expr = g.mul(g.add(a, zero).unwrap(), one).unwrap();

        let once = simplify(&mut g, expr);
        let twice = simplify(&mut g, once);
        assert_eq!(once, twice);
    }

    #[test]
    fn hash_consing_shares_equal_subexpressions() {
        let mut g = ScalarGraph::new();
        let a = g.konst(DType::I32, Literal::I32(7)).unwrap();
        let b = g.konst(DType::I32, Literal::I32(7)).unwrap();
        assert_eq!(a, b, "equal Const nodes must intern to the same id");
    }
}
