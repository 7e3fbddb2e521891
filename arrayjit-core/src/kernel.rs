//! `Kernel`: a scalar pointwise expression plus an optional reduction
//! (§3.3).

use crate::dtype::DType;
use crate::scalar_expr::{Op, ScalarExprId, ScalarGraph};

/// `{axisSize, identity, combine, epilogue}` from §3.3: folds `axis_size`
/// elements with `combine`, starting from `identity`, then applies
/// `epilogue` to the accumulator before store.
#[derive(Debug, Clone)]
pub struct Reduction {
    pub axis_size: i64,
    pub identity: ScalarExprId,
    /// Binary expression combining the running accumulator (source 0) with
    /// the per-`ridx` body value (source 1).
    pub combine: ScalarExprId,
    /// Applied to the final accumulator before store; `None` is the
    /// identity epilogue.
    pub epilogue: Option<ScalarExprId>,
}

/// A compiled scalar program dispatched once per output linear index
/// (§3.3, §4.5).
#[derive(Debug, Clone)]
pub struct Kernel {
    pub output_dtype: DType,
    pub output_size: i64,
    pub body: ScalarExprId,
    pub reduction: Option<Reduction>,
}

impl Kernel {
    pub fn pointwise(output_dtype: DType, output_size: i64, body: ScalarExprId) -> Kernel {
        Kernel { output_dtype, output_size, body, reduction: None }
    }

    pub fn reducing(
        output_dtype: DType,
        output_size: i64,
        body: ScalarExprId,
        reduction: Reduction,
    ) -> Kernel {
        Kernel { output_dtype, output_size, body, reduction: Some(reduction) }
    }

    /// The number of bound input buffers: the highest `GlobalIndex` gid
    /// referenced anywhere in the kernel, plus one (§3.3).
    pub fn nargs(&self, graph: &ScalarGraph) -> u32 {
        let mut max_gid: Option<u32> = None;
        let mut visit = |root: ScalarExprId| {
            walk_global_indices(graph, root, &mut |gid| {
                max_gid = Some(max_gid.map_or(gid, |m| m.max(gid)));
            });
        };
        visit(self.body);
        if let Some(r) = &self.reduction {
            visit(r.identity);
            visit(r.combine);
            if let Some(e) = r.epilogue {
                visit(e);
            }
        }
        max_gid.map_or(0, |m| m + 1)
    }
}

fn walk_global_indices(graph: &ScalarGraph, id: ScalarExprId, f: &mut impl FnMut(u32)) {
    if graph.op(id) == Op::GlobalIndex {
        if let crate::scalar_expr::ExprArg::Global(gid) = graph.arg(id) {
            f(*gid);
        }
    }
    for &s in graph.sources(id) {
        walk_global_indices(graph, s, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::Literal;

    #[test]
    fn nargs_is_highest_gid_plus_one() {
        let mut g = ScalarGraph::new();
        let idx = g.konst(DType::I32, Literal::I32(0)).unwrap();
        let a = g.global_index(0, DType::F32, idx);
        let b = g.global_index(2, DType::F32, idx);
        let body = g.add(a, b).unwrap();
        let kernel = Kernel::pointwise(DType::F32, 16, body);
        assert_eq!(kernel.nargs(&g), 3);
    }
}
