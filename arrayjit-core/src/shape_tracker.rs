//! `ShapeTracker`: a composable stack of `View`s (§3.2, §3.4).
//!
//! Views are applied right-to-left: `views[0]` is the user-facing shape,
//! `views[len-1]` is closest to the backing buffer. Folding a linear output
//! index walks the list front-to-back, unraveling against each view's
//! shape in turn and feeding the resulting linear index into the next view.

use smallvec::SmallVec;

use crate::dtype::{zero_of, DType};
use crate::errors::ShapeError;
use crate::scalar_expr::{ScalarExprId, ScalarGraph};
use crate::view::View;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeTracker {
    views: SmallVec<[View; 2]>,
}

impl ShapeTracker {
    pub fn contiguous(shape: &[i64]) -> ShapeTracker {
        let mut views = SmallVec::new();
        views.push(View::contiguous(shape));
        ShapeTracker { views }
    }

    pub fn shape(&self) -> &[i64] {
        &self.views[0].shape
    }

    pub fn numel(&self) -> i64 {
        self.views[0].numel()
    }

    pub fn rank(&self) -> usize {
        self.views[0].rank()
    }

    /// A tracker is contiguous iff it is a single default-row-major view
    /// with zero offset and no mask (§3.2, §8 "Contiguity is decidable").
    pub fn is_contiguous(&self) -> bool {
        self.views.len() == 1 && self.views[0].is_default_contiguous()
    }

    fn front(&self) -> &View {
        &self.views[0]
    }

    pub fn permute(&self, axes: &[usize]) -> Result<ShapeTracker, ShapeError> {
        self.map_front(|v| v.permute(axes))
    }

    pub fn shrink(&self, bounds: &[(i64, i64)]) -> Result<ShapeTracker, ShapeError> {
        self.map_front(|v| v.shrink(bounds))
    }

    pub fn expand(&self, new_shape: &[i64]) -> Result<ShapeTracker, ShapeError> {
        self.map_front(|v| v.expand(new_shape))
    }

    pub fn pad(&self, bounds: &[(i64, i64)]) -> Result<ShapeTracker, ShapeError> {
        self.map_front(|v| v.pad(bounds))
    }

    pub fn flip(&self, axes: &[usize]) -> Result<ShapeTracker, ShapeError> {
        self.map_front(|v| v.flip(axes))
    }

    fn map_front(
        &self,
        f: impl FnOnce(&View) -> Result<View, ShapeError>,
    ) -> Result<ShapeTracker, ShapeError> {
        let mut views = self.views.clone();
        views[0] = f(&views[0])?;
        Ok(ShapeTracker { views })
    }

    /// §3.2 `reshape`: fuses into the front view when possible; otherwise
    /// prepends a fresh contiguous view representing the new user-facing
    /// shape over the unchanged rest of the tracker.
    pub fn reshape(&self, new_shape: &[i64]) -> ShapeTracker {
        if let Some(fused) = self.front().reshape(new_shape) {
            let mut views = self.views.clone();
            views[0] = fused;
            return ShapeTracker { views };
        }
        let mut views = SmallVec::new();
        views.push(View::contiguous(new_shape));
        views.extend(self.views.iter().cloned());
        ShapeTracker { views }
    }

    /// Produces `(index_expr, in_bounds_expr)` for output linear index
    /// `gidx`: the source-buffer linear index, and, if any view along the
    /// way carries a mask, the boolean condition under which that index is
    /// valid (§3.4). `in_bounds_expr` is `None` when no view has a mask.
    pub fn fold_index(
        &self,
        graph: &mut ScalarGraph,
        gidx: ScalarExprId,
    ) -> (ScalarExprId, Option<ScalarExprId>) {
        let mut current = gidx;
        let mut in_bounds: Option<ScalarExprId> = None;
        for view in &self.views {
            let (next, mask_cond) = fold_one_view(graph, view, current);
            current = next;
            in_bounds = match (in_bounds, mask_cond) {
                (None, m) => m,
                (b, None) => b,
                (Some(a), Some(b)) => Some(graph.mul(a, b).expect("bool AND")),
            };
        }
        (current, in_bounds)
    }

    /// Builds `GlobalIndex(gid, foldIndex(gidx))`, wrapped in
    /// `where(in_bounds, ., zero)` when this tracker has a mask (§3.4,
    /// §4.4 step 2).
    pub fn read_expr(
        &self,
        graph: &mut ScalarGraph,
        gid: u32,
        dtype: DType,
        gidx: ScalarExprId,
    ) -> ScalarExprId {
        let (index, in_bounds) = self.fold_index(graph, gidx);
        let read = graph.global_index(gid, dtype, index);
        match in_bounds {
            Some(cond) => {
                let zero = graph.konst(dtype, zero_of(dtype)).expect("zero matches dtype");
                graph.where_(cond, read, zero).expect("where dtype matches")
            }
            None => read,
        }
    }
}

/// Unravels `linear` against `view.shape`, applies stride/offset, and
/// returns the linear index into the next view's space plus this view's
/// mask condition (if any).
fn fold_one_view(
    graph: &mut ScalarGraph,
    view: &View,
    linear: ScalarExprId,
) -> (ScalarExprId, Option<ScalarExprId>) {
    let rank = view.rank();
    let mut coords = vec![None; rank];
    let mut remaining = linear;
    for d in (0..rank).rev() {
        let size = view.shape[d];
        if size == 1 {
            coords[d] = None; // stride is 0; coordinate value never matters.
            continue;
        }
        let size_c = graph.konst(DType::I32, crate::dtype::Literal::I32(size as i32)).unwrap();
        let coord = graph.modulo(remaining, size_c).expect("i32 mod");
        coords[d] = Some(coord);
        if d != 0 {
            remaining = graph.idiv(remaining, size_c).expect("i32 idiv");
        }
    }

    let offset_c = graph.konst(DType::I32, crate::dtype::Literal::I32(view.offset as i32)).unwrap();
    let mut index = offset_c;
    for d in 0..rank {
        let stride = view.strides[d];
        if stride == 0 {
            continue;
        }
        if let Some(coord) = coords[d] {
            let stride_c = graph.konst(DType::I32, crate::dtype::Literal::I32(stride as i32)).unwrap();
            let term = graph.mul(coord, stride_c).expect("i32 mul");
            index = graph.add(index, term).expect("i32 add");
        }
    }

    let mask_cond = view.mask.as_ref().map(|bounds| {
        let mut cond: Option<ScalarExprId> = None;
        for d in 0..rank {
            let (begin, end) = bounds[d];
            let coord = coords[d].unwrap_or_else(|| {
                graph.konst(DType::I32, crate::dtype::Literal::I32(0)).unwrap()
            });
            let begin_c = graph.konst(DType::I32, crate::dtype::Literal::I32(begin as i32)).unwrap();
            let end_c = graph.konst(DType::I32, crate::dtype::Literal::I32(end as i32)).unwrap();
            let lt_begin = graph.cmplt(coord, begin_c).expect("cmplt");
            let true_c = graph.konst(DType::Bool, crate::dtype::Literal::Bool(true)).unwrap();
            let ge_begin = graph.cmpne(lt_begin, true_c).expect("bool not via cmpne");
            let lt_end = graph.cmplt(coord, end_c).expect("cmplt");
            let dim_ok = graph.mul(ge_begin, lt_end).expect("bool and");
            cond = Some(match cond {
                None => dim_ok,
                Some(acc) => graph.mul(acc, dim_ok).expect("bool and"),
            });
        }
        cond.unwrap_or_else(|| graph.konst(DType::Bool, crate::dtype::Literal::Bool(true)).unwrap())
    });

    (index, mask_cond)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar_expr::EvalContext;

    fn eval_i32(graph: &ScalarGraph, id: ScalarExprId) -> i32 {
        match crate::scalar_expr::evaluate(graph, id, &EvalContext::new()).unwrap() {
            crate::dtype::Literal::I32(v) => v,
            other => panic!("expected i32, got {other:?}"),
        }
    }

    #[test]
    fn contiguous_fold_matches_identity() {
        let st = ShapeTracker::contiguous(&[2, 3]);
        let mut g = ScalarGraph::new();
        for i in 0..6 {
            let gidx = g.konst(DType::I32, crate::dtype::Literal::I32(i)).unwrap();
            let (idx, mask) = st.fold_index(&mut g, gidx);
            let simplified = crate::scalar_expr::simplify(&mut g, idx);
            assert_eq!(eval_i32(&g, simplified), i);
            assert!(mask.is_none());
        }
    }

    #[test]
    fn transpose_then_fold_matches_reference_indexing() {
        // shape [2,3] transposed to [3,2]; reference element (i,j) of the
        // transposed view equals the original element (j,i).
        let st = ShapeTracker::contiguous(&[2, 3]).permute(&[1, 0]).unwrap();
        let mut g = ScalarGraph::new();
        for out_i in 0..3 {
            for out_j in 0..2 {
                let linear = out_i * 2 + out_j;
                let gidx = g.konst(DType::I32, crate::dtype::Literal::I32(linear)).unwrap();
                let (idx, _) = st.fold_index(&mut g, gidx);
                let simplified = crate::scalar_expr::simplify(&mut g, idx);
                let expected = out_j * 3 + out_i; // original (j, i) in row-major [2,3]
                assert_eq!(eval_i32(&g, simplified), expected);
            }
        }
    }

    #[test]
    fn padded_view_masks_outside_bounds() {
        let st = ShapeTracker::contiguous(&[3]).pad(&[(1, 1)]).unwrap();
        let mut g = ScalarGraph::new();
        // shape is now [5]: positions 0 and 4 are padding, 1..4 are real data.
        let expected_valid = [false, true, true, true, false];
        for i in 0..5 {
            let gidx = g.konst(DType::I32, crate::dtype::Literal::I32(i)).unwrap();
            let (_, mask) = st.fold_index(&mut g, gidx);
            let cond = mask.unwrap();
            let simplified = crate::scalar_expr::simplify(&mut g, cond);
            match crate::scalar_expr::evaluate(&g, simplified, &EvalContext::new()).unwrap() {
                crate::dtype::Literal::Bool(b) => assert_eq!(b, expected_valid[i as usize]),
                other => panic!("expected bool, got {other:?}"),
            }
        }
    }

    #[test]
    fn reshape_of_fresh_contiguous_view_reports_contiguous() {
        let st = ShapeTracker::contiguous(&[2, 3, 4]).reshape(&[6, 4]);
        assert!(st.is_contiguous());
    }

    #[test]
    fn reshape_after_permute_appends_a_view() {
        let st = ShapeTracker::contiguous(&[2, 3, 4]).permute(&[1, 0, 2]).unwrap();
        let reshaped = st.reshape(&[3, 8]);
        assert!(!reshaped.is_contiguous());
        assert_eq!(reshaped.shape(), &[3, 8]);
    }
}
