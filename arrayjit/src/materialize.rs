//! The kernel materializer (§4.4 "Materialization").
//!
//! Two entry points: `materialize_pointwise` turns a scalar body (built from
//! each operand's `GlobalIndex` read, folded through that operand's own
//! shape tracker) into one dispatched kernel; `materialize_reduce` does the
//! same for a `Kernel` with a reduction descriptor. Both are used directly
//! by eager `Array` ops and, unmodified, by `transforms::jit`'s fusion pass
//! building one cluster's kernel.

use std::sync::Arc;

use arrayjit_backend::{Backend, Slot};
use arrayjit_core::prelude::*;
use smallvec::SmallVec;

use crate::array::Array;
use crate::errors::ArrayError;
use crate::trace::primitive::Primitive;

/// Broadcasts `st` to `target_shape` by first inserting leading size-1 axes
/// up to the target rank, then expanding size-1 axes to the target sizes
/// (§3.2 `expand`, composed the way `broadcast(shape, axes)` is specified in
/// §4.1).
pub(crate) fn broadcast_to(
    st: &ShapeTracker,
    target_shape: &[i64],
) -> Result<ShapeTracker, ShapeError> {
    let mut padded: Vec<i64> = st.shape().to_vec();
    while padded.len() < target_shape.len() {
        padded.insert(0, 1);
    }
    if padded.len() != target_shape.len() {
        return Err(ShapeError::RankMismatch {
            expected: target_shape.len(),
            rank: target_shape.len(),
            found: padded.len(),
        });
    }
    st.reshape(&padded).expand(target_shape)
}

/// The numpy-style broadcast shape of two shapes, or a `ShapeError` if they
/// are incompatible (§7 "broadcast incompatibility").
pub(crate) fn broadcast_shapes(a: &[i64], b: &[i64]) -> Result<Shape, ShapeError> {
    let rank = a.len().max(b.len());
    let mut out = SmallVec::<[i64; 4]>::new();
    out.resize(rank, 1);
    for i in 0..rank {
        let ad = *a.get(a.len().wrapping_sub(rank - i)).unwrap_or(&1);
        let bd = *b.get(b.len().wrapping_sub(rank - i)).unwrap_or(&1);
        out[i] = match (ad, bd) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(ShapeError::Broadcast { lhs: a.to_vec(), rhs: b.to_vec() }),
        };
    }
    Ok(out)
}

use crate::trace::primitive::Shape;

/// Materializes a pointwise kernel: `out_shape`/`out_dtype` describe the
/// output, `inputs` are broadcast to `out_shape`, and `primitive` supplies
/// the scalar body over the folded `GlobalIndex` reads (§4.4 steps 1-3).
pub(crate) fn materialize_pointwise<B: Backend>(
    backend: &Arc<B>,
    primitive: &Primitive,
    out_dtype: DType,
    out_shape: &[i64],
    inputs: &[&Array<B>],
) -> Result<Array<B>, ArrayError> {
    let mut graph = ScalarGraph::new();
    let output_size: i64 = out_shape.iter().product();
    let gidx = graph.special(SpecialKind::Gidx, output_size, DType::I32);

    let mut reads = Vec::with_capacity(inputs.len());
    for input in inputs {
        let st = broadcast_to(input.shape_tracker(), out_shape)?;
        reads.push(st.read_expr(&mut graph, reads.len() as u32, input.dtype(), gidx));
    }

    let body = primitive.apply_scalar(&mut graph, &reads)?;
    let body = simplify(&mut graph, body);

    let kernel = Kernel::pointwise(out_dtype, output_size, body);
    dispatch_kernel(backend, &graph, &kernel, inputs, out_dtype, out_shape)
}

/// Materializes a reduction over `axes` (not yet applying `keepdims`; the
/// caller reshapes afterward, which is metadata-only once the reduced
/// result is contiguous). `identity`/`combine` come from `reduce.rs`.
///
/// `epilogue`, when given, is folded into the kernel's `Reduction.epilogue`
/// slot (§4.4 "reduce-then-pointwise epilogue fusion"): it receives the
/// graph and the already-built accumulator expression and returns the
/// expression applied to the accumulator before store, letting a trailing
/// pointwise chain run inside the same kernel dispatch as the reduction
/// instead of a separate one.
pub(crate) fn materialize_reduce<B: Backend>(
    backend: &Arc<B>,
    input: &Array<B>,
    axes: &[usize],
    identity: Literal,
    combine: &Primitive,
    epilogue: Option<&dyn Fn(&mut ScalarGraph, ScalarExprId) -> Result<ScalarExprId, ArrayError>>,
) -> Result<(Array<B>, Shape), ArrayError> {
    let rank = input.shape_tracker().rank();
    let orig_shape = input.shape_tracker().shape().to_vec();

    let mut perm: Vec<usize> = (0..rank).filter(|d| !axes.contains(d)).collect();
    let remaining_shape: Shape = perm.iter().map(|&d| orig_shape[d]).collect();
    perm.extend(axes.iter().copied());

    let st_perm = input.shape_tracker().permute(&perm)?;
    let reduced_total: i64 = axes.iter().map(|&d| orig_shape[d]).product();
    let output_size: i64 = remaining_shape.iter().product();

    let mut graph = ScalarGraph::new();
    let gidx = graph.special(SpecialKind::Gidx, output_size, DType::I32);
    let ridx = graph.special(SpecialKind::Ridx, reduced_total, DType::I32);
    let reduced_total_c = graph.konst(DType::I32, Literal::I32(reduced_total as i32))?;
    let scaled = graph.mul(gidx, reduced_total_c)?;
    let combined = graph.add(scaled, ridx)?;

    let body = st_perm.read_expr(&mut graph, 0, input.dtype(), combined);
    let body = simplify(&mut graph, body);

    let identity_id = graph.konst(input.dtype(), identity)?;
    let acc = graph.special(SpecialKind::Acc, 0, input.dtype());
    let elem = graph.special(SpecialKind::Elem, 0, input.dtype());
    let combine_id = combine.apply_scalar(&mut graph, &[acc, elem])?;
    let combine_id = simplify(&mut graph, combine_id);

    let epilogue_id = match epilogue {
        Some(build) => {
            let e = build(&mut graph, acc)?;
            Some(simplify(&mut graph, e))
        }
        None => None,
    };

    let reduction = Reduction { axis_size: reduced_total, identity: identity_id, combine: combine_id, epilogue: epilogue_id };
    let kernel = Kernel::reducing(input.dtype(), output_size, body, reduction);

    let out = dispatch_kernel(backend, &graph, &kernel, &[input], input.dtype(), &remaining_shape)?;
    Ok((out, remaining_shape))
}

pub(crate) fn dispatch_kernel<B: Backend>(
    backend: &Arc<B>,
    graph: &ScalarGraph,
    kernel: &Kernel,
    inputs: &[&Array<B>],
    out_dtype: DType,
    out_shape: &[i64],
) -> Result<Array<B>, ArrayError> {
    let exe = backend.prepare(kernel, graph)?;
    let output_size = kernel.output_size as usize * out_dtype.size_bytes();
    let output_slot = backend.malloc(output_size, None)?;
    let input_slots: Vec<Slot> = inputs.iter().map(|a| a.slot()).collect();
    backend.dispatch(&exe, &input_slots, output_slot)?;
    Ok(Array::from_slot(backend.clone(), output_slot, ShapeTracker::contiguous(out_shape), out_dtype))
}
