//! `jit`, the jaxpr-recording and kernel-fusion transform (§4.4).
//!
//! Tracing records a straight-line program (`Jaxpr`) by running the traced
//! function once against `JitAtom` placeholders, each method pushing an
//! `Equation` onto a thread-local builder frame instead of touching a
//! backend. The recorded jaxpr is cached by `TraceKey` (§4.4 "Reuse") and,
//! on every call, fused and materialized against the real input arrays by
//! `execute_jaxpr`.
//!
//! **Fusion scope.** The fusion pass clusters consecutive pointwise
//! equations of identical output shape into one kernel. A `ReduceSum`
//! equation starts a fresh cluster; a trailing *unary* chain consuming only
//! its output folds into the reduction's own `epilogue` slot instead of
//! becoming a second kernel (a trailing equation with a second, external
//! operand can't be expressed against the epilogue's single bound
//! accumulator, so that case still falls back to its own following kernel).
//!
//! **Nested calls.** [`trace_jaxpr`] traces a function to a standalone
//! `Jaxpr` without caching it; [`jit_call`] then records a call to that
//! jaxpr from inside another trace as a single `Primitive::JitCall`
//! equation, and `execute_jaxpr` recurses into the callee rather than
//! inlining its equations into the caller's cluster pass. JVP through a
//! `JitCall` equation (differentiating the callee once and memoizing the
//! result, per §4.2) is not implemented — `jvp.rs`'s `Dual` transform
//! operates on eager `Array`s, not on recorded jaxprs, so there is no
//! existing jaxpr-to-jaxpr rewrite this could hook into without first
//! building one; see `DESIGN.md`.

use std::cell::RefCell;
use std::collections::HashMap;

use arrayjit_backend::Backend;
use arrayjit_core::prelude::*;

use crate::array::Array;
use crate::errors::{ArrayError, TreeMismatchError, UnsupportedError};
use crate::materialize::{self, broadcast_shapes};
use crate::trace::interpreter::{MainTraceGuard, TraceKind};
use crate::trace::primitive::Primitive;

#[derive(Debug, Clone)]
struct AtomMeta {
    shape: Vec<i64>,
    dtype: DType,
}

#[derive(Debug, Clone)]
struct Equation {
    primitive: Primitive,
    inputs: Vec<usize>,
    /// Populated only for `Primitive::JitCall`: the callee's own jaxpr,
    /// traced independently of the caller so `execute_jaxpr` can recurse
    /// into it instead of inlining its equations into this cluster pass.
    inner: Option<std::sync::Arc<Jaxpr>>,
}

#[derive(Debug, Clone)]
pub struct Jaxpr {
    num_inputs: usize,
    atoms: Vec<AtomMeta>,
    /// `equations[i]` produces atom `num_inputs + i`.
    equations: Vec<Equation>,
    outputs: Vec<usize>,
}

struct BuilderFrame {
    atoms: Vec<AtomMeta>,
    equations: Vec<Equation>,
}

thread_local! {
    static BUILDER: RefCell<Vec<BuilderFrame>> = const { RefCell::new(Vec::new()) };
}

/// A placeholder value inside a jaxpr under construction; mirrors a slice of
/// `Array`'s op surface, recording an `Equation` per call instead of
/// dispatching a kernel.
#[derive(Debug, Clone)]
pub struct JitAtom {
    id: usize,
    shape: Vec<i64>,
    dtype: DType,
}

impl JitAtom {
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    fn push(primitive: Primitive, inputs: &[&JitAtom], shape: Vec<i64>, dtype: DType) -> JitAtom {
        JitAtom::push_equation(primitive, inputs, shape, dtype, None)
    }

    fn push_equation(
        primitive: Primitive,
        inputs: &[&JitAtom],
        shape: Vec<i64>,
        dtype: DType,
        inner: Option<std::sync::Arc<Jaxpr>>,
    ) -> JitAtom {
        BUILDER.with(|b| {
            let mut b = b.borrow_mut();
            let frame = b.last_mut().expect("JitAtom used outside an active jit trace");
            let id = frame.atoms.len();
            frame.atoms.push(AtomMeta { shape: shape.clone(), dtype });
            frame.equations.push(Equation { primitive, inputs: inputs.iter().map(|a| a.id).collect(), inner });
            JitAtom { id, shape, dtype }
        })
    }

    fn binary(&self, other: &JitAtom, primitive: Primitive, out_dtype: DType) -> Result<JitAtom, ArrayError> {
        let shape = broadcast_shapes(&self.shape, &other.shape)?;
        Ok(JitAtom::push(primitive, &[self, other], shape.into_vec(), out_dtype))
    }

    fn unary(&self, primitive: Primitive) -> JitAtom {
        JitAtom::push(primitive, &[self], self.shape.clone(), self.dtype)
    }

    pub fn add(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.binary(other, Primitive::Add, self.dtype)
    }

    pub fn mul(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.binary(other, Primitive::Mul, self.dtype)
    }

    pub fn neg(&self) -> JitAtom {
        self.unary(Primitive::Neg)
    }

    pub fn sub(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.add(&other.neg())
    }

    pub fn reciprocal(&self) -> JitAtom {
        self.unary(Primitive::Reciprocal)
    }

    pub fn div(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.mul(&other.reciprocal())
    }

    pub fn sin(&self) -> JitAtom {
        self.unary(Primitive::Sin)
    }

    pub fn cos(&self) -> JitAtom {
        self.unary(Primitive::Cos)
    }

    pub fn min(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.binary(other, Primitive::Min, self.dtype)
    }

    pub fn max(&self, other: &JitAtom) -> Result<JitAtom, ArrayError> {
        self.binary(other, Primitive::Max, self.dtype)
    }

    /// `reduceSum` over normalized axes (§4.1); `None` reduces every axis.
    pub fn sum(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<JitAtom, ArrayError> {
        let rank = self.shape.len();
        let mut norm: Vec<usize> = match axes {
            Some(a) => a
                .iter()
                .map(|&ax| {
                    let n = if ax < 0 { ax + rank as i64 } else { ax };
                    if n < 0 || n as usize >= rank {
                        return Err(ShapeError::AxisOutOfBounds { axis: ax, rank });
                    }
                    Ok(n as usize)
                })
                .collect::<Result<_, _>>()?,
            None => (0..rank).collect(),
        };
        norm.sort_unstable();
        norm.dedup();

        let mut out_shape: Vec<i64> =
            self.shape.iter().enumerate().filter(|(i, _)| !norm.contains(i)).map(|(_, &d)| d).collect();
        if keepdims {
            out_shape = self.shape.clone();
            for &ax in &norm {
                out_shape[ax] = 1;
            }
        }
        Ok(JitAtom::push(
            Primitive::ReduceSum { axes: norm.into_iter().collect(), keepdims },
            &[self],
            out_shape,
            self.dtype,
        ))
    }

    pub fn reshape(&self, shape: &[i64]) -> JitAtom {
        JitAtom::push(Primitive::Reshape { shape: shape.iter().copied().collect() }, &[self], shape.to_vec(), self.dtype)
    }

    pub fn transpose(&self, perm: &[usize]) -> JitAtom {
        let shape: Vec<i64> = perm.iter().map(|&p| self.shape[p]).collect();
        JitAtom::push(Primitive::Transpose { perm: perm.iter().copied().collect() }, &[self], shape, self.dtype)
    }

    pub fn broadcast_to(&self, shape: &[i64]) -> Result<JitAtom, ArrayError> {
        Ok(JitAtom::push(
            Primitive::Broadcast { shape: shape.iter().copied().collect(), axes: (0..shape.len()).collect() },
            &[self],
            shape.to_vec(),
            self.dtype,
        ))
    }

    pub fn flip(&self, axes: &[usize]) -> JitAtom {
        JitAtom::push(Primitive::Flip { axes: axes.iter().copied().collect() }, &[self], self.shape.clone(), self.dtype)
    }
}

/// Traces `f` against fresh input atoms of the given shapes/dtypes, pushing
/// a new builder frame so a nested call recorded via [`jit_call`] (traced
/// independently, before or during an outer trace) still resolves against
/// its own frame instead of the caller's.
fn trace(inputs: &[(Vec<i64>, DType)], f: &dyn Fn(&[JitAtom]) -> Result<Vec<JitAtom>, ArrayError>) -> Result<Jaxpr, ArrayError> {
    BUILDER.with(|b| b.borrow_mut().push(BuilderFrame { atoms: Vec::new(), equations: Vec::new() }));

    let atoms: Vec<JitAtom> = inputs
        .iter()
        .enumerate()
        .map(|(id, (shape, dtype))| {
            BUILDER.with(|b| {
                b.borrow_mut().last_mut().unwrap().atoms.push(AtomMeta { shape: shape.clone(), dtype: *dtype });
            });
            JitAtom { id, shape: shape.clone(), dtype: *dtype }
        })
        .collect();

    let result = f(&atoms);
    let frame = BUILDER.with(|b| b.borrow_mut().pop().expect("frame pushed above"));
    let outs = result?;

    Ok(Jaxpr {
        num_inputs: inputs.len(),
        atoms: frame.atoms,
        equations: frame.equations,
        outputs: outs.iter().map(|a| a.id).collect(),
    })
}

/// Traces `f` into a standalone jaxpr without compiling or caching it,
/// so the result can be handed to [`jit_call`] as the callee of a nested
/// call. This is the building block `jit` itself would use to cache a
/// top-level trace; calling it directly is how a caller gets a `Jaxpr`
/// value to nest.
pub fn trace_jaxpr<F>(inputs: &[(Vec<i64>, DType)], f: F) -> Result<Jaxpr, ArrayError>
where
    F: Fn(&[JitAtom]) -> Result<Vec<JitAtom>, ArrayError>,
{
    trace(inputs, &f)
}

/// Calls a standalone jaxpr (from [`trace_jaxpr`]) from inside another
/// trace, recording one `Primitive::JitCall` equation for the whole callee
/// instead of inlining its equations (§4.2: the callee "is JVP-transformed
/// exactly once and memoized" — keeping it as a single equation is what
/// makes that memoization meaningful, since re-inlining would re-derive the
/// callee's rules at every call site).
///
/// `inner` must take exactly `args.len()` inputs and return exactly one
/// output; nested calls to multi-output jaxprs aren't supported.
pub fn jit_call(inner: &Jaxpr, args: &[&JitAtom]) -> Result<JitAtom, ArrayError> {
    if inner.num_inputs != args.len() {
        return Err(TreeMismatchError {
            lhs_path: "jit_call callee".to_string(),
            rhs_path: "jit_call args".to_string(),
            lhs_desc: format!("{} inputs", inner.num_inputs),
            rhs_desc: format!("{} args", args.len()),
        }
        .into());
    }
    if inner.outputs.len() != 1 {
        return Err(UnsupportedError { primitive: "jit_call", transform: "multi-output nested call" }.into());
    }
    let out_atom = inner.outputs[0];
    let shape = inner.atoms[out_atom].shape.clone();
    let dtype = inner.atoms[out_atom].dtype;
    Ok(JitAtom::push_equation(
        Primitive::JitCall { num_consts: 0 },
        args,
        shape,
        dtype,
        Some(std::sync::Arc::new(inner.clone())),
    ))
}

/// A cluster fused into one kernel dispatch: either a run of consecutive
/// pointwise equations, a lone reduction/shape/call equation, or (when
/// `reduce_epilogue` is set) a `ReduceSum` followed by a trailing pointwise
/// chain consuming only its output, fused into the reduction's own
/// `epilogue` instead of becoming a second kernel.
struct Cluster {
    atom_ids: Vec<usize>,
    reduce_epilogue: bool,
}

fn is_pointwise(p: &Primitive) -> bool {
    !matches!(
        p,
        Primitive::ReduceSum { .. }
            | Primitive::Transpose { .. }
            | Primitive::Broadcast { .. }
            | Primitive::Reshape { .. }
            | Primitive::Flip { .. }
            | Primitive::JitCall { .. }
    )
}

/// How many times each atom is consumed, counting jaxpr outputs as a use.
/// A non-final cluster member must have exactly one use (the next equation
/// in the same cluster) — otherwise fusing it away would lose a value a
/// later, un-fused equation still needs to read.
fn count_uses(jaxpr: &Jaxpr) -> HashMap<usize, usize> {
    let mut uses = HashMap::new();
    for eq in &jaxpr.equations {
        for &input in &eq.inputs {
            *uses.entry(input).or_insert(0) += 1;
        }
    }
    for &out in &jaxpr.outputs {
        *uses.entry(out).or_insert(0) += 1;
    }
    uses
}

fn cluster_equations(jaxpr: &Jaxpr) -> Vec<Cluster> {
    let uses = count_uses(jaxpr);
    let mut clusters = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    let make_cluster = |atom_ids: Vec<usize>| -> Cluster {
        let first_eq = &jaxpr.equations[atom_ids[0] - jaxpr.num_inputs];
        let reduce_epilogue =
            atom_ids.len() > 1 && matches!(first_eq.primitive, Primitive::ReduceSum { .. });
        Cluster { atom_ids, reduce_epilogue }
    };

    for (i, eq) in jaxpr.equations.iter().enumerate() {
        let atom_id = jaxpr.num_inputs + i;
        // A `ReduceSum` may start a fresh cluster (never extend one already
        // in progress — only a *trailing* pointwise chain fuses into its
        // epilogue, not a leading one into its body).
        let startable = current.is_empty() && matches!(eq.primitive, Primitive::ReduceSum { .. });
        let can_extend = match current.last() {
            None => true,
            Some(&prev) => {
                let same_shape = jaxpr.atoms[prev].shape == jaxpr.atoms[atom_id].shape;
                let chained = eq.inputs.contains(&prev);
                let prev_single_use = uses.get(&prev).copied().unwrap_or(0) == 1;
                // A chain following a `ReduceSum` is folded into its scalar
                // `epilogue`, which only ever sees the running accumulator —
                // an equation reading a second, external operand can't be
                // represented there without a second kernel input this
                // fusion doesn't build, so only unary links extend it.
                let first_is_reduce =
                    matches!(jaxpr.equations[current[0] - jaxpr.num_inputs].primitive, Primitive::ReduceSum { .. });
                let unary_if_reduce_chain = !first_is_reduce || eq.inputs.len() == 1;
                same_shape && chained && prev_single_use && unary_if_reduce_chain
            }
        };
        if (is_pointwise(&eq.primitive) && can_extend) || startable {
            current.push(atom_id);
        } else {
            if !current.is_empty() {
                clusters.push(make_cluster(std::mem::take(&mut current)));
            }
            if is_pointwise(&eq.primitive) || matches!(eq.primitive, Primitive::ReduceSum { .. }) {
                current.push(atom_id);
            } else {
                clusters.push(make_cluster(vec![atom_id]));
            }
        }
    }
    if !current.is_empty() {
        clusters.push(make_cluster(current));
    }
    clusters
}

/// Executes `jaxpr` against real `inputs`, fusing pointwise clusters into
/// single kernels (§4.4 "Materialization").
fn execute_jaxpr<B: Backend>(backend: &std::sync::Arc<B>, jaxpr: &Jaxpr, inputs: &[&Array<B>]) -> Result<Vec<Array<B>>, ArrayError> {
    let mut values: HashMap<usize, Array<B>> = HashMap::new();
    for (i, input) in inputs.iter().enumerate() {
        values.insert(i, (*input).clone());
    }

    let clusters = cluster_equations(jaxpr);
    for cluster in clusters {
        let first_eq = &jaxpr.equations[cluster.atom_ids[0] - jaxpr.num_inputs];
        if let Primitive::ReduceSum { axes, .. } = &first_eq.primitive {
            let input_atom = first_eq.inputs[0];
            let input_arr = values.get(&input_atom).expect("cluster input already materialized").clone();
            let identity = crate::array::reduce_identity(Primitive::Add, input_arr.dtype());

            // A trailing unary chain (see `cluster_equations`'s
            // `unary_if_reduce_chain`) folds into the reduction's own
            // `epilogue` slot instead of dispatching as its own kernel.
            let epilogue_chain = cluster.atom_ids[1..].to_vec();
            let has_epilogue = !epilogue_chain.is_empty();
            let epilogue_closure = move |graph: &mut ScalarGraph, acc: ScalarExprId| -> Result<ScalarExprId, ArrayError> {
                let mut cur = acc;
                for &atom_id in &epilogue_chain {
                    let eq = &jaxpr.equations[atom_id - jaxpr.num_inputs];
                    cur = eq.primitive.apply_scalar(graph, &[cur])?;
                }
                Ok(cur)
            };
            let epilogue_ref: Option<&dyn Fn(&mut ScalarGraph, ScalarExprId) -> Result<ScalarExprId, ArrayError>> =
                if has_epilogue { Some(&epilogue_closure) } else { None };

            let (reduced, remaining_shape) =
                materialize::materialize_reduce(backend, &input_arr, axes, identity, &Primitive::Add, epilogue_ref)?;
            let out_atom = *cluster.atom_ids.last().unwrap();
            let keepdims_target = &jaxpr.atoms[out_atom].shape;
            let out = if keepdims_target.len() != remaining_shape.len() {
                let mut kept = remaining_shape.to_vec();
                for &ax in axes.iter() {
                    kept.insert(ax, 1);
                }
                reduced.reshape(&kept)?
            } else {
                reduced
            };
            values.insert(out_atom, out);
            continue;
        }
        if let Primitive::JitCall { .. } = &first_eq.primitive {
            debug_assert_eq!(cluster.atom_ids.len(), 1);
            let out_atom = cluster.atom_ids[0];
            let inner = first_eq.inner.as_ref().expect("JitCall equation always carries its callee jaxpr");
            let call_inputs: Vec<Array<B>> = first_eq
                .inputs
                .iter()
                .map(|id| values.get(id).expect("call input already materialized").clone())
                .collect();
            let call_refs: Vec<&Array<B>> = call_inputs.iter().collect();
            let mut outs = execute_jaxpr(backend, inner, &call_refs)?;
            values.insert(out_atom, outs.remove(0));
            continue;
        }
        if !is_pointwise(&first_eq.primitive) {
            debug_assert_eq!(cluster.atom_ids.len(), 1);
            let atom_id = cluster.atom_ids[0];
            let eq = &jaxpr.equations[atom_id - jaxpr.num_inputs];
            let input_arr = values.get(&eq.inputs[0]).expect("shape-op input already materialized").clone();
            let out = match &eq.primitive {
                Primitive::Reshape { shape } => input_arr.reshape(shape)?,
                Primitive::Transpose { perm } => input_arr.transpose(perm)?,
                Primitive::Flip { axes } => input_arr.flip(axes)?,
                Primitive::Broadcast { shape, .. } => input_arr.broadcast_to(shape)?,
                other => {
                    return Err(UnsupportedError { primitive: other.name(), transform: "jit execute" }.into())
                }
            };
            values.insert(atom_id, out);
            continue;
        }

        // Pointwise cluster: build one ScalarGraph whose body is the inlined
        // composition, reading cluster-external atoms via GlobalIndex and
        // referencing intra-cluster results by their already-built expr id.
        let out_atom = *cluster.atom_ids.last().unwrap();
        let out_shape = jaxpr.atoms[out_atom].shape.clone();
        let out_dtype = jaxpr.atoms[out_atom].dtype;

        let mut graph = ScalarGraph::new();
        let numel: i64 = out_shape.iter().product();
        let gidx = graph.special(SpecialKind::Gidx, numel, DType::I32);

        let mut exprs: HashMap<usize, ScalarExprId> = HashMap::new();
        let mut kernel_inputs: Vec<Array<B>> = Vec::new();
        let mut external_reads: HashMap<usize, ScalarExprId> = HashMap::new();

        let in_cluster: std::collections::HashSet<usize> = cluster.atom_ids.iter().copied().collect();

        for &atom_id in &cluster.atom_ids {
            let eq = &jaxpr.equations[atom_id - jaxpr.num_inputs];
            let mut arg_ids = Vec::with_capacity(eq.inputs.len());
            for &input_id in &eq.inputs {
                if in_cluster.contains(&input_id) {
                    arg_ids.push(*exprs.get(&input_id).expect("producer ordered before consumer"));
                } else if let Some(&already) = external_reads.get(&input_id) {
                    arg_ids.push(already);
                } else {
                    let arr = values.get(&input_id).expect("external atom already materialized").clone();
                    let st = materialize::broadcast_to(arr.shape_tracker(), &out_shape)?;
                    let gid = kernel_inputs.len() as u32;
                    let read = st.read_expr(&mut graph, gid, arr.dtype(), gidx);
                    kernel_inputs.push(arr);
                    external_reads.insert(input_id, read);
                    arg_ids.push(read);
                }
            }
            let arg_refs: Vec<ScalarExprId> = arg_ids;
            let body = eq.primitive.apply_scalar(&mut graph, &arg_refs)?;
            exprs.insert(atom_id, body);
        }

        let root = *exprs.get(&out_atom).unwrap();
        let root = simplify(&mut graph, root);
        let kernel = Kernel::pointwise(out_dtype, numel, root);
        let input_refs: Vec<&Array<B>> = kernel_inputs.iter().collect();
        let out = materialize::dispatch_kernel(backend, &graph, &kernel, &input_refs, out_dtype, &out_shape)?;
        values.insert(out_atom, out);
    }

    jaxpr
        .outputs
        .iter()
        .map(|id| values.get(id).cloned().ok_or_else(|| UnsupportedError { primitive: "jit", transform: "missing output atom" }.into()))
        .collect()
}

/// Cache of jaxprs keyed by input shapes/dtypes (§4.4 "Reuse"). Static
/// parameters (literals, Python-side static args in the original design)
/// are out of scope here — every traced function closes over its own
/// parameters instead.
#[derive(Default)]
pub struct JitCache {
    cache: RefCell<HashMap<Vec<(Vec<i64>, DType)>, Jaxpr>>,
}

impl JitCache {
    pub fn new() -> JitCache {
        JitCache::default()
    }
}

/// `jit(f) -> impl Fn(&[Array]) -> Result<Vec<Array>, ArrayError>` (§6).
/// Returns a closure owning its own `JitCache`; repeated calls with the same
/// input shapes/dtypes reuse the cached, fused jaxpr.
pub fn jit<F>(f: F) -> impl Fn(&[Array]) -> Result<Vec<Array>, ArrayError>
where
    F: Fn(&[JitAtom]) -> Result<Vec<JitAtom>, ArrayError> + 'static,
{
    let cache = JitCache::new();
    move |inputs: &[Array]| {
        let key: Vec<(Vec<i64>, DType)> = inputs.iter().map(|a| (a.shape().to_vec(), a.dtype())).collect();
        let cached = cache.cache.borrow().get(&key).cloned();
        let jaxpr = match cached {
            Some(j) => {
                tracing::debug!("jit: cache hit");
                j
            }
            None => {
                tracing::debug!("jit: cache miss, tracing");
                let _guard = MainTraceGuard::push(TraceKind::Jit);
                let specs: Vec<(Vec<i64>, DType)> = key.clone();
                let j = trace(&specs, &f)?;
                drop(_guard);
                cache.cache.borrow_mut().insert(key, j.clone());
                j
            }
        };
        let backend = inputs[0].backend().clone();
        let refs: Vec<&Array> = inputs.iter().collect();
        execute_jaxpr(&backend, &jaxpr, &refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jit_matches_eager_computation() {
        let x = Array::cpu_from_vec_f32(&[4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let y = Array::cpu_from_vec_f32(&[4], &[10.0, 20.0, 30.0, 40.0]).unwrap();

        let compiled = jit(|args| {
            let sum = args[0].add(&args[1])?;
            Ok(vec![sum.mul(&args[0])?])
        });

        let out = compiled(&[x.clone(), y.clone()]).unwrap();
        let eager = x.add(&y).unwrap().mul(&x).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), eager.to_vec_f32().unwrap());
    }

    #[test]
    fn jit_reuses_cached_jaxpr_for_same_shapes() {
        let compiled = jit(|args| Ok(vec![args[0].sin()]));
        let a = Array::cpu_from_vec_f32(&[2], &[0.0, 1.0]).unwrap();
        let b = Array::cpu_from_vec_f32(&[2], &[2.0, 3.0]).unwrap();
        let out_a = compiled(&[a]).unwrap();
        let out_b = compiled(&[b]).unwrap();
        assert_eq!(out_a[0].to_vec_f32().unwrap().len(), 2);
        assert_eq!(out_b[0].to_vec_f32().unwrap().len(), 2);
    }

    #[test]
    fn jit_fuses_reduction_followed_by_pointwise() {
        let x = Array::cpu_from_vec_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let compiled = jit(|args| {
            let summed = args[0].sum(Some(&[1]), false)?;
            Ok(vec![summed.neg()])
        });
        let out = compiled(&[x]).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), vec![-6.0, -15.0]);
    }

    #[test]
    fn jit_fuses_multi_step_unary_epilogue_chain() {
        let x = Array::cpu_from_vec_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let compiled = jit(|args| {
            let summed = args[0].sum(Some(&[1]), false)?;
            Ok(vec![summed.neg().reciprocal()])
        });
        let out = compiled(&[x]).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), vec![-1.0 / 6.0, -1.0 / 15.0]);
    }

    #[test]
    fn jit_reduction_followed_by_binary_pointwise_still_correct() {
        // Can't fold into the reduction's epilogue (the add's second operand
        // is an external read, not just the accumulator) -- falls back to its
        // own kernel the way a non-reduction pointwise chain would, and
        // still has to produce the right answer.
        let x = Array::cpu_from_vec_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y = Array::cpu_from_vec_f32(&[2], &[100.0, 200.0]).unwrap();
        let compiled = jit(|args| {
            let summed = args[0].sum(Some(&[1]), false)?;
            Ok(vec![summed.add(&args[1])?])
        });
        let out = compiled(&[x, y]).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), vec![106.0, 215.0]);
    }

    #[test]
    fn jit_call_executes_a_nested_jaxpr() {
        let x = Array::cpu_from_vec_f32(&[3], &[1.0, 2.0, 3.0]).unwrap();
        let compiled = jit(|args| {
            let inner =
                trace_jaxpr(&[(args[0].shape().to_vec(), args[0].dtype())], |inner_args| {
                    Ok(vec![inner_args[0].add(&inner_args[0])?])
                })?;
            let doubled = jit_call(&inner, &[&args[0]])?;
            Ok(vec![doubled.neg()])
        });
        let out = compiled(&[x]).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), vec![-2.0, -4.0, -6.0]);
    }

    #[test]
    fn jit_call_rejects_wrong_argument_count() {
        let inner = trace_jaxpr(&[(vec![2], DType::F32)], |args| Ok(vec![args[0].sin()])).unwrap();
        let x = Array::cpu_from_vec_f32(&[2], &[0.0, 1.0]).unwrap();
        let compiled = jit(move |args| jit_call(&inner, &[&args[0], &args[0]]).map(|a| vec![a]));
        assert!(compiled(&[x]).is_err());
    }
}
