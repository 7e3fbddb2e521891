//! `Array`: the user-visible lazy array (§3.4) and the elementwise/shape/
//! reduction surface of §6.
//!
//! Outside `jit`, ops are dispatched eagerly: shape-only ops (`reshape`,
//! `transpose`, `broadcast_to`, `slice`, `pad`, `flip`) only rewrite the
//! `ShapeTracker` and never touch the backend (§3.2 "view ops never
//! materialize a buffer"); arithmetic/reduction ops call straight into
//! `materialize`, so each produces one dispatched kernel immediately rather
//! than joining a multi-kernel pending set. Real fusion — clustering many
//! pointwise ops into one kernel — happens inside `transforms::jit`, which
//! defers dispatch until the recorded jaxpr is fused (§4.4); this is
//! recorded as an Open Question resolution in `DESIGN.md`.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use arrayjit_backend::{Backend, CpuBackend, Slot};
use arrayjit_backend::errors::ReferenceError;
use arrayjit_core::prelude::*;

use crate::bytes::{
    bytes_to_bool_vec, bytes_to_f32_vec, bytes_to_i32_vec, bytes_to_u32_vec, f32_vec_to_bytes,
    i32_vec_to_bytes, repeat_literal_bytes,
};
use crate::device;
use crate::errors::ArrayError;
use crate::materialize::{self, broadcast_shapes};
use crate::trace::primitive::{CompareOp, Primitive};

/// A user-visible array: a `ShapeTracker` view over a backend-owned `Slot`
/// (§3.4). Generic over the backend so the same surface works against any
/// `Backend` impl; top-level constructors default to the process CPU
/// backend via `device::cpu_backend()`.
pub struct Array<B: Backend = CpuBackend> {
    slot: Slot,
    shape_tracker: ShapeTracker,
    dtype: DType,
    backend: Arc<B>,
    disposed: Cell<bool>,
}

impl<B: Backend> fmt::Debug for Array<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape_tracker.shape())
            .field("dtype", &self.dtype)
            .field("device", &self.backend.name())
            .finish()
    }
}

impl<B: Backend> Clone for Array<B> {
    fn clone(&self) -> Self {
        self.backend.inc_ref(self.slot).expect("inc_ref on a live array cannot fail");
        Array {
            slot: self.slot,
            shape_tracker: self.shape_tracker.clone(),
            dtype: self.dtype,
            backend: self.backend.clone(),
            disposed: Cell::new(false),
        }
    }
}

impl<B: Backend> Drop for Array<B> {
    fn drop(&mut self) {
        if !self.disposed.get() {
            let _ = self.backend.dec_ref(self.slot);
        }
    }
}

impl<B: Backend> Array<B> {
    pub(crate) fn from_slot(backend: Arc<B>, slot: Slot, shape_tracker: ShapeTracker, dtype: DType) -> Self {
        Array { slot, shape_tracker, dtype, backend, disposed: Cell::new(false) }
    }

    pub fn shape(&self) -> &[i64] {
        self.shape_tracker.shape()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.shape_tracker.rank()
    }

    pub fn numel(&self) -> i64 {
        self.shape_tracker.numel()
    }

    pub fn device(&self) -> &'static str {
        self.backend.name()
    }

    pub(crate) fn shape_tracker(&self) -> &ShapeTracker {
        &self.shape_tracker
    }

    pub(crate) fn slot(&self) -> Slot {
        self.slot
    }

    pub(crate) fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Explicit dispose (§3.4, §5): decrements the slot's refcount. Double
    /// dispose is a `ReferenceError`, not silent corruption.
    pub fn dispose(&self) -> Result<(), ArrayError> {
        if self.disposed.get() {
            return Err(ReferenceError::DoubleFree(self.slot).into());
        }
        self.backend
            .dec_ref(self.slot)
            .map_err(|_| ArrayError::from(ReferenceError::UnknownSlot(self.slot)))?;
        self.disposed.set(true);
        Ok(())
    }

    /// Forces every pending materialization this array still carries (here,
    /// at most one — see the module doc) and returns a fresh contiguous
    /// array, applying this array's own `ShapeTracker` (§4.4's index-fold
    /// step, run over an identity body).
    pub fn contiguous(&self) -> Result<Array<B>, ArrayError> {
        if self.shape_tracker.is_contiguous() {
            return Ok(self.clone());
        }
        let mut graph = ScalarGraph::new();
        let numel = self.shape_tracker.numel();
        let gidx = graph.special(SpecialKind::Gidx, numel, DType::I32);
        let body = self.shape_tracker.read_expr(&mut graph, 0, self.dtype, gidx);
        let body = simplify(&mut graph, body);
        let kernel = Kernel::pointwise(self.dtype, numel, body);
        materialize::dispatch_kernel(&self.backend, &graph, &kernel, &[self], self.dtype, self.shape_tracker.shape())
    }

    pub fn to_host_bytes(&self) -> Result<Vec<u8>, ArrayError> {
        let c = self.contiguous()?;
        let n = c.shape_tracker.numel() as usize * self.dtype.size_bytes();
        let bytes = c.backend.read(c.slot, 0, Some(n))?;
        Ok(bytes)
    }

    pub fn to_vec_f32(&self) -> Result<Vec<f32>, ArrayError> {
        self.expect_dtype(DType::F32)?;
        Ok(bytes_to_f32_vec(&self.to_host_bytes()?))
    }

    pub fn to_vec_i32(&self) -> Result<Vec<i32>, ArrayError> {
        self.expect_dtype(DType::I32)?;
        Ok(bytes_to_i32_vec(&self.to_host_bytes()?))
    }

    pub fn to_vec_u32(&self) -> Result<Vec<u32>, ArrayError> {
        self.expect_dtype(DType::U32)?;
        Ok(bytes_to_u32_vec(&self.to_host_bytes()?))
    }

    pub fn to_vec_bool(&self) -> Result<Vec<bool>, ArrayError> {
        self.expect_dtype(DType::Bool)?;
        Ok(bytes_to_bool_vec(&self.to_host_bytes()?))
    }

    fn expect_dtype(&self, want: DType) -> Result<(), ArrayError> {
        if self.dtype != want {
            return Err(DtypeError::Mismatch { op: "to_vec", lhs: self.dtype, rhs: want }.into());
        }
        Ok(())
    }

    fn with_tracker(&self, st: ShapeTracker) -> Result<Array<B>, ArrayError> {
        self.backend.inc_ref(self.slot)?;
        Ok(Array {
            slot: self.slot,
            shape_tracker: st,
            dtype: self.dtype,
            backend: self.backend.clone(),
            disposed: Cell::new(false),
        })
    }

    // -- shape manipulation (§6; metadata-only, §3.2) ------------------------

    pub fn reshape(&self, shape: &[i64]) -> Result<Array<B>, ArrayError> {
        let to_size: i64 = shape.iter().product();
        if to_size != self.numel() {
            return Err(ShapeError::ReshapeSize { from_size: self.numel(), to: shape.to_vec(), to_size }.into());
        }
        self.with_tracker(self.shape_tracker.reshape(shape))
    }

    pub fn transpose(&self, perm: &[usize]) -> Result<Array<B>, ArrayError> {
        self.with_tracker(self.shape_tracker.permute(perm)?)
    }

    pub fn broadcast_to(&self, shape: &[i64]) -> Result<Array<B>, ArrayError> {
        self.with_tracker(materialize::broadcast_to(&self.shape_tracker, shape)?)
    }

    pub fn slice(&self, bounds: &[(i64, i64)]) -> Result<Array<B>, ArrayError> {
        self.with_tracker(self.shape_tracker.shrink(bounds)?)
    }

    pub fn pad(&self, bounds: &[(i64, i64)]) -> Result<Array<B>, ArrayError> {
        self.with_tracker(self.shape_tracker.pad(bounds)?)
    }

    pub fn flip(&self, axes: &[usize]) -> Result<Array<B>, ArrayError> {
        self.with_tracker(self.shape_tracker.flip(axes)?)
    }

    /// Concatenates along `axis` by zero-padding each input to the full
    /// output extent and summing (§6 "concat, stack"); the padded regions
    /// are disjoint so the sum recovers the original data. Built entirely
    /// from `pad` + `add`, not a dedicated primitive (concat/stack are not
    /// in §4.1's primitive list).
    pub fn concat(arrays: &[&Array<B>], axis: usize) -> Result<Array<B>, ArrayError> {
        let first = arrays.first().expect("concat requires at least one array");
        let rank = first.rank();
        let total_axis: i64 = arrays.iter().map(|a| a.shape()[axis]).sum();

        let mut acc_offset = 0i64;
        let mut acc: Option<Array<B>> = None;
        for a in arrays {
            let mut bounds = vec![(0i64, 0i64); rank];
            bounds[axis] = (acc_offset, total_axis - acc_offset - a.shape()[axis]);
            let padded = a.pad(&bounds)?;
            acc = Some(match acc {
                None => padded,
                Some(running) => running.add(&padded)?,
            });
            acc_offset += a.shape()[axis];
        }
        Ok(acc.unwrap())
    }

    /// Stacks along a new axis `axis`, by inserting a size-1 dimension then
    /// concatenating (§6 "concat, stack").
    pub fn stack(arrays: &[&Array<B>], axis: usize) -> Result<Array<B>, ArrayError> {
        let mut unsqueezed = Vec::with_capacity(arrays.len());
        for a in arrays {
            let mut shape = a.shape().to_vec();
            shape.insert(axis, 1);
            unsqueezed.push(a.reshape(&shape)?);
        }
        let refs: Vec<&Array<B>> = unsqueezed.iter().collect();
        Array::concat(&refs, axis)
    }

    // -- elementwise arithmetic (§4.1, §6) ------------------------------------

    fn binary(&self, other: &Array<B>, primitive: Primitive, out_dtype: DType) -> Result<Array<B>, ArrayError> {
        let out_shape = broadcast_shapes(self.shape(), other.shape())?;
        materialize::materialize_pointwise(&self.backend, &primitive, out_dtype, &out_shape, &[self, other])
    }

    fn unary(&self, primitive: Primitive) -> Result<Array<B>, ArrayError> {
        materialize::materialize_pointwise(&self.backend, &primitive, self.dtype, &self.shape_tracker.shape().to_vec(), &[self])
    }

    pub fn add(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.binary(other, Primitive::Add, self.dtype)
    }

    pub fn mul(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.binary(other, Primitive::Mul, self.dtype)
    }

    pub fn sub(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.add(&other.neg()?)
    }

    pub fn div(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.mul(&other.reciprocal()?)
    }

    pub fn neg(&self) -> Result<Array<B>, ArrayError> {
        self.unary(Primitive::Neg)
    }

    pub fn reciprocal(&self) -> Result<Array<B>, ArrayError> {
        self.unary(Primitive::Reciprocal)
    }

    pub fn sin(&self) -> Result<Array<B>, ArrayError> {
        self.unary(Primitive::Sin)
    }

    pub fn cos(&self) -> Result<Array<B>, ArrayError> {
        self.unary(Primitive::Cos)
    }

    pub fn min(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.binary(other, Primitive::Min, self.dtype)
    }

    pub fn max(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.binary(other, Primitive::Max, self.dtype)
    }

    fn compare(&self, other: &Array<B>, cmp: CompareOp) -> Result<Array<B>, ArrayError> {
        self.binary(other, Primitive::Compare(cmp), DType::Bool)
    }

    pub fn lt(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Lt)
    }
    pub fn le(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Le)
    }
    pub fn gt(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Gt)
    }
    pub fn ge(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Ge)
    }
    pub fn eq(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Eq)
    }
    pub fn ne(&self, other: &Array<B>) -> Result<Array<B>, ArrayError> {
        self.compare(other, CompareOp::Ne)
    }

    pub fn where_(cond: &Array<B>, a: &Array<B>, b: &Array<B>) -> Result<Array<B>, ArrayError> {
        if cond.dtype != DType::Bool {
            return Err(DtypeError::NotBool { op: "where", found: cond.dtype }.into());
        }
        let ab_shape = broadcast_shapes(a.shape(), b.shape())?;
        let out_shape = broadcast_shapes(&ab_shape, cond.shape())?;
        materialize::materialize_pointwise(&a.backend, &Primitive::Where, a.dtype, &out_shape, &[cond, a, b])
    }

    // -- reductions (§4.1 `reduceSum`; §6 sum/max/min) ------------------------

    fn normalize_axes(&self, axes: Option<&[i64]>) -> Result<Vec<usize>, ArrayError> {
        let rank = self.rank();
        let mut axes: Vec<usize> = match axes {
            Some(a) => a
                .iter()
                .map(|&ax| {
                    let norm = if ax < 0 { ax + rank as i64 } else { ax };
                    if norm < 0 || norm as usize >= rank {
                        return Err(ShapeError::AxisOutOfBounds { axis: ax, rank });
                    }
                    Ok(norm as usize)
                })
                .collect::<Result<_, _>>()?,
            None => (0..rank).collect(),
        };
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }

    fn reduce(&self, axes: Option<&[i64]>, keepdims: bool, primitive: Primitive, identity: Literal) -> Result<Array<B>, ArrayError> {
        let axes = self.normalize_axes(axes)?;
        let (reduced, remaining_shape) = materialize::materialize_reduce(&self.backend, self, &axes, identity, &primitive, None)?;
        if !keepdims {
            return Ok(reduced);
        }
        let mut kept_shape = remaining_shape.to_vec();
        for &ax in &axes {
            kept_shape.insert(ax, 1);
        }
        reduced.reshape(&kept_shape)
    }

    pub fn sum(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Array<B>, ArrayError> {
        self.reduce(axes, keepdims, Primitive::Add, reduce_identity(Primitive::Add, self.dtype))
    }

    pub fn max_reduce(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Array<B>, ArrayError> {
        self.reduce(axes, keepdims, Primitive::Max, reduce_identity(Primitive::Max, self.dtype))
    }

    pub fn min_reduce(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Array<B>, ArrayError> {
        self.reduce(axes, keepdims, Primitive::Min, reduce_identity(Primitive::Min, self.dtype))
    }

    pub fn mean(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Array<B>, ArrayError> {
        if self.dtype != DType::F32 {
            return Err(DtypeError::NotFloat { op: "mean", found: self.dtype }.into());
        }
        let norm_axes = self.normalize_axes(axes)?;
        let count: i64 = norm_axes.iter().map(|&a| self.shape()[a]).product();
        let summed = self.sum(axes, keepdims)?;
        let divisor = Array::full(&[], DType::F32, Literal::F32(count as f32), &self.backend)?;
        let divisor = divisor.broadcast_to(summed.shape())?;
        summed.div(&divisor)
    }
}

pub(crate) fn reduce_identity(primitive: Primitive, dtype: DType) -> Literal {
    match (primitive, dtype) {
        (Primitive::Add, DType::F32) => Literal::F32(0.0),
        (Primitive::Add, DType::I32) => Literal::I32(0),
        (Primitive::Add, DType::U32) => Literal::U32(0),
        (Primitive::Max, DType::F32) => Literal::F32(f32::NEG_INFINITY),
        (Primitive::Max, DType::I32) => Literal::I32(i32::MIN),
        (Primitive::Max, DType::U32) => Literal::U32(u32::MIN),
        (Primitive::Min, DType::F32) => Literal::F32(f32::INFINITY),
        (Primitive::Min, DType::I32) => Literal::I32(i32::MAX),
        (Primitive::Min, DType::U32) => Literal::U32(u32::MAX),
        _ => unreachable!("reductions are only defined over numeric dtypes"),
    }
}

// -- constructors (§6 "Constructors from literal data / zeros / ones / full") --

impl<B: Backend> Array<B> {
    pub fn full(shape: &[i64], dtype: DType, value: Literal, backend: &Arc<B>) -> Result<Array<B>, ArrayError> {
        if value.dtype() != dtype {
            return Err(DtypeError::LiteralMismatch { literal: value.dtype(), declared: dtype }.into());
        }
        let numel: i64 = shape.iter().product();
        let bytes = repeat_literal_bytes(value, numel as usize);
        let slot = backend.malloc(bytes.len(), Some(&bytes))?;
        Ok(Array::from_slot(backend.clone(), slot, ShapeTracker::contiguous(shape), dtype))
    }

    pub fn zeros(shape: &[i64], dtype: DType, backend: &Arc<B>) -> Result<Array<B>, ArrayError> {
        Array::full(shape, dtype, zero_of(dtype), backend)
    }

    pub fn ones(shape: &[i64], dtype: DType, backend: &Arc<B>) -> Result<Array<B>, ArrayError> {
        let one = match dtype {
            DType::F32 => Literal::F32(1.0),
            DType::I32 => Literal::I32(1),
            DType::U32 => Literal::U32(1),
            DType::Bool => Literal::Bool(true),
            #[cfg(feature = "f16")]
            DType::F16 => Literal::F16(half::f16::ONE),
        };
        Array::full(shape, dtype, one, backend)
    }

    pub fn from_vec_f32(shape: &[i64], data: &[f32], backend: &Arc<B>) -> Result<Array<B>, ArrayError> {
        let numel: i64 = shape.iter().product();
        if data.len() as i64 != numel {
            return Err(ShapeError::ReshapeSize { from_size: data.len() as i64, to: shape.to_vec(), to_size: numel }.into());
        }
        let bytes = f32_vec_to_bytes(data);
        let slot = backend.malloc(bytes.len(), Some(&bytes))?;
        Ok(Array::from_slot(backend.clone(), slot, ShapeTracker::contiguous(shape), DType::F32))
    }

    pub fn from_vec_i32(shape: &[i64], data: &[i32], backend: &Arc<B>) -> Result<Array<B>, ArrayError> {
        let numel: i64 = shape.iter().product();
        if data.len() as i64 != numel {
            return Err(ShapeError::ReshapeSize { from_size: data.len() as i64, to: shape.to_vec(), to_size: numel }.into());
        }
        let bytes = i32_vec_to_bytes(data);
        let slot = backend.malloc(bytes.len(), Some(&bytes))?;
        Ok(Array::from_slot(backend.clone(), slot, ShapeTracker::contiguous(shape), DType::I32))
    }
}

impl Array<CpuBackend> {
    /// Convenience constructors defaulting to the process CPU backend
    /// (§6 "Backend selection"); GPU-backed arrays go through the generic
    /// constructors above with an explicit `Arc<B>`.
    pub fn cpu_zeros(shape: &[i64], dtype: DType) -> Result<Array<CpuBackend>, ArrayError> {
        Array::zeros(shape, dtype, &device::cpu_backend())
    }

    pub fn cpu_ones(shape: &[i64], dtype: DType) -> Result<Array<CpuBackend>, ArrayError> {
        Array::ones(shape, dtype, &device::cpu_backend())
    }

    pub fn cpu_from_vec_f32(shape: &[i64], data: &[f32]) -> Result<Array<CpuBackend>, ArrayError> {
        Array::from_vec_f32(shape, data, &device::cpu_backend())
    }

    pub fn cpu_scalar_f32(value: f32) -> Result<Array<CpuBackend>, ArrayError> {
        Array::from_vec_f32(&[], &[value], &device::cpu_backend())
    }
}
