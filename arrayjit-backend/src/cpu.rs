//! `CpuBackend`: the reference implementation of the `Backend` contract.
//!
//! Stands in for "the two concrete backends" §4.5 says the core assumes but
//! never reaches into; the algebraic-law tests in `arrayjit`'s test suite
//! run fused kernels against this backend directly.

use std::collections::HashMap;

use arrayjit_core::dtype::{DType, Literal};
use arrayjit_core::kernel::Kernel;
use arrayjit_core::scalar_expr::{evaluate, BufferSource, EvalContext, ScalarGraph, SpecialKind};
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::errors::BackendError;
use crate::slot::Slot;

const ALIGNMENT: usize = 64;

fn round_up_to_alignment(size: usize) -> usize {
    size.div_ceil(ALIGNMENT) * ALIGNMENT
}

struct CpuBuffer {
    data: Vec<u8>,
    refcount: u32,
}

#[derive(Default)]
struct CpuState {
    buffers: HashMap<u64, CpuBuffer>,
    next_id: u64,
}

/// A single-threaded-dispatch, `Mutex`-guarded CPU backend that
/// materializes kernels by interpreting the `ScalarExpr` per output index.
pub struct CpuBackend {
    state: Mutex<CpuState>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self { state: Mutex::new(CpuState::default()) }
    }

    fn with_buffer<R>(&self, slot: Slot, f: impl FnOnce(&CpuBuffer) -> R) -> Result<R, BackendError> {
        let state = self.state.lock();
        let buf = state
            .buffers
            .get(&slot.raw_id())
            .ok_or_else(|| BackendError::new(format!("unknown or freed {slot}")))?;
        Ok(f(buf))
    }
}

/// Compiled form of a `Kernel` on the CPU backend: there is no real compile
/// step, so this just owns a clone of the kernel plus the graph it was
/// built from (§4.5 "compilation is idempotent").
pub struct CpuExecutable {
    kernel: Kernel,
    graph: ScalarGraph,
}

struct SlotBufferSource<'a> {
    inputs: &'a [Vec<u8>],
}

impl<'a> BufferSource for SlotBufferSource<'a> {
    fn read(&self, gid: u32, dtype: DType, linear_index: i64) -> Literal {
        let bytes = &self.inputs[gid as usize];
        let size = dtype.size_bytes();
        let start = linear_index as usize * size;
        read_literal(dtype, &bytes[start..start + size])
    }
}

fn read_literal(dtype: DType, bytes: &[u8]) -> Literal {
    match dtype {
        DType::I32 => Literal::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
        DType::U32 => Literal::U32(u32::from_le_bytes(bytes.try_into().unwrap())),
        DType::F32 => Literal::F32(f32::from_le_bytes(bytes.try_into().unwrap())),
        DType::Bool => Literal::Bool(bytes[0] != 0),
        #[cfg(feature = "f16")]
        DType::F16 => Literal::F16(half::f16::from_le_bytes(bytes.try_into().unwrap())),
    }
}

fn write_literal(out: &mut [u8], lit: Literal) {
    match lit {
        Literal::I32(v) => out.copy_from_slice(&v.to_le_bytes()),
        Literal::U32(v) => out.copy_from_slice(&v.to_le_bytes()),
        Literal::F32(v) => out.copy_from_slice(&v.to_le_bytes()),
        Literal::Bool(v) => out[0] = v as u8,
        #[cfg(feature = "f16")]
        Literal::F16(v) => out.copy_from_slice(&v.to_le_bytes()),
    }
}

impl Backend for CpuBackend {
    type Executable = CpuExecutable;

    fn malloc(&self, size_bytes: usize, initial_data: Option<&[u8]>) -> Result<Slot, BackendError> {
        if let Some(data) = initial_data {
            if data.len() != size_bytes {
                return Err(BackendError::new(format!(
                    "initial_data length {} does not match size_bytes {}",
                    data.len(),
                    size_bytes
                )));
            }
        }
        let mut data = vec![0u8; round_up_to_alignment(size_bytes)];
        if let Some(initial) = initial_data {
            data[..initial.len()].copy_from_slice(initial);
        }
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.buffers.insert(id, CpuBuffer { data, refcount: 1 });
        tracing::debug!(slot = id, size_bytes, "cpu backend malloc");
        Ok(Slot(id))
    }

    fn inc_ref(&self, slot: Slot) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let buf = state
            .buffers
            .get_mut(&slot.raw_id())
            .ok_or_else(|| BackendError::new(format!("inc_ref on unknown {slot}")))?;
        buf.refcount += 1;
        Ok(())
    }

    fn dec_ref(&self, slot: Slot) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let refcount = {
            let buf = state
                .buffers
                .get_mut(&slot.raw_id())
                .ok_or_else(|| BackendError::new(format!("dec_ref on unknown {slot}")))?;
            buf.refcount = buf.refcount.checked_sub(1).ok_or_else(|| {
                BackendError::new(format!("dec_ref underflow on {slot}"))
            })?;
            buf.refcount
        };
        if refcount == 0 {
            state.buffers.remove(&slot.raw_id());
            tracing::debug!(slot = slot.raw_id(), "cpu backend freed buffer");
        }
        Ok(())
    }

    fn read(&self, slot: Slot, start: usize, count: Option<usize>) -> Result<Vec<u8>, BackendError> {
        self.with_buffer(slot, |buf| {
            let end = count.map_or(buf.data.len(), |c| start + c);
            buf.data[start..end].to_vec()
        })
    }

    fn prepare(&self, kernel: &Kernel, graph: &ScalarGraph) -> Result<CpuExecutable, BackendError> {
        tracing::debug!(nargs = kernel.nargs(graph), "cpu backend prepare");
        Ok(CpuExecutable { kernel: kernel.clone(), graph: graph.clone() })
    }

    fn dispatch(
        &self,
        exe: &CpuExecutable,
        inputs: &[Slot],
        output: Slot,
    ) -> Result<(), BackendError> {
        let input_bytes: Vec<Vec<u8>> = inputs
            .iter()
            .map(|&s| self.read(s, 0, None))
            .collect::<Result<_, _>>()?;
        let buffer_source = SlotBufferSource { inputs: &input_bytes };

        let dtype = exe.kernel.output_dtype;
        let elem_size = dtype.size_bytes();
        let mut out_bytes = vec![0u8; exe.kernel.output_size as usize * elem_size];

        for i in 0..exe.kernel.output_size {
            let base_ctx =
                EvalContext::new().with_index_special(SpecialKind::Gidx, i).with_buffers(&buffer_source);

            let value = if let Some(reduction) = &exe.kernel.reduction {
                let mut acc = evaluate(&exe.graph, reduction.identity, &base_ctx)
                    .map_err(|e| BackendError::new(e.to_string()))?;
                for r in 0..reduction.axis_size {
                    let body_ctx = base_ctx.clone().with_index_special(SpecialKind::Ridx, r);
                    let elem = evaluate(&exe.graph, exe.kernel.body, &body_ctx)
                        .map_err(|e| BackendError::new(e.to_string()))?;
                    let combine_ctx = EvalContext::new()
                        .with_special(SpecialKind::Acc, acc)
                        .with_special(SpecialKind::Elem, elem)
                        .with_buffers(&buffer_source);
                    acc = evaluate(&exe.graph, reduction.combine, &combine_ctx)
                        .map_err(|e| BackendError::new(e.to_string()))?;
                }
                match reduction.epilogue {
                    Some(epilogue_id) => {
                        let epi_ctx = base_ctx.clone().with_special(SpecialKind::Acc, acc);
                        evaluate(&exe.graph, epilogue_id, &epi_ctx)
                            .map_err(|e| BackendError::new(e.to_string()))?
                    }
                    None => acc,
                }
            } else {
                evaluate(&exe.graph, exe.kernel.body, &base_ctx)
                    .map_err(|e| BackendError::new(e.to_string()))?
            };

            let start = i as usize * elem_size;
            write_literal(&mut out_bytes[start..start + elem_size], value);
        }

        let mut state = self.state.lock();
        let buf = state
            .buffers
            .get_mut(&output.raw_id())
            .ok_or_else(|| BackendError::new(format!("dispatch output is unknown {output}")))?;
        buf.data[..out_bytes.len()].copy_from_slice(&out_bytes);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayjit_core::kernel::Kernel;

    #[test]
    fn pointwise_add_matches_reference() {
        let mut graph = ScalarGraph::new();
        let gidx = graph.special(SpecialKind::Gidx, 4, DType::I32);
        let a = graph.global_index(0, DType::F32, gidx);
        let b = graph.global_index(1, DType::F32, gidx);
        let body = graph.add(a, b).unwrap();

        let kernel = Kernel::pointwise(DType::F32, 4, body);
        let backend = CpuBackend::new();
        let lhs: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let rhs: Vec<f32> = vec![10.0, 20.0, 30.0, 40.0];
        let lhs_bytes: Vec<u8> = lhs.iter().flat_map(|v| v.to_le_bytes()).collect();
        let rhs_bytes: Vec<u8> = rhs.iter().flat_map(|v| v.to_le_bytes()).collect();

        let lhs_slot = backend.malloc(lhs_bytes.len(), Some(&lhs_bytes)).unwrap();
        let rhs_slot = backend.malloc(rhs_bytes.len(), Some(&rhs_bytes)).unwrap();
        let out_slot = backend.malloc(4 * 4, None).unwrap();

        let exe = backend.prepare(&kernel, &graph).unwrap();
        backend.dispatch(&exe, &[lhs_slot, rhs_slot], out_slot).unwrap();

        let out_bytes = backend.read(out_slot, 0, None).unwrap();
        let out: Vec<f32> =
            out_bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(&out[..4], &[11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn reduce_sum_matches_reference() {
        let mut graph = ScalarGraph::new();
        let ridx = graph.special(SpecialKind::Ridx, 4, DType::I32);
        let body = graph.global_index(0, DType::F32, ridx);
        let acc = graph.special(SpecialKind::Acc, 0, DType::F32);
        let elem = graph.special(SpecialKind::Elem, 0, DType::F32);
        let combine = graph.add(acc, elem).unwrap();
        let identity = graph.konst(DType::F32, Literal::F32(0.0)).unwrap();

        let kernel = Kernel::reducing(
            DType::F32,
            1,
            body,
            arrayjit_core::kernel::Reduction { axis_size: 4, identity, combine, epilogue: None },
        );

        let backend = CpuBackend::new();
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        let in_slot = backend.malloc(bytes.len(), Some(&bytes)).unwrap();
        let out_slot = backend.malloc(4, None).unwrap();

        let exe = backend.prepare(&kernel, &graph).unwrap();
        backend.dispatch(&exe, &[in_slot], out_slot).unwrap();

        let out_bytes = backend.read(out_slot, 0, None).unwrap();
        let sum = f32::from_le_bytes(out_bytes[..4].try_into().unwrap());
        assert_eq!(sum, 10.0);
    }

    #[test]
    fn double_free_is_rejected() {
        let backend = CpuBackend::new();
        let slot = backend.malloc(64, None).unwrap();
        backend.dec_ref(slot).unwrap();
        assert!(backend.dec_ref(slot).is_err());
    }
}
