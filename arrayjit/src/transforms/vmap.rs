//! vmap, the batching transform (§4.3).
//!
//! `Batched` wraps a value with an optional batch axis and mirrors a chunk
//! of `Array`'s surface. Every rule here canonicalizes a batched value's
//! axis to 0 before touching the backend (§4.3 "move the batch axis to
//! position 0"), so the reduction rule's axis bookkeeping collapses to
//! "shift requested axes by one, output stays batched at 0" instead of the
//! general "input batch axis minus axes reduced before it" — a
//! simplification recorded in `DESIGN.md`, valid because this vmap never
//! hands a caller a `Batched` at any axis but 0.

use arrayjit_core::errors::ShapeError;

use crate::array::Array;
use crate::errors::ArrayError;
use crate::trace::interpreter::{MainTraceGuard, TraceKind};

#[derive(Debug, Clone)]
pub struct Batched {
    pub value: Array,
    pub batch_axis: Option<usize>,
}

impl Batched {
    pub fn unbatched(value: Array) -> Batched {
        Batched { value, batch_axis: None }
    }

    fn batch_len(&self) -> Option<i64> {
        self.batch_axis.map(|ax| self.value.shape()[ax])
    }

    /// Returns a view of `value` with the batch dimension at axis 0, of
    /// size `batch_size`; unbatched values are broadcast in a new leading
    /// axis of that size.
    fn aligned(&self, batch_size: i64) -> Result<Array, ArrayError> {
        match self.batch_axis {
            Some(0) => Ok(self.value.clone()),
            Some(ax) => {
                let mut perm: Vec<usize> = (0..self.value.rank()).collect();
                perm.remove(ax);
                perm.insert(0, ax);
                self.value.transpose(&perm)
            }
            None => {
                let mut shape = self.value.shape().to_vec();
                shape.insert(0, batch_size);
                let mut broadcast_shape = self.value.shape().to_vec();
                broadcast_shape.insert(0, 1);
                self.value.reshape(&broadcast_shape)?.broadcast_to(&shape)
            }
        }
    }

    fn binary(
        a: &Batched,
        b: &Batched,
        op: impl FnOnce(&Array, &Array) -> Result<Array, ArrayError>,
    ) -> Result<Batched, ArrayError> {
        match (a.batch_axis, b.batch_axis) {
            (None, None) => Ok(Batched { value: op(&a.value, &b.value)?, batch_axis: None }),
            _ => {
                let batch_size = a.batch_len().or(b.batch_len()).expect("at least one operand is batched");
                if let (Some(x), Some(y)) = (a.batch_len(), b.batch_len()) {
                    if x != y {
                        return Err(ShapeError::Broadcast { lhs: vec![x], rhs: vec![y] }.into());
                    }
                }
                let av = a.aligned(batch_size)?;
                let bv = b.aligned(batch_size)?;
                Ok(Batched { value: op(&av, &bv)?, batch_axis: Some(0) })
            }
        }
    }

    fn unary(a: &Batched, op: impl FnOnce(&Array) -> Result<Array, ArrayError>) -> Result<Batched, ArrayError> {
        Ok(Batched { value: op(&a.value)?, batch_axis: a.batch_axis.map(|_| 0) })
    }

    pub fn add(&self, other: &Batched) -> Result<Batched, ArrayError> {
        Batched::binary(self, other, |a, b| a.add(b))
    }

    pub fn mul(&self, other: &Batched) -> Result<Batched, ArrayError> {
        Batched::binary(self, other, |a, b| a.mul(b))
    }

    pub fn sub(&self, other: &Batched) -> Result<Batched, ArrayError> {
        Batched::binary(self, other, |a, b| a.sub(b))
    }

    pub fn neg(&self) -> Result<Batched, ArrayError> {
        Batched::unary(self, |a| a.neg())
    }

    pub fn sin(&self) -> Result<Batched, ArrayError> {
        Batched::unary(self, |a| a.sin())
    }

    pub fn cos(&self) -> Result<Batched, ArrayError> {
        Batched::unary(self, |a| a.cos())
    }

    /// Reductions adjust requested axes by +1 for those landing at or past
    /// the (canonicalized, always-0) batch axis; the output stays batched
    /// at 0 since nothing is ever reduced below it (§4.3).
    pub fn sum(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Batched, ArrayError> {
        match self.batch_axis {
            None => Ok(Batched { value: self.value.sum(axes, keepdims)?, batch_axis: None }),
            Some(_) => {
                let v = self.aligned(self.value.shape()[self.batch_axis.unwrap()])?;
                let pre_rank = v.rank() - 1;
                let shifted: Option<Vec<i64>> = axes.map(|a| {
                    a.iter()
                        .map(|&ax| {
                            let norm = if ax < 0 { ax + pre_rank as i64 } else { ax };
                            norm + 1
                        })
                        .collect()
                });
                let out = v.sum(shifted.as_deref(), keepdims)?;
                Ok(Batched { value: out, batch_axis: Some(0) })
            }
        }
    }

    pub fn reshape(&self, shape: &[i64]) -> Result<Batched, ArrayError> {
        match self.batch_axis {
            None => Ok(Batched { value: self.value.reshape(shape)?, batch_axis: None }),
            Some(ax) => {
                let batch_size = self.value.shape()[ax];
                let v = self.aligned(batch_size)?;
                let mut full_shape = vec![batch_size];
                full_shape.extend_from_slice(shape);
                Ok(Batched { value: v.reshape(&full_shape)?, batch_axis: Some(0) })
            }
        }
    }
}

/// `vmap(f, inAxes) -> impl Fn(&[Array]) -> Result<Vec<Array>, ArrayError>`
/// (§6). Every batched operand must agree on the batched axis length (§4.3).
pub fn vmap<F>(f: F, in_axes: &[Option<usize>]) -> impl Fn(&[Array]) -> Result<Vec<Array>, ArrayError>
where
    F: Fn(&[Batched]) -> Result<Vec<Batched>, ArrayError>,
{
    let in_axes = in_axes.to_vec();
    move |inputs: &[Array]| {
        if inputs.len() != in_axes.len() {
            return Err(crate::errors::TreeMismatchError {
                lhs_path: "inputs".to_string(),
                rhs_path: "in_axes".to_string(),
                lhs_desc: format!("{} leaves", inputs.len()),
                rhs_desc: format!("{} leaves", in_axes.len()),
            }
            .into());
        }

        let mut batch_size: Option<i64> = None;
        for (arr, ax) in inputs.iter().zip(&in_axes) {
            if let Some(a) = ax {
                let sz = arr.shape()[*a];
                match batch_size {
                    None => batch_size = Some(sz),
                    Some(b) if b != sz => return Err(ShapeError::Broadcast { lhs: vec![b], rhs: vec![sz] }.into()),
                    _ => {}
                }
            }
        }

        let batched: Vec<Batched> = inputs
            .iter()
            .zip(&in_axes)
            .map(|(arr, ax)| {
                let b = Batched { value: arr.clone(), batch_axis: *ax };
                Ok::<_, ArrayError>(match ax {
                    Some(a) if *a != 0 => {
                        let size = arr.shape()[*a];
                        Batched { value: b.aligned(size)?, batch_axis: Some(0) }
                    }
                    Some(_) => b,
                    None => b,
                })
            })
            .collect::<Result<_, _>>()?;

        let _guard = MainTraceGuard::push(TraceKind::Vmap);
        let outs = f(&batched)?;
        Ok(outs.into_iter().map(|b| b.value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vmap_over_batch_zero_matches_looped_reference() {
        let xs = Array::cpu_from_vec_f32(&[3, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let ys = Array::cpu_from_vec_f32(&[3, 2], &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]).unwrap();

        let batched_add = vmap(|args| Ok(vec![args[0].add(&args[1])?]), &[Some(0), Some(0)]);
        let out = batched_add(&[xs, ys]).unwrap();
        assert_eq!(out[0].to_vec_f32().unwrap(), vec![11.0, 22.0, 33.0, 44.0, 55.0, 66.0]);
    }

    #[test]
    fn mismatched_batch_sizes_are_rejected() {
        let xs = Array::cpu_from_vec_f32(&[3, 2], &[0.0; 6]).unwrap();
        let ys = Array::cpu_from_vec_f32(&[2, 2], &[0.0; 4]).unwrap();
        let batched_add = vmap(|args| Ok(vec![args[0].add(&args[1])?]), &[Some(0), Some(0)]);
        assert!(batched_add(&[xs, ys]).is_err());
    }
}
