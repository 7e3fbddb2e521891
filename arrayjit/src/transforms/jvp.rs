//! JVP, the forward-mode AD transform (§4.2).
//!
//! `Dual` pairs a primal and a tangent array and mirrors `Array`'s pointwise/
//! reduction/shape surface, applying each primitive's linearization rule as
//! it goes. `jvp`/`grad`/`jacfwd` are built on top: `grad`/`jacfwd` run one
//! forward pass per standard-basis tangent vector, which is the natural
//! "forward-mode Jacobian" §6 asks `jacfwd` for, and is sufficient for
//! `grad` since no reverse-mode rule table exists in this design (§1 lists
//! no autodiff rules beyond §4.1's primitives, all of which have JVP rules).

use arrayjit_core::dtype::{DType, Literal};

use crate::array::Array;
use crate::errors::ArrayError;
use crate::trace::interpreter::{MainTraceGuard, TraceKind};

/// A primal/tangent pair, same shape and dtype (§4.2 "tangents are
/// initialized to structural zeros, same shape/dtype as primal").
#[derive(Debug, Clone)]
pub struct Dual {
    pub primal: Array,
    pub tangent: Array,
}

impl Dual {
    pub fn constant(primal: Array) -> Result<Dual, ArrayError> {
        let tangent = Array::zeros(primal.shape(), primal.dtype(), primal.backend())?;
        Ok(Dual { primal, tangent })
    }

    pub fn shape(&self) -> &[i64] {
        self.primal.shape()
    }

    pub fn dtype(&self) -> DType {
        self.primal.dtype()
    }

    // -- §4.2 linearization rules ---------------------------------------

    pub fn add(&self, other: &Dual) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.add(&other.primal)?, tangent: self.tangent.add(&other.tangent)? })
    }

    pub fn mul(&self, other: &Dual) -> Result<Dual, ArrayError> {
        let primal = self.primal.mul(&other.primal)?;
        let a = self.primal.mul(&other.tangent)?;
        let b = self.tangent.mul(&other.primal)?;
        Ok(Dual { primal, tangent: a.add(&b)? })
    }

    pub fn neg(&self) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.neg()?, tangent: self.tangent.neg()? })
    }

    pub fn sub(&self, other: &Dual) -> Result<Dual, ArrayError> {
        self.add(&other.neg()?)
    }

    pub fn reciprocal(&self) -> Result<Dual, ArrayError> {
        // d(1/x) = -(1/x)^2 * dx
        let primal = self.primal.reciprocal()?;
        let sq = primal.mul(&primal)?;
        let scaled = sq.mul(&self.tangent)?;
        Ok(Dual { primal, tangent: scaled.neg()? })
    }

    pub fn div(&self, other: &Dual) -> Result<Dual, ArrayError> {
        self.mul(&other.reciprocal()?)
    }

    pub fn sin(&self) -> Result<Dual, ArrayError> {
        let primal = self.primal.sin()?;
        let cos = self.primal.cos()?;
        Ok(Dual { primal, tangent: cos.mul(&self.tangent)? })
    }

    pub fn cos(&self) -> Result<Dual, ArrayError> {
        let primal = self.primal.cos()?;
        let sin = self.primal.sin()?;
        Ok(Dual { primal, tangent: sin.mul(&self.tangent)?.neg()? })
    }

    /// `min/max: dy if y<x else dx` (ties break to the second operand).
    pub fn min(&self, other: &Dual) -> Result<Dual, ArrayError> {
        let primal = self.primal.min(&other.primal)?;
        let y_lt_x = other.primal.lt(&self.primal)?;
        let tangent = Array::where_(&y_lt_x, &other.tangent, &self.tangent)?;
        Ok(Dual { primal, tangent })
    }

    pub fn max(&self, other: &Dual) -> Result<Dual, ArrayError> {
        // Mirrors `Primitive::Max`'s selection (`x < y` picks `y`), unlike
        // `min`'s `y < x` picks `y`.
        let primal = self.primal.max(&other.primal)?;
        let x_lt_y = self.primal.lt(&other.primal)?;
        let tangent = Array::where_(&x_lt_y, &other.tangent, &self.tangent)?;
        Ok(Dual { primal, tangent })
    }

    /// `where(c,a,b)`: primal `where(c,a,b)`, tangent `where(c, da, db)`.
    pub fn where_(cond: &Array, a: &Dual, b: &Dual) -> Result<Dual, ArrayError> {
        let primal = Array::where_(cond, &a.primal, &b.primal)?;
        let tangent = Array::where_(cond, &a.tangent, &b.tangent)?;
        Ok(Dual { primal, tangent })
    }

    /// `reduceSum` commutes with itself.
    pub fn sum(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.sum(axes, keepdims)?, tangent: self.tangent.sum(axes, keepdims)? })
    }

    pub fn mean(&self, axes: Option<&[i64]>, keepdims: bool) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.mean(axes, keepdims)?, tangent: self.tangent.mean(axes, keepdims)? })
    }

    /// `transpose/broadcast/reshape/flip: commute identically with
    /// themselves on the tangent`.
    pub fn reshape(&self, shape: &[i64]) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.reshape(shape)?, tangent: self.tangent.reshape(shape)? })
    }

    pub fn transpose(&self, perm: &[usize]) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.transpose(perm)?, tangent: self.tangent.transpose(perm)? })
    }

    pub fn broadcast_to(&self, shape: &[i64]) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.broadcast_to(shape)?, tangent: self.tangent.broadcast_to(shape)? })
    }

    pub fn flip(&self, axes: &[usize]) -> Result<Dual, ArrayError> {
        Ok(Dual { primal: self.primal.flip(axes)?, tangent: self.tangent.flip(axes)? })
    }

    /// Boolean-producing ops force the tangent to zero (§4.2 "compare, all
    /// boolean-producing ops: tangents are forced to zero").
    pub fn compare_zero_tangent(primal: Array) -> Result<Dual, ArrayError> {
        let tangent = Array::zeros(primal.shape(), DType::Bool, primal.backend())?;
        Ok(Dual { primal, tangent })
    }
}

/// `jvp(f, primals, tangents) -> (primal_out, tangent_out)` (§6).
pub fn jvp<F>(f: F, primals: &[Array], tangents: &[Array]) -> Result<(Vec<Array>, Vec<Array>), ArrayError>
where
    F: FnOnce(&[Dual]) -> Result<Vec<Dual>, ArrayError>,
{
    if primals.len() != tangents.len() {
        return Err(crate::errors::TreeMismatchError {
            lhs_path: "primals".to_string(),
            rhs_path: "tangents".to_string(),
            lhs_desc: format!("{} leaves", primals.len()),
            rhs_desc: format!("{} leaves", tangents.len()),
        }
        .into());
    }
    let duals: Vec<Dual> =
        primals.iter().zip(tangents).map(|(p, t)| Dual { primal: p.clone(), tangent: t.clone() }).collect();

    let _guard = MainTraceGuard::push(TraceKind::Jvp);
    let outs = f(&duals)?;
    Ok(outs.into_iter().map(|d| (d.primal, d.tangent)).unzip())
}

/// Forward-mode Jacobian: stacks `jvp` results over the standard basis of
/// the (flattened) input (§6 `jacfwd`). Returns a 2-D array of shape
/// `[output_numel, input_numel]`.
pub fn jacfwd<F>(f: F, x: &Array) -> Result<Array, ArrayError>
where
    F: Fn(&Dual) -> Result<Dual, ArrayError>,
{
    let n = x.numel() as usize;
    let mut out_numel: Option<usize> = None;
    let mut columns: Vec<Vec<f32>> = Vec::with_capacity(n);

    for i in 0..n {
        let mut basis = vec![0f32; n];
        basis[i] = 1.0;
        let tangent = Array::from_vec_f32(x.shape(), &basis, x.backend())?;
        let dual_x = Dual { primal: x.clone(), tangent };
        let _guard = MainTraceGuard::push(TraceKind::Jvp);
        let out = f(&dual_x)?;
        drop(_guard);
        let col = out.tangent.to_vec_f32()?;
        out_numel.get_or_insert(col.len());
        columns.push(col);
    }

    let rows = out_numel.unwrap_or(0);
    let mut data = vec![0f32; rows * n];
    for (col_idx, col) in columns.iter().enumerate() {
        for (row_idx, &v) in col.iter().enumerate() {
            data[row_idx * n + col_idx] = v;
        }
    }
    Array::from_vec_f32(&[rows as i64, n as i64], &data, x.backend())
}

/// `grad(f, argnum?=0) -> g`: forward-mode gradient of a scalar-valued `f`
/// (§6). Requires `f`'s output to have exactly one element.
pub fn grad<F>(f: F, x: &Array) -> Result<Array, ArrayError>
where
    F: Fn(&Dual) -> Result<Dual, ArrayError>,
{
    let n = x.numel() as usize;
    let mut data = vec![0f32; n];
    for i in 0..n {
        let mut basis = vec![0f32; n];
        basis[i] = 1.0;
        let tangent = Array::from_vec_f32(x.shape(), &basis, x.backend())?;
        let dual_x = Dual { primal: x.clone(), tangent };
        let _guard = MainTraceGuard::push(TraceKind::Jvp);
        let out = f(&dual_x)?;
        drop(_guard);
        let tangent_out = out.tangent.to_vec_f32()?;
        debug_assert_eq!(tangent_out.len(), 1, "grad requires a scalar-valued function");
        data[i] = tangent_out[0];
    }
    Array::from_vec_f32(x.shape(), &data, x.backend())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sin_derivative_matches_cosine() {
        let x = Array::cpu_scalar_f32(3.0).unwrap();
        let v = Array::cpu_scalar_f32(1.0).unwrap();
        let (primal, tangent) = jvp(|d| Ok(vec![d[0].sin()?]), &[x], &[v]).unwrap();
        let p = primal[0].to_vec_f32().unwrap()[0];
        let t = tangent[0].to_vec_f32().unwrap()[0];
        assert!((p - 0.141120).abs() < 1e-5);
        assert!((t - (-0.989992)).abs() < 1e-5);
    }

    #[test]
    fn grad_of_sum_of_squares_is_two_x() {
        let x = Array::cpu_from_vec_f32(&[4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let g = grad(|d| d.mul(d)?.sum(None, false), &x).unwrap();
        assert_eq!(g.to_vec_f32().unwrap(), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn dispose_after_grad_is_detected() {
        let x = Array::cpu_from_vec_f32(&[4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let _g = grad(|d| d.mul(d)?.sum(None, false), &x).unwrap();
        x.dispose().unwrap();
        assert!(x.dispose().is_err());
    }
}
