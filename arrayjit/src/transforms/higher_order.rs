//! Nested forward-mode differentiation (§8 scenario 2's "nested third
//! derivative"). `jvp`/`grad`/`jacfwd` in `jvp.rs` are first-order only —
//! their `Dual` is a concrete `{primal: Array, tangent: Array}` pair, not
//! generic, so it cannot itself be wrapped in another `Dual` the way true
//! nesting needs. This module generalizes the same linearization rules over
//! a `Numeric` trait so a dual-number *tower* (`GenDual<GenDual<Array>>`,
//! ...) can be built, giving exact higher-order derivatives by seeding each
//! added level with its own unit tangent and reading the result back off by
//! peeling `.tangent` once per order — the standard nested-dual-numbers
//! construction for exact higher derivatives (as opposed to finite
//! differences).
//!
//! Scope is deliberately narrow: just the operations needed to compose
//! smooth scalar functions (`+ - * / sin cos`), which is what every
//! worked higher-order example in this design actually needs. `min`/`max`/
//! `where`/reductions stay first-order-only in `jvp.rs`'s concrete `Dual`.

use crate::array::Array;
use crate::errors::ArrayError;

/// The operations a value needs to support in order to be differentiated
/// (possibly itself a dual number one level up the tower).
pub trait Numeric: Sized + Clone {
    fn add(&self, other: &Self) -> Result<Self, ArrayError>;
    fn neg(&self) -> Result<Self, ArrayError>;
    fn mul(&self, other: &Self) -> Result<Self, ArrayError>;
    fn reciprocal(&self) -> Result<Self, ArrayError>;
    fn sin(&self) -> Result<Self, ArrayError>;
    fn cos(&self) -> Result<Self, ArrayError>;
    /// The additive identity with this value's shape/dtype.
    fn zero_like(&self) -> Result<Self, ArrayError>;
    /// The multiplicative identity with this value's shape/dtype.
    fn one_like(&self) -> Result<Self, ArrayError>;

    fn sub(&self, other: &Self) -> Result<Self, ArrayError> {
        self.add(&other.neg()?)
    }

    fn div(&self, other: &Self) -> Result<Self, ArrayError> {
        self.mul(&other.reciprocal()?)
    }
}

impl Numeric for Array {
    fn add(&self, other: &Self) -> Result<Self, ArrayError> {
        Array::add(self, other)
    }
    fn neg(&self) -> Result<Self, ArrayError> {
        Array::neg(self)
    }
    fn mul(&self, other: &Self) -> Result<Self, ArrayError> {
        Array::mul(self, other)
    }
    fn reciprocal(&self) -> Result<Self, ArrayError> {
        Array::reciprocal(self)
    }
    fn sin(&self) -> Result<Self, ArrayError> {
        Array::sin(self)
    }
    fn cos(&self) -> Result<Self, ArrayError> {
        Array::cos(self)
    }
    fn zero_like(&self) -> Result<Self, ArrayError> {
        Array::zeros(self.shape(), self.dtype(), self.backend())
    }
    fn one_like(&self) -> Result<Self, ArrayError> {
        Array::ones(self.shape(), self.dtype(), self.backend())
    }
}

/// A generic primal/tangent pair (one level of the dual-number tower).
/// `GenDual<T>` itself implements `Numeric`, so `GenDual<GenDual<T>>` is a
/// valid second-order tower, and so on to any depth.
#[derive(Debug, Clone)]
pub struct GenDual<T: Numeric> {
    pub primal: T,
    pub tangent: T,
}

impl<T: Numeric> Numeric for GenDual<T> {
    fn add(&self, other: &Self) -> Result<Self, ArrayError> {
        Ok(GenDual { primal: self.primal.add(&other.primal)?, tangent: self.tangent.add(&other.tangent)? })
    }

    fn neg(&self) -> Result<Self, ArrayError> {
        Ok(GenDual { primal: self.primal.neg()?, tangent: self.tangent.neg()? })
    }

    fn mul(&self, other: &Self) -> Result<Self, ArrayError> {
        let primal = self.primal.mul(&other.primal)?;
        let a = self.primal.mul(&other.tangent)?;
        let b = self.tangent.mul(&other.primal)?;
        Ok(GenDual { primal, tangent: a.add(&b)? })
    }

    fn reciprocal(&self) -> Result<Self, ArrayError> {
        let primal = self.primal.reciprocal()?;
        let sq = primal.mul(&primal)?;
        let scaled = sq.mul(&self.tangent)?;
        Ok(GenDual { primal, tangent: scaled.neg()? })
    }

    fn sin(&self) -> Result<Self, ArrayError> {
        let primal = self.primal.sin()?;
        let cos = self.primal.cos()?;
        Ok(GenDual { primal, tangent: cos.mul(&self.tangent)? })
    }

    fn cos(&self) -> Result<Self, ArrayError> {
        let primal = self.primal.cos()?;
        let sin = self.primal.sin()?;
        Ok(GenDual { primal, tangent: sin.mul(&self.tangent)?.neg()? })
    }

    fn zero_like(&self) -> Result<Self, ArrayError> {
        Ok(GenDual { primal: self.primal.zero_like()?, tangent: self.tangent.zero_like()? })
    }

    fn one_like(&self) -> Result<Self, ArrayError> {
        Ok(GenDual { primal: self.primal.one_like()?, tangent: self.tangent.zero_like()? })
    }
}

/// A function composed generically over any `Numeric` tower — the
/// monomorphization that lets the same function body run at depth 1, 2, or
/// 3 (a plain closure can't carry a type parameter, so this is expressed
/// as a trait with a generic method instead).
pub trait DifferentiableFn {
    fn apply<T: Numeric>(&self, x: &GenDual<T>) -> Result<GenDual<T>, ArrayError>;
}

/// First derivative (equivalent to `jvp.rs`'s `jvp` with a unit tangent,
/// provided here so callers composing with `second_derivative`/
/// `third_derivative` have one consistent entry point).
pub fn first_derivative<F: DifferentiableFn>(f: &F, x: &Array) -> Result<Array, ArrayError> {
    let d1 = GenDual { primal: x.clone(), tangent: x.one_like()? };
    Ok(f.apply(&d1)?.tangent)
}

/// Second derivative via a depth-2 dual-number tower.
pub fn second_derivative<F: DifferentiableFn>(f: &F, x: &Array) -> Result<Array, ArrayError> {
    let d1 = GenDual { primal: x.clone(), tangent: x.one_like()? };
    let d2 = GenDual { primal: d1.clone(), tangent: d1.one_like()? };
    Ok(f.apply(&d2)?.tangent.tangent)
}

/// Third derivative via a depth-3 dual-number tower (§8 scenario 2).
pub fn third_derivative<F: DifferentiableFn>(f: &F, x: &Array) -> Result<Array, ArrayError> {
    let d1 = GenDual { primal: x.clone(), tangent: x.one_like()? };
    let d2 = GenDual { primal: d1.clone(), tangent: d1.one_like()? };
    let d3 = GenDual { primal: d2.clone(), tangent: d2.one_like()? };
    Ok(f.apply(&d3)?.tangent.tangent.tangent)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sin;
    impl DifferentiableFn for Sin {
        fn apply<T: Numeric>(&self, x: &GenDual<T>) -> Result<GenDual<T>, ArrayError> {
            x.sin()
        }
    }

    #[test]
    fn sin_first_derivative_is_cosine() {
        let x = Array::cpu_scalar_f32(3.0).unwrap();
        let d1 = first_derivative(&Sin, &x).unwrap().to_vec_f32().unwrap()[0];
        assert!((d1 - (-0.989992)).abs() < 1e-5);
    }

    #[test]
    fn sin_third_derivative_matches_worked_example() {
        let x = Array::cpu_scalar_f32(3.0).unwrap();
        let d3 = third_derivative(&Sin, &x).unwrap().to_vec_f32().unwrap()[0];
        assert!((d3 - 0.989992).abs() < 1e-5);
    }
}
