//! The tagged-variant `Tracer` abstract value (§9 design note): replaces
//! class-based tracer subclassing with one enum and per-primitive,
//! per-variant rule tables.
//!
//! `transforms::jvp`'s `Dual` and `transforms::vmap`'s `Batched` are the
//! concrete rule tables for the `Jvp`/`Batched` variants; `JitBuilder`
//! documents the shape a recording tracer takes but `transforms::jit` keeps
//! its own `JitAtom`/`JaxprBuilder` rather than threading through this enum,
//! since recording equations needs a different internal representation than
//! "pair of arrays" (see `DESIGN.md`).

use arrayjit_core::dtype::DType;

use crate::array::Array;

/// An abstract value: just enough to type-check a primitive call without
/// forcing data (§4.1 "A tracer carries an abstract value `{shape, dtype}`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbstractValue {
    pub shape: Vec<i64>,
    pub dtype: DType,
}

/// A value that may stand in for a concrete array under some transform.
#[derive(Debug, Clone)]
pub enum Tracer {
    Concrete(Array),
    Jvp { primal: Box<Tracer>, tangent: Box<Tracer> },
    Batched { value: Box<Tracer>, batch_axis: Option<usize> },
    /// A placeholder atom in a jaxpr under construction, identified by its
    /// position in the equation list.
    JitBuilder(usize),
}

impl Tracer {
    pub fn abstract_value(&self) -> Option<AbstractValue> {
        match self {
            Tracer::Concrete(a) => Some(AbstractValue { shape: a.shape().to_vec(), dtype: a.dtype() }),
            Tracer::Jvp { primal, .. } => primal.abstract_value(),
            Tracer::Batched { value, batch_axis } => {
                let inner = value.abstract_value()?;
                let mut shape = inner.shape;
                if let Some(axis) = batch_axis {
                    shape.remove(*axis);
                }
                Some(AbstractValue { shape, dtype: inner.dtype })
            }
            Tracer::JitBuilder(_) => None,
        }
    }
}
