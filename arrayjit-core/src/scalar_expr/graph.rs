//! `ScalarExpr`: an arena of hash-consed scalar IR nodes (§3.1).
//!
//! Nodes live in a `ScalarGraph` arena and are referred to by `ScalarExprId`,
//! the same arena-of-nodes-by-id shape `miden-core`'s `MastForest`/
//! `MastNodeId` pair uses for its node DAG. Construction goes through
//! `ScalarGraph`'s methods, which intern structurally-equal nodes to the
//! same id — this is what makes "sharing is structural" (§3.1) true without
//! a separate CSE pass.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::op::{ExprArg, Op, SpecialKind};
use crate::dtype::{DType, Literal};
use crate::errors::DtypeError;

/// An index into a `ScalarGraph`'s node arena.
///
/// Two equal `ScalarExprId`s from the same graph always denote structurally
/// equal subtrees (hash-consing invariant); the converse — equal subtrees
/// built separately — is also true because construction always goes through
/// `ScalarGraph::intern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScalarExprId(u32);

impl ScalarExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) const MAX_SOURCES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ScalarExprNode {
    pub op: Op,
    pub dtype: DType,
    pub sources: SmallVec<[ScalarExprId; MAX_SOURCES]>,
    pub arg: ExprArg,
}

/// Arena + hash-consing table for `ScalarExpr` DAGs.
///
/// A `ScalarGraph` is typically owned by whoever is building one kernel's
/// expression (the tracer or the materializer); nodes from different graphs
/// are never comparable by id.
#[derive(Debug, Default, Clone)]
pub struct ScalarGraph {
    nodes: Vec<ScalarExprNode>,
    interner: FxHashMap<ScalarExprNode, ScalarExprId>,
}

impl ScalarGraph {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), interner: FxHashMap::default() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn intern(&mut self, node: ScalarExprNode) -> ScalarExprId {
        if let Some(&id) = self.interner.get(&node) {
            return id;
        }
        let id = ScalarExprId(self.nodes.len() as u32);
        self.interner.insert(node.clone(), id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: ScalarExprId) -> &ScalarExprNode {
        &self.nodes[id.index()]
    }

    pub fn op(&self, id: ScalarExprId) -> Op {
        self.node(id).op
    }

    pub fn dtype(&self, id: ScalarExprId) -> DType {
        self.node(id).dtype
    }

    pub fn sources(&self, id: ScalarExprId) -> &[ScalarExprId] {
        &self.node(id).sources
    }

    pub fn arg(&self, id: ScalarExprId) -> &ExprArg {
        &self.node(id).arg
    }

    // -- leaf constructors ------------------------------------------------

    pub fn konst(&mut self, dtype: DType, lit: Literal) -> Result<ScalarExprId, DtypeError> {
        if lit.dtype() != dtype {
            return Err(DtypeError::LiteralMismatch { literal: lit.dtype(), declared: dtype });
        }
        Ok(self.intern(ScalarExprNode {
            op: Op::Const,
            dtype,
            sources: SmallVec::new(),
            arg: ExprArg::Const(lit),
        }))
    }

    /// `dtype` is almost always `I32` for `Gidx`/`Ridx` (loop induction
    /// variables); `Acc`/`Elem` placeholders inside a reduction's `combine`
    /// expression carry the kernel's output dtype instead (see
    /// `SpecialKind`'s docs).
    pub fn special(&mut self, name: SpecialKind, bound: i64, dtype: DType) -> ScalarExprId {
        self.intern(ScalarExprNode {
            op: Op::Special,
            dtype,
            sources: SmallVec::new(),
            arg: ExprArg::Special { name, bound },
        })
    }

    pub fn global_index(&mut self, gid: u32, dtype: DType, index: ScalarExprId) -> ScalarExprId {
        self.intern(ScalarExprNode {
            op: Op::GlobalIndex,
            dtype,
            sources: SmallVec::from_slice(&[index]),
            arg: ExprArg::Global(gid),
        })
    }

    // -- binary arithmetic --------------------------------------------------

    fn binary_arith(
        &mut self,
        op: Op,
        a: ScalarExprId,
        b: ScalarExprId,
    ) -> Result<ScalarExprId, DtypeError> {
        let (da, db) = (self.dtype(a), self.dtype(b));
        if da != db {
            return Err(DtypeError::Mismatch { op: op_name(op), lhs: da, rhs: db });
        }
        Ok(self.intern(ScalarExprNode {
            op,
            dtype: da,
            sources: SmallVec::from_slice(&[a, b]),
            arg: ExprArg::None,
        }))
    }

    pub fn add(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.binary_arith(Op::Add, a, b)
    }
    pub fn sub(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.binary_arith(Op::Sub, a, b)
    }
    pub fn mul(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.binary_arith(Op::Mul, a, b)
    }
    pub fn idiv(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.binary_arith(Op::Idiv, a, b)
    }
    pub fn modulo(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.binary_arith(Op::Mod, a, b)
    }

    // -- comparison ---------------------------------------------------------

    fn compare(
        &mut self,
        op: Op,
        a: ScalarExprId,
        b: ScalarExprId,
    ) -> Result<ScalarExprId, DtypeError> {
        let (da, db) = (self.dtype(a), self.dtype(b));
        if da != db {
            return Err(DtypeError::Mismatch { op: op_name(op), lhs: da, rhs: db });
        }
        Ok(self.intern(ScalarExprNode {
            op,
            dtype: DType::Bool,
            sources: SmallVec::from_slice(&[a, b]),
            arg: ExprArg::None,
        }))
    }

    pub fn cmplt(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.compare(Op::CmpLt, a, b)
    }
    pub fn cmpne(&mut self, a: ScalarExprId, b: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.compare(Op::CmpNe, a, b)
    }

    // -- unary math -----------------------------------------------------------

    fn unary_float(&mut self, op: Op, x: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        let dx = self.dtype(x);
        if !dx.is_float() {
            return Err(DtypeError::NotFloat { op: op_name(op), found: dx });
        }
        Ok(self.intern(ScalarExprNode {
            op,
            dtype: dx,
            sources: SmallVec::from_slice(&[x]),
            arg: ExprArg::None,
        }))
    }

    pub fn sin(&mut self, x: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.unary_float(Op::Sin, x)
    }
    pub fn cos(&mut self, x: ScalarExprId) -> Result<ScalarExprId, DtypeError> {
        self.unary_float(Op::Cos, x)
    }

    // -- where ----------------------------------------------------------------

    pub fn where_(
        &mut self,
        cond: ScalarExprId,
        a: ScalarExprId,
        b: ScalarExprId,
    ) -> Result<ScalarExprId, DtypeError> {
        let dc = self.dtype(cond);
        if !dc.is_bool() {
            return Err(DtypeError::NotBool { op: "where", found: dc });
        }
        let (da, db) = (self.dtype(a), self.dtype(b));
        if da != db {
            return Err(DtypeError::Mismatch { op: "where", lhs: da, rhs: db });
        }
        Ok(self.intern(ScalarExprNode {
            op: Op::Where,
            dtype: da,
            sources: SmallVec::from_slice(&[cond, a, b]),
            arg: ExprArg::None,
        }))
    }
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::Add => "add",
        Op::Sub => "sub",
        Op::Mul => "mul",
        Op::Idiv => "idiv",
        Op::Mod => "mod",
        Op::CmpLt => "cmplt",
        Op::CmpNe => "cmpne",
        Op::Sin => "sin",
        Op::Cos => "cos",
        Op::Where => "where",
        Op::Const => "const",
        Op::Special => "special",
        Op::GlobalIndex => "global_index",
    }
}
