//! Tree flattening (§4.1 "Tree flattening"): the public API accepts
//! arbitrarily nested structures of arrays. A call flattens its inputs to a
//! leaf list plus a `TreeDef`, runs the flat core, then unflattens outputs
//! by the recorded structure.

use arrayjit_backend::Backend;

use crate::array::Array;
use crate::errors::TreeMismatchError;

/// The shape of a nested argument structure, leaves erased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDef {
    Leaf,
    Tuple(Vec<TreeDef>),
    List(Vec<TreeDef>),
}

impl TreeDef {
    fn describe(&self) -> String {
        match self {
            TreeDef::Leaf => "leaf".to_string(),
            TreeDef::Tuple(items) => format!("tuple[{}]", items.len()),
            TreeDef::List(items) => format!("list[{}]", items.len()),
        }
    }
}

/// Checks that `lhs` and `rhs` have the same tree shape, e.g. a function's
/// `primals` against its `tangents` (§4.1). `lhs_path`/`rhs_path` name the
/// two structures in the resulting error.
pub fn assert_same_tree(
    lhs: &TreeDef,
    rhs: &TreeDef,
    lhs_path: &str,
    rhs_path: &str,
) -> Result<(), TreeMismatchError> {
    let matches = match (lhs, rhs) {
        (TreeDef::Leaf, TreeDef::Leaf) => true,
        (TreeDef::Tuple(a), TreeDef::Tuple(b)) => a.len() == b.len(),
        (TreeDef::List(a), TreeDef::List(b)) => a.len() == b.len(),
        _ => false,
    };
    if matches {
        return Ok(());
    }
    Err(TreeMismatchError {
        lhs_path: lhs_path.to_string(),
        rhs_path: rhs_path.to_string(),
        lhs_desc: lhs.describe(),
        rhs_desc: rhs.describe(),
    })
}

/// Flattens a nested argument structure to its leaves plus a `TreeDef`, and
/// rebuilds one from a leaf list.
pub trait Flatten<B: Backend>: Sized {
    fn flatten(&self) -> (Vec<Array<B>>, TreeDef);
    fn unflatten(leaves: &mut dyn Iterator<Item = Array<B>>, tree: &TreeDef) -> Self;
}

impl<B: Backend> Flatten<B> for Array<B> {
    fn flatten(&self) -> (Vec<Array<B>>, TreeDef) {
        (vec![self.clone()], TreeDef::Leaf)
    }

    fn unflatten(leaves: &mut dyn Iterator<Item = Array<B>>, tree: &TreeDef) -> Self {
        debug_assert_eq!(*tree, TreeDef::Leaf);
        leaves.next().expect("tree leaf count matches flatten output")
    }
}

impl<B: Backend> Flatten<B> for Vec<Array<B>> {
    fn flatten(&self) -> (Vec<Array<B>>, TreeDef) {
        let cloned: Vec<Array<B>> = self.iter().map(Array::clone).collect();
        let tree = TreeDef::List(vec![TreeDef::Leaf; self.len()]);
        (cloned, tree)
    }

    fn unflatten(leaves: &mut dyn Iterator<Item = Array<B>>, tree: &TreeDef) -> Self {
        match tree {
            TreeDef::List(items) => items.iter().map(|_| leaves.next().expect("leaf count matches")).collect(),
            other => panic!("expected a list tree, found {other:?}"),
        }
    }
}

impl<B: Backend> Flatten<B> for (Array<B>, Array<B>) {
    fn flatten(&self) -> (Vec<Array<B>>, TreeDef) {
        (vec![self.0.clone(), self.1.clone()], TreeDef::Tuple(vec![TreeDef::Leaf, TreeDef::Leaf]))
    }

    fn unflatten(leaves: &mut dyn Iterator<Item = Array<B>>, tree: &TreeDef) -> Self {
        match tree {
            TreeDef::Tuple(items) if items.len() == 2 => {
                (leaves.next().expect("first leaf"), leaves.next().expect("second leaf"))
            }
            other => panic!("expected a 2-tuple tree, found {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrayjit_backend::CpuBackend;

    #[test]
    fn leaf_roundtrips() {
        let a = Array::<CpuBackend>::cpu_zeros(&[2], arrayjit_core::dtype::DType::F32).unwrap();
        let (leaves, tree) = a.flatten();
        assert_eq!(tree, TreeDef::Leaf);
        let mut it = leaves.into_iter();
        let _ = Array::<CpuBackend>::unflatten(&mut it, &tree);
    }

    #[test]
    fn mismatched_list_lengths_report_tree_mismatch() {
        let a = TreeDef::List(vec![TreeDef::Leaf; 2]);
        let b = TreeDef::List(vec![TreeDef::Leaf; 3]);
        let err = assert_same_tree(&a, &b, "primals", "tangents").unwrap_err();
        assert_eq!(err.lhs_path, "primals");
        assert_eq!(err.rhs_path, "tangents");
    }
}
