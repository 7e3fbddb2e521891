//! Linear algebra built from the shape/reduction surface (§6 "dot, matmul,
//! eye, einsum"): no dedicated contraction primitive exists in §4.1, so
//! every operation here composes `reshape`/`broadcast_to`/`mul`/`sum`, the
//! same "derive it from primitives" approach `Array::concat`/`stack` use.

use std::sync::Arc;

use arrayjit_backend::CpuBackend;

use crate::array::Array;
use crate::device;
use crate::errors::ArrayError;

/// Inner product of two rank-1 arrays of equal length (§6 `dot`, vector case).
pub fn dot(a: &Array, b: &Array) -> Result<Array, ArrayError> {
    a.mul(b)?.sum(None, false)
}

/// `a @ b` for rank-2 arrays (§6 `matmul`): `[m,k] x [k,n] -> [m,n]`, via
/// `reshape` to `[m,k,1]`/`[1,k,n]`, an elementwise `mul` that broadcasts to
/// `[m,k,n]`, and a `sum` over the contracted axis.
pub fn matmul(a: &Array, b: &Array) -> Result<Array, ArrayError> {
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let (k2, n) = (b.shape()[0], b.shape()[1]);
    debug_assert_eq!(k, k2, "matmul contraction dimensions must agree");
    let a3 = a.reshape(&[m, k, 1])?;
    let b3 = b.reshape(&[1, k, n])?;
    let prod = a3.mul(&b3)?;
    prod.sum(Some(&[1]), false)
}

/// The `n x n` identity matrix (§6 `eye`).
pub fn eye(n: i64, backend: &Arc<CpuBackend>) -> Result<Array, ArrayError> {
    let mut data = vec![0f32; (n * n) as usize];
    for i in 0..n {
        data[(i * n + i) as usize] = 1.0;
    }
    Array::from_vec_f32(&[n, n], &data, backend)
}

pub fn eye_default(n: i64) -> Result<Array, ArrayError> {
    eye(n, &device::cpu_backend())
}

/// A planned einsum contraction order (§6 `einsum`): a sequence of pairwise
/// contractions, each naming the two atom ids being contracted (original
/// operands are ids `0..num_operands`, every contraction's result gets the
/// next id in sequence, so the final pair always produces the last atom),
/// plus the total multiply-add count across the whole contraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EinsumPlan {
    pub path: Vec<(usize, usize)>,
    pub flops: u64,
}

/// Parses `"ij,jk,kl->il"` into (per-operand label lists, output labels).
fn parse_subscripts(subscripts: &str) -> (Vec<Vec<char>>, Vec<char>) {
    let (lhs, rhs) = subscripts.split_once("->").expect("einsum subscripts must have an explicit '->'");
    let inputs = lhs.split(',').map(|s| s.chars().collect()).collect();
    let output = rhs.chars().collect();
    (inputs, output)
}

/// Greedily picks the locally cheapest pairwise contraction at each step
/// (not a true optimal/exhaustive search over all orderings — a documented
/// simplification of numpy's `einsum_path(optimize='optimal')`, exact for
/// the two- and three-operand chains this crate composes internally).
pub fn einsum_path(subscripts: &str, shapes: &[Vec<i64>]) -> EinsumPlan {
    let (inputs, output) = parse_subscripts(subscripts);
    assert_eq!(inputs.len(), shapes.len(), "one shape per einsum operand");

    let mut sizes = std::collections::HashMap::new();
    for (labels, shape) in inputs.iter().zip(shapes) {
        for (&c, &dim) in labels.iter().zip(shape) {
            sizes.insert(c, dim);
        }
    }

    let mut operands: Vec<(usize, Vec<char>)> = inputs.into_iter().enumerate().collect();
    let mut next_id = operands.len();
    let mut path = Vec::new();
    let mut total_flops: u64 = 0;

    while operands.len() > 1 {
        let mut best: Option<(usize, usize, u64, Vec<char>)> = None;
        for i in 0..operands.len() {
            for j in (i + 1)..operands.len() {
                let mut union: Vec<char> = operands[i].1.iter().chain(&operands[j].1).copied().collect();
                union.sort_unstable();
                union.dedup();
                let flops = 2 * union.iter().map(|c| sizes[c] as u64).product::<u64>();

                let others: Vec<&Vec<char>> =
                    operands.iter().enumerate().filter(|(idx, _)| *idx != i && *idx != j).map(|(_, o)| &o.1).collect();
                let result_labels: Vec<char> = union
                    .into_iter()
                    .filter(|c| output.contains(c) || others.iter().any(|labs| labs.contains(c)))
                    .collect();

                if best.as_ref().map(|b| flops < b.2).unwrap_or(true) {
                    best = Some((i, j, flops, result_labels));
                }
            }
        }
        let (i, j, flops, result_labels) = best.expect("at least one pair when operands.len() > 1");
        total_flops += flops;
        path.push((operands[i].0, operands[j].0));
        let new_id = next_id;
        next_id += 1;
        operands.remove(j);
        operands.remove(i);
        operands.push((new_id, result_labels));
    }

    EinsumPlan { path, flops: total_flops }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_matches_hand_computed_product() {
        let a = Array::cpu_from_vec_f32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Array::cpu_from_vec_f32(&[2, 2], &[5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = matmul(&a, &b).unwrap();
        assert_eq!(c.to_vec_f32().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn eye_is_identity_under_matmul() {
        let a = Array::cpu_from_vec_f32(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let id = eye_default(2).unwrap();
        let out = matmul(&a, &id).unwrap();
        assert_eq!(out.to_vec_f32().unwrap(), a.to_vec_f32().unwrap());
    }

    #[test]
    fn three_matrix_chain_picks_cheapest_pairing_first() {
        let plan = einsum_path("ij,jk,kl->il", &[vec![10, 20], vec![20, 30], vec![30, 40]]);
        assert_eq!(plan.path, vec![(0, 1), (2, 3)]);
        assert_eq!(plan.flops, 2 * (10 * 30 * 20 + 10 * 40 * 30));
    }
}
