//! 1-D convolution (§6 `conv1d`), composed from `pad`/`slice`/`mul`/`add`
//! the same way `Array::concat` composes `pad`/`add` — no dedicated
//! convolution primitive exists in §4.1.

use std::sync::Arc;

use arrayjit_backend::CpuBackend;

use crate::array::Array;
use crate::errors::ArrayError;

/// Cross-correlates a rank-1 `x` with a small constant `kernel` at unit
/// stride under `SAME` padding (output length equals `x`'s length): pads
/// `x` by `kernel.len() - 1` split as evenly as possible between the two
/// ends, then for each tap slides a length-`x.len()` window over the
/// padded array, scales it, and accumulates.
pub fn conv1d_same(x: &Array, kernel: &[f32], backend: &Arc<CpuBackend>) -> Result<Array, ArrayError> {
    let n = x.shape()[0];
    let k = kernel.len() as i64;
    let pad_total = k - 1;
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let padded = x.pad(&[(pad_left, pad_right)])?;

    let mut acc: Option<Array> = None;
    for (tap, &w) in kernel.iter().enumerate() {
        let tap = tap as i64;
        let window = padded.slice(&[(tap, tap + n)])?;
        let scalar = Array::from_vec_f32(&[], &[w], backend)?.broadcast_to(&[n])?;
        let scaled = window.mul(&scalar)?;
        acc = Some(match acc {
            None => scaled,
            Some(running) => running.add(&scaled)?,
        });
    }
    Ok(acc.expect("kernel has at least one tap"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device;

    #[test]
    fn matches_worked_example() {
        let backend = device::cpu_backend();
        let x = Array::from_vec_f32(&[5], &[1.0, 2.0, 3.0, 4.0, 5.0], &backend).unwrap();
        let out = conv1d_same(&x, &[2.0, 0.5, -1.0], &backend).unwrap();
        let got = out.to_vec_f32().unwrap();
        let want = [-1.5, 0.0, 1.5, 3.0, 10.5];
        for (g, w) in got.iter().zip(want.iter()) {
            assert!((g - w).abs() < 1e-5, "{g} vs {w}");
        }
    }
}
