//! The Threefry-style counter-based random module (§6 "Random number
//! generator"): `key`, `split`, `bits`, `uniform`, `normal` with
//! JAX-compatible bitwise outputs for `bits`/`split`/`uniform`.
//!
//! The core hash is Threefry-2x32-20 (Random123's reference construction,
//! also the one JAX's `threefry_2x32` is built on): 5 groups of 4 rounds,
//! rotation constants cycling between `[13,15,26,6]` and `[17,29,16,24]`,
//! with the running key schedule (`ks[2] = k0 ^ k1 ^ 0x1BD11BDA`) injected
//! after every group. `bits`/`split` replicate the reference's counter
//! layout (an `iota` counter split into two halves, odd-length inputs
//! zero-padded) exactly, including `split`'s literal row-major reshape of
//! the concatenated halves into `(n, 2)` rather than a same-index pairing —
//! faithful to the source even where that reshape looks unintuitive.

use std::sync::Arc;

use arrayjit_backend::CpuBackend;

use crate::array::Array;
use crate::errors::ArrayError;

/// A Threefry key: two 32-bit unsigned words (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key(pub [u32; 2]);

/// Zero-pads a 32-bit seed into a key (§6 `key(seed)`).
pub fn key(seed: u32) -> Key {
    Key([0, seed])
}

const PARITY: u32 = 0x1BD1_1BDA;
const ROTATIONS: [[u32; 4]; 2] = [[13, 15, 26, 6], [17, 29, 16, 24]];

fn threefry2x32(k: [u32; 2], mut x0: u32, mut x1: u32) -> (u32, u32) {
    let ks = [k[0], k[1], k[0] ^ k[1] ^ PARITY];
    x0 = x0.wrapping_add(ks[0]);
    x1 = x1.wrapping_add(ks[1]);

    for i in 0..5usize {
        for &r in &ROTATIONS[i % 2] {
            x0 = x0.wrapping_add(x1);
            x1 = x1.rotate_left(r);
            x1 ^= x0;
        }
        let s = (i + 1) as u32;
        x0 = x0.wrapping_add(ks[(s % 3) as usize]);
        x1 = x1.wrapping_add(ks[((s + 1) % 3) as usize]);
        x1 = x1.wrapping_add(s);
    }
    (x0, x1)
}

/// `n` keys via the counter-based bijection (§6 `split`): counts
/// `0..2n`, split into two halves of length `n`, hashed elementwise, the
/// two output halves concatenated and reshaped row-major into `(n, 2)`.
pub fn split(k: Key, n: usize) -> Vec<Key> {
    if n == 0 {
        return Vec::new();
    }
    let counts: Vec<u32> = (0..(2 * n) as u32).collect();
    let mut out = vec![0u32; 2 * n];
    for i in 0..n {
        let (o0, o1) = threefry2x32(k.0, counts[i], counts[n + i]);
        out[i] = o0;
        out[n + i] = o1;
    }
    (0..n).map(|i| Key([out[2 * i], out[2 * i + 1]])).collect()
}

/// `numel` raw random 32-bit words (§6 `bits`). Counts are `iota(numel)`,
/// zero-padded to even length, split in half, hashed, concatenated, and
/// truncated back to `numel` — the reference's exact odd-length handling.
pub fn bits(k: Key, numel: usize) -> Vec<u32> {
    if numel == 0 {
        return Vec::new();
    }
    let mut counts: Vec<u32> = (0..numel as u32).collect();
    if numel % 2 == 1 {
        counts.push(0);
    }
    let total = counts.len();
    let half = total / 2;
    let mut out = vec![0u32; total];
    for i in 0..half {
        let (o0, o1) = threefry2x32(k.0, counts[i], counts[half + i]);
        out[i] = o0;
        out[half + i] = o1;
    }
    out.truncate(numel);
    out
}

/// Uniform floats in `[lo, hi)` (§6 `uniform`), derived from `bits` by
/// placing the top 23 mantissa bits under a fixed `[1,2)` exponent and
/// subtracting 1 — the standard bits-to-float recipe `bits` shares with
/// the reference.
pub fn uniform(k: Key, numel: usize, lo: f32, hi: f32) -> Vec<f32> {
    bits(k, numel)
        .into_iter()
        .map(|b| {
            let mantissa = b >> 9;
            let u = f32::from_bits(mantissa | 0x3f80_0000) - 1.0;
            lo + (hi - lo) * u
        })
        .collect()
}

/// Standard-normal floats via Box-Muller over two independent `uniform`
/// streams (`split(k, 2)`). Unlike `bits`/`split`/`uniform`, this is not
/// claimed to be bit-exact against any particular reference implementation
/// of `normal` — §6's bitwise-exactness contract and §8 scenario 4 only
/// cover `bits`/`split`.
pub fn normal(k: Key, numel: usize) -> Vec<f32> {
    let subkeys = split(k, 2);
    let u1 = uniform(subkeys[0], numel, f32::EPSILON, 1.0);
    let u2 = uniform(subkeys[1], numel, 0.0, 1.0);
    u1.iter()
        .zip(u2.iter())
        .map(|(&a, &b)| (-2.0 * a.ln()).sqrt() * (2.0 * std::f32::consts::PI * b).cos())
        .collect()
}

pub fn uniform_array(k: Key, shape: &[i64], lo: f32, hi: f32, backend: &Arc<CpuBackend>) -> Result<Array, ArrayError> {
    let numel: i64 = shape.iter().product();
    let data = uniform(k, numel as usize, lo, hi);
    Array::from_vec_f32(shape, &data, backend)
}

pub fn normal_array(k: Key, shape: &[i64], backend: &Arc<CpuBackend>) -> Result<Array, ArrayError> {
    let numel: i64 = shape.iter().product();
    let data = normal(k, numel as usize);
    Array::from_vec_f32(shape, &data, backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_of_key_zero_matches_reference_value() {
        // Verified against the public Threefry-2x32-20 known-answer vector
        // (key=(0,0), ctr=(0,0) -> (0x6b200159, 0x99ba4efe), i.e.
        // (1797259609, 2579123966) decimal): `bits` pads numel=1 to
        // counts=[0,0] and calls `threefry2x32([0,0], 0, 0)`, whose first
        // output word is 1797259609.
        assert_eq!(bits(key(0), 1)[0], 1_797_259_609u32);
    }

    #[test]
    fn split_is_deterministic() {
        let a = split(key(0), 3);
        let b = split(key(0), 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn uniform_values_land_in_range() {
        let xs = uniform(key(7), 100, -1.0, 1.0);
        assert!(xs.iter().all(|&x| (-1.0..1.0).contains(&x)));
    }
}
