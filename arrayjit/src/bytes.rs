//! Host-side byte encoding for constructors and `Array::to_host*` readers.
//!
//! The backend only ever moves opaque bytes (§4.5); turning those bytes
//! into typed host data, or a typed host value into buffer bytes, is the
//! array layer's job.

use arrayjit_core::dtype::{DType, Literal};

pub(crate) fn encode_literal(lit: Literal, out: &mut Vec<u8>) {
    match lit {
        Literal::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Literal::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Literal::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Literal::Bool(v) => out.push(v as u8),
        #[cfg(feature = "f16")]
        Literal::F16(v) => out.extend_from_slice(&v.to_le_bytes()),
    }
}

pub(crate) fn decode_literal(dtype: DType, bytes: &[u8]) -> Literal {
    match dtype {
        DType::I32 => Literal::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
        DType::U32 => Literal::U32(u32::from_le_bytes(bytes.try_into().unwrap())),
        DType::F32 => Literal::F32(f32::from_le_bytes(bytes.try_into().unwrap())),
        DType::Bool => Literal::Bool(bytes[0] != 0),
        #[cfg(feature = "f16")]
        DType::F16 => Literal::F16(half::f16::from_le_bytes(bytes.try_into().unwrap())),
    }
}

/// Repeats `lit`'s encoding `count` times, for `full`/`zeros`/`ones`
/// constructors.
pub(crate) fn repeat_literal_bytes(lit: Literal, count: usize) -> Vec<u8> {
    let mut one = Vec::with_capacity(lit.dtype().size_bytes());
    encode_literal(lit, &mut one);
    one.repeat(count)
}

pub(crate) fn f32_vec_to_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn i32_vec_to_bytes(data: &[i32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes(c.try_into().unwrap())).collect()
}

pub(crate) fn bytes_to_i32_vec(bytes: &[u8]) -> Vec<i32> {
    bytes.chunks_exact(4).map(|c| i32::from_le_bytes(c.try_into().unwrap())).collect()
}

pub(crate) fn bytes_to_u32_vec(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|c| u32::from_le_bytes(c.try_into().unwrap())).collect()
}

pub(crate) fn bytes_to_bool_vec(bytes: &[u8]) -> Vec<bool> {
    bytes.iter().map(|&b| b != 0).collect()
}
