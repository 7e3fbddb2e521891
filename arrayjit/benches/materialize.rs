//! Benchmarks end-to-end materialization cost: an eager elementwise chain
//! (one dispatched kernel per op), a reduction, and the same chain behind
//! `jit` (one fused kernel), across a few array sizes.

use arrayjit::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn eager_chain(x: &Array, y: &Array) -> Array {
    let a = x.add(y).unwrap();
    let b = a.mul(x).unwrap();
    b.sin().unwrap()
}

fn bench_eager_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("eager_chain");
    for &n in &[64i64, 4096, 65536] {
        let x = Array::cpu_from_vec_f32(&[n], &vec![0.5f32; n as usize]).unwrap();
        let y = Array::cpu_from_vec_f32(&[n], &vec![1.5f32; n as usize]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(eager_chain(&x, &y)));
        });
    }
    group.finish();
}

fn bench_reduction(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_sum");
    for &n in &[64i64, 4096, 65536] {
        let x = Array::cpu_from_vec_f32(&[n], &vec![0.5f32; n as usize]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(x.sum(None, false).unwrap()));
        });
    }
    group.finish();
}

fn bench_jit_fused_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("jit_chain");
    for &n in &[64i64, 4096, 65536] {
        let x = Array::cpu_from_vec_f32(&[n], &vec![0.5f32; n as usize]).unwrap();
        let y = Array::cpu_from_vec_f32(&[n], &vec![1.5f32; n as usize]).unwrap();
        let compiled = jit(|args| {
            let a = args[0].add(&args[1])?;
            let b = a.mul(&args[0])?;
            Ok(vec![b.sin()])
        });
        // Warm the cache with one call before timing steady-state reuse.
        compiled(&[x.clone(), y.clone()]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(compiled(&[x.clone(), y.clone()]).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_eager_chain, bench_reduction, bench_jit_fused_chain);
criterion_main!(benches);
