//! Benchmarks `simplify`'s cost on a chain of pointwise scalar nodes, the
//! shape of expression it runs over inside `Array::contiguous` and every
//! jit-fused pointwise cluster.

use arrayjit_core::dtype::{DType, Literal};
use arrayjit_core::scalar_expr::{simplify, ScalarExprId, ScalarGraph, SpecialKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn build_chain(graph: &mut ScalarGraph, depth: usize) -> ScalarExprId {
    let idx = graph.special(SpecialKind::Gidx, 1024, DType::I32);
    let mut node = graph.global_index(0, DType::F32, idx);
    let one = graph.konst(DType::F32, Literal::F32(1.0)).unwrap();
    for _ in 0..depth {
        node = graph.add(node, one).unwrap();
        node = graph.mul(node, one).unwrap();
    }
    node
}

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplify_chain");
    for depth in [8usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| {
                let mut graph = ScalarGraph::new();
                let root = build_chain(&mut graph, depth);
                black_box(simplify(&mut graph, root))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_simplify);
criterion_main!(benches);
