use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rgmatrix::{
    DenseVector, DirectedGraph, PowerConfig, ReducedMatrixBuilder, SelectedNodes,
    SpectralProjector,
};

fn random_graph(nodes: usize, out_degree: usize, seed: u64) -> DirectedGraph {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut edges = Vec::with_capacity(nodes * out_degree);
    for from in 0..nodes {
        if rng.gen_bool(0.05) {
            continue;
        }
        for _ in 0..out_degree {
            let to = rng.gen_range(0..nodes);
            if to != from {
                edges.push((from, to));
            }
        }
    }
    DirectedGraph::from_sorted_edges(nodes, &edges).expect("random graph")
}

fn bench_reduction(c: &mut Criterion) {
    let graph = random_graph(20_000, 8, 42);
    let selection =
        SelectedNodes::new((0..20).map(|i| i * 997).collect(), graph.node_count())
            .expect("selection");
    let config = PowerConfig::default();

    let input = DenseVector::filled(graph.node_count(), 1.0 / graph.node_count() as f64);
    let mut output = DenseVector::zeros(graph.node_count());
    c.bench_function("multiply_20k", |b| {
        b.iter(|| {
            graph
                .multiply(black_box(0.15), &mut output, &input, true)
                .expect("multiply")
        })
    });
    c.bench_function("multiply_transpose_20k", |b| {
        b.iter(|| {
            graph
                .multiply_transpose(black_box(0.15), &mut output, &input, true)
                .expect("multiply")
        })
    });

    let projector = SpectralProjector::new(&graph, config);
    let mut group = c.benchmark_group("spectral");
    group.sample_size(10);
    group.bench_function("projection_20k", |b| {
        b.iter(|| projector.compute(black_box(&selection)).expect("projection"))
    });
    group.finish();

    let spectral = projector.compute(&selection).expect("projection");
    let builder =
        ReducedMatrixBuilder::new(&graph, &spectral, &selection, config).expect("builder");
    let mut scratch = builder.scratch();
    let mut group = c.benchmark_group("resolvent");
    group.sample_size(10);
    group.bench_function("column_20k", |b| {
        b.iter(|| {
            builder
                .compute_column(black_box(0), &mut scratch)
                .expect("column")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_reduction);
criterion_main!(benches);
