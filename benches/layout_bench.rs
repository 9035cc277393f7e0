use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use glassbox::domain::capture::{CapturedItem, Dependency};
use glassbox::domain::graph::{build_graph, expand_dependency_edges, prune_graph, PrunePolicy};
use glassbox::domain::layout::LayoutSolver;
use glassbox::domain::value::{HostObject, RawValue};

/// A capture log shaped like a render loop: one chain of parents with a
/// dependency back to an early node every few items.
fn synthetic_items(count: usize) -> Vec<CapturedItem> {
    (0..count)
        .map(|index| CapturedItem {
            id: index.to_string(),
            parent_id: (index > 0).then(|| (index - 1).to_string()),
            value: RawValue::Object(HostObject::new("Item")),
            ephemeral: index % 2 == 1,
            dependencies: if index % 5 == 4 {
                vec![Dependency::tracked((index / 5).to_string())]
            } else {
                Vec::new()
            },
            call_chain: format!(".step{}", index),
        })
        .collect()
}

fn bench_graph_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_pipeline");
    for size in [50usize, 200, 1000] {
        let items = synthetic_items(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| {
                let mut graph = build_graph(items);
                prune_graph(&mut graph, PrunePolicy::Functions);
                expand_dependency_edges(&mut graph);
                graph.node_count()
            })
        });
    }
    group.finish();
}

fn bench_layout_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout_solve");
    for size in [50usize, 200, 1000] {
        let items = synthetic_items(size);
        let mut graph = build_graph(&items);
        expand_dependency_edges(&mut graph);
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| {
                let mut solver = LayoutSolver::new();
                solver.add_boxes(graph.node_ids().map(str::to_string));
                solver.add_edge_constraints(graph.edges());
                solver.solve();
                solver.boxes().len()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_graph_pipeline, bench_layout_solve);
criterion_main!(benches);
