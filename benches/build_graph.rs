use callgraph_explorer::graph::{BuildConfig, GraphBuilder, ResolveStrategy};
use callgraph_explorer::utils::file_walker::python_files;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::path::Path;

/// A chain of modules where each one imports and calls the next.
fn generate_project(root: &Path, modules: usize) {
    for i in 0..modules {
        let next = (i + 1) % modules;
        let body = format!(
            "import mod{next}\n\n\nclass Worker{i}:\n    def run(self):\n        return self.step()\n\n    def step(self):\n        return mod{next}.entry()\n\n\ndef entry():\n    w = Worker{i}()\n    return w.run()\n"
        );
        fs::write(root.join(format!("mod{i}.py")), body).expect("write module");
    }
}

fn bench_build_graph(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    generate_project(dir.path(), 200);
    let files = python_files(dir.path(), false);

    let mut group = c.benchmark_group("build_graph");
    for strategy in [ResolveStrategy::Semantic, ResolveStrategy::Heuristic] {
        let config = BuildConfig { strategy, ..BuildConfig::default() };
        group.bench_function(BenchmarkId::new("build", strategy.to_string()), |b| {
            b.iter(|| {
                let graph = GraphBuilder::new(config).build(black_box(dir.path()), &files).expect("build graph");
                black_box(graph.edges.len())
            })
        });
    }
    group.finish();
}

criterion_group!(name = benches; config = Criterion::default().sample_size(20); targets = bench_build_graph);
criterion_main!(benches);
