//! # Staging Benchmarks
//!
//! Performance benchmarks for traversal and build planning.
//!
//! Run with: `cargo bench -p stagekit-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use stagekit_core::{
    Artifact, Build, EdgeKind, LocationPolicy, MainTargetDecl, ProjectDecl, ProjectModel,
    PropertySet, StageDecl, TargetGraph, TargetId, Traversal, TypeFilter, TypeRegistry,
};
use std::collections::BTreeSet;
use std::hint::black_box;
use std::path::{Path, PathBuf};

/// A chain of libraries, each depending on the previous one.
fn create_chain_graph(size: usize) -> (TargetGraph, TargetId) {
    let mut graph = TargetGraph::new();
    let mut prev = None;
    let mut last = TargetId(0);

    for i in 0..size {
        let name = format!("l{i}");
        let id = graph
            .insert(
                &name,
                Path::new("/ws"),
                "SHARED_LIB",
                PropertySet::new(),
                Artifact::new(format!("/ws/bin/debug/{name}.so"), name.as_str(), Some("so".to_string())),
            )
            .expect("insert");
        if let Some(prev) = prev {
            graph
                .add_edge(id, prev, EdgeKind::Dependency)
                .expect("edge");
        }
        prev = Some(id);
        last = id;
    }

    (graph, last)
}

/// One project with `size` chained libraries and a traversing stage.
fn create_chain_model(size: usize) -> ProjectModel {
    let mut root = ProjectDecl::new("/ws");
    for i in 0..size {
        let requirements = if i == 0 {
            Vec::new()
        } else {
            vec![format!("<dependency>l{}", i - 1)]
        };
        root.targets.push(MainTargetDecl {
            rule: "lib".to_string(),
            name: format!("l{i}"),
            sources: Vec::new(),
            requirements,
        });
    }
    root.stages.push(StageDecl {
        name: "dist".to_string(),
        sources: vec![format!("l{}", size - 1)],
        requirements: vec![
            "<traverse-dependencies>on".to_string(),
            "<include-type>LIB".to_string(),
        ],
    });
    let mut model = ProjectModel::new("/ws");
    model.add_project(root);
    model
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");
    let types = TypeRegistry::new();
    let filter = TypeFilter::new(["LIB"]);

    for size in [100, 1000, 10000].iter() {
        let (graph, root) = create_chain_graph(*size);
        let traversal = Traversal {
            enabled: true,
            filter: &filter,
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), &root, |b, root| {
            b.iter(|| black_box(traversal.collect(&graph, &types, &[*root])));
        });
    }

    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let types = TypeRegistry::new();
    let locator: BTreeSet<PathBuf> = BTreeSet::new();

    for size in [100, 500, 1000].iter() {
        let model = create_chain_model(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &model, |b, model| {
            b.iter(|| {
                let request = PropertySet::parse(["<target-os>linux"]).expect("request");
                let build = Build::new(model, &types, request, &locator, LocationPolicy::default())
                    .expect("build");
                black_box(build.plan(&["dist"], Path::new("/ws")))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_traversal, bench_plan);
criterion_main!(benches);
