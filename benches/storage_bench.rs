use a3s_graph::storage::vector::cosine_similarity;
use a3s_graph::storage::{store_material_graph, InMemoryStorageAdapter};
use a3s_graph::{Node, StorageAdapter};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn material(id: &str, chunks: u32) -> Vec<Node> {
    (0..chunks)
        .map(|i| {
            let node = Node::new("bench", id, i, format!("chunk {} of {}", i, id));
            if i + 1 < chunks {
                node.relate_to(i + 1, "next", 1.0)
            } else {
                node
            }
        })
        .collect()
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let dim = 1536;
    let a: Vec<f32> = (0..dim).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..dim).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_1536d", |bencher| {
        bencher.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
}

fn bench_memory_batch_write(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("memory_store_material_graph_500", |bencher| {
        bencher.iter_batched(
            || (InMemoryStorageAdapter::new(), material("m", 500)),
            |(adapter, nodes)| {
                rt.block_on(async {
                    black_box(store_material_graph(&adapter, nodes).await.unwrap());
                })
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_memory_search(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dim = 384;
    let nodes: Vec<Node> = (0..5000u32)
        .map(|j| {
            let mut node = Node::new("bench", format!("m{}", j / 100), j % 100, "text");
            node.embedding = Some((0..dim).map(|i| ((i + j as usize) as f32).cos()).collect());
            node
        })
        .collect();
    let adapter = InMemoryStorageAdapter::new();
    rt.block_on(adapter.store_batch_nodes(nodes)).unwrap();
    let query: Vec<f32> = (0..dim).map(|i| (i as f32).sin()).collect();

    c.bench_function("memory_search_5k_top10", |bencher| {
        bencher.iter(|| rt.block_on(adapter.search(black_box(&query), 10)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_memory_batch_write,
    bench_memory_search
);
criterion_main!(benches);
