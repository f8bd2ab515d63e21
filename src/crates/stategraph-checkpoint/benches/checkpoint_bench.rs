use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use stategraph_checkpoint::{
    ChannelValues, Checkpoint, CheckpointSaver, InMemoryCheckpointSaver, SqliteCheckpointSaver,
};
use std::sync::atomic::{AtomicU64, Ordering};

fn sample_values() -> ChannelValues {
    let mut values = ChannelValues::new();
    let messages: Vec<_> = (0..20)
        .map(|i| json!({"role": "human", "content": format!("message {}", i)}))
        .collect();
    values.insert("messages".to_string(), json!(messages));
    values.insert("success_criteria_met".to_string(), json!(false));
    values
}

fn checkpoint_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = InMemoryCheckpointSaver::new();
    let step = AtomicU64::new(0);

    c.bench_function("memory checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let next = step.fetch_add(1, Ordering::Relaxed) + 1;
            let checkpoint = Checkpoint::new("bench-thread", next, sample_values(), None);
            saver.put(black_box(checkpoint)).await.unwrap();
        });
    });
}

fn checkpoint_load_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = InMemoryCheckpointSaver::new();
    runtime.block_on(async {
        for step in 1..=100 {
            let checkpoint = Checkpoint::new("bench-thread", step, sample_values(), None);
            saver.put(checkpoint).await.unwrap();
        }
    });

    c.bench_function("memory checkpoint load latest", |b| {
        b.to_async(&runtime).iter(|| async {
            saver.get_latest(black_box("bench-thread")).await.unwrap();
        });
    });
}

fn sqlite_save_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = runtime
        .block_on(SqliteCheckpointSaver::connect("sqlite::memory:"))
        .unwrap();
    let step = AtomicU64::new(0);

    c.bench_function("sqlite checkpoint save", |b| {
        b.to_async(&runtime).iter(|| async {
            let next = step.fetch_add(1, Ordering::Relaxed) + 1;
            let checkpoint = Checkpoint::new("bench-thread", next, sample_values(), None);
            saver.put(black_box(checkpoint)).await.unwrap();
        });
    });
}

criterion_group!(
    benches,
    checkpoint_save_benchmark,
    checkpoint_load_benchmark,
    sqlite_save_benchmark
);
criterion_main!(benches);
