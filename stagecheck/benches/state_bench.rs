//! Benchmarks for persisted state.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stagecheck::state::{FileStateStore, StageState, StateStore};
use std::sync::Arc;

fn state_benchmark(c: &mut Criterion) {
    let Ok(dir) = tempfile::TempDir::new() else {
        return;
    };
    let state = StageState::new(Arc::new(FileStateStore::new()), dir.path());

    c.bench_function("save_string", |b| {
        b.iter(|| state.save_string("AmiId", black_box("ami-0feed")))
    });

    c.bench_function("load_string", |b| {
        let _ = state.save_string("AmiId", "ami-0feed");
        b.iter(|| black_box(state.load_string("AmiId")))
    });

    let store = FileStateStore::new();
    c.bench_function("exists_missing", |b| {
        b.iter(|| black_box(store.exists(dir.path(), "Missing")))
    });
}

criterion_group!(benches, state_benchmark);
criterion_main!(benches);
