//! Benchmarks for airtree tree operations

use std::sync::Arc;

use airtree::{Config, MemoryBackend, Session, StorageClient};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const ENTRIES: u64 = 10_000;

fn client() -> Arc<StorageClient> {
    let config = Config::builder().key_size(8).build();
    Arc::new(StorageClient::with_backend(&config, Arc::new(MemoryBackend::new())).unwrap())
}

fn populated(storage: Arc<StorageClient>) -> Session {
    let layout = Config::default().layout().unwrap();
    let mut session = Session::open(storage, layout, None);
    for i in 0..ENTRIES {
        session.put(&i.to_be_bytes(), i.to_string().as_bytes()).unwrap();
    }
    session
}

fn tree_benchmarks(c: &mut Criterion) {
    c.bench_function("sequential put 10k", |b| {
        b.iter_batched(client, populated, BatchSize::SmallInput)
    });

    c.bench_function("commit 10k", |b| {
        b.iter_batched(
            || populated(client()),
            |mut session| session.commit().unwrap(),
            BatchSize::SmallInput,
        )
    });

    let storage = client();
    let root = populated(Arc::clone(&storage)).commit().unwrap();
    let session = Session::open(storage, Config::default().layout().unwrap(), Some(root));
    let mut i = 0u64;
    c.bench_function("cached get", |b| {
        b.iter(|| {
            i = (i + 7919) % ENTRIES;
            session.get(&i.to_be_bytes()).unwrap()
        })
    });
}

criterion_group!(benches, tree_benchmarks);
criterion_main!(benches);
