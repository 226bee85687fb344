//! Record-manager benchmarks: insert, read, and update paths.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xxl_bench::random_records;
use xxl_storage::container::MemoryContainer;
use xxl_storage::manager::RecordManager;
use xxl_storage::strategy::FirstFitStrategy;
use xxl_storage::tid_manager::DirectTidManager;

const PAGE_SIZE: usize = 4096;

fn new_manager() -> RecordManager<MemoryContainer> {
    RecordManager::new(
        MemoryContainer::new(PAGE_SIZE),
        PAGE_SIZE,
        Box::new(FirstFitStrategy::new()),
        Box::new(DirectTidManager::new()),
        4,
    )
    .unwrap()
}

fn bench_insert(c: &mut Criterion) {
    let records = random_records(1_000, 32, 256, 11);
    c.bench_function("storage/insert_1k", |b| {
        b.iter(|| {
            let mut manager = new_manager();
            for record in &records {
                black_box(manager.insert(record).unwrap());
            }
        });
    });
}

fn bench_get(c: &mut Criterion) {
    let records = random_records(1_000, 32, 256, 12);
    let mut manager = new_manager();
    let ids: Vec<_> = records
        .iter()
        .map(|record| manager.insert(record).unwrap())
        .collect();

    c.bench_function("storage/get_1k", |b| {
        b.iter(|| {
            for &id in &ids {
                black_box(manager.get(id).unwrap());
            }
        });
    });
}

fn bench_growing_updates(c: &mut Criterion) {
    c.bench_function("storage/grow_update_256", |b| {
        b.iter(|| {
            let mut manager = new_manager();
            let ids: Vec<_> = (0..256)
                .map(|_| manager.insert(&[0u8; 64]).unwrap())
                .collect();
            for &id in &ids {
                manager.update(id, &[1u8; 512]).unwrap();
            }
            black_box(manager.number_of_pages());
        });
    });
}

criterion_group!(benches, bench_insert, bench_get, bench_growing_updates);
criterion_main!(benches);
