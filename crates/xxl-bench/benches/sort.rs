//! Merge-sorter benchmarks over memory and container-backed queues.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xxl_bench::random_integers;
use xxl_common::codec::I32Codec;
use xxl_sort::config::SortConfig;
use xxl_sort::natural_order;
use xxl_sort::queue::{BlockQueueFactory, VecQueueFactory};
use xxl_sort::sorter::MergeSorter;
use xxl_storage::container::MemoryContainer;

fn drain(mut sorter: MergeSorter<i32, std::vec::IntoIter<i32>>) -> usize {
    let mut count = 0;
    while let Some(value) = sorter.next().unwrap() {
        black_box(value);
        count += 1;
    }
    sorter.close();
    count
}

fn bench_sort_memory(c: &mut Criterion) {
    let input = random_integers(100_000, 5);
    c.bench_function("sort/memory_100k", |b| {
        b.iter(|| {
            let sorter = MergeSorter::new(
                input.clone().into_iter(),
                SortConfig::new(12, 12 * 4096, 4 * 4096),
                natural_order(),
                Box::new(VecQueueFactory),
            )
            .unwrap();
            assert_eq!(drain(sorter), 100_000);
        });
    });
}

fn bench_sort_block_backed(c: &mut Criterion) {
    let input = random_integers(100_000, 6);
    c.bench_function("sort/block_backed_100k", |b| {
        b.iter(|| {
            let container = MemoryContainer::new(4096);
            let sorter = MergeSorter::new(
                input.clone().into_iter(),
                SortConfig::new(4, 12 * 4096, 4 * 4096),
                natural_order(),
                Box::new(BlockQueueFactory::new(container, I32Codec)),
            )
            .unwrap();
            assert_eq!(drain(sorter), 100_000);
        });
    });
}

criterion_group!(benches, bench_sort_memory, bench_sort_block_backed);
criterion_main!(benches);
