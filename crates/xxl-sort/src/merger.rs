//! K-way merging of sorted queues.
//!
//! The merger keeps one head record per source queue in a heap ordered by
//! the record comparator, with ties broken by the lower source index. That
//! tie-break makes the merge stable with respect to queue order.

use std::cmp::Ordering;

use xxl_common::error::XxlResult;

use crate::heap::ComparatorHeap;
use crate::queue::RecordQueue;
use crate::RecordComparator;

struct MergeEntry<T> {
    item: T,
    source: usize,
}

/// A pull-driven K-way merger over sorted queues.
///
/// Each `next` returns the globally smallest head and refills from the
/// queue it came from; the merge ends when every source is exhausted.
pub struct KWayMerger<T> {
    sources: Vec<Box<dyn RecordQueue<T>>>,
    heap: ComparatorHeap<MergeEntry<T>>,
    closed: bool,
}

impl<T: 'static> KWayMerger<T> {
    /// Creates a merger over `sources`, reading one head from each.
    pub fn new(
        mut sources: Vec<Box<dyn RecordQueue<T>>>,
        cmp: RecordComparator<T>,
    ) -> XxlResult<Self> {
        let heap_cmp: Box<dyn Fn(&MergeEntry<T>, &MergeEntry<T>) -> Ordering> =
            Box::new(move |a, b| cmp(&a.item, &b.item).then_with(|| a.source.cmp(&b.source)));
        let mut heap = ComparatorHeap::new(heap_cmp);
        for (source, queue) in sources.iter_mut().enumerate() {
            if let Some(item) = queue.dequeue()? {
                heap.push(MergeEntry { item, source });
            }
        }
        Ok(Self {
            sources,
            heap,
            closed: false,
        })
    }

    /// Number of source queues.
    #[must_use]
    pub fn fan_in(&self) -> usize {
        self.sources.len()
    }

    /// Returns the next record without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|entry| &entry.item)
    }

    /// Returns the next record in merge order, or `None` when all sources
    /// are exhausted.
    pub fn next(&mut self) -> XxlResult<Option<T>> {
        let Some(entry) = self.heap.pop() else {
            return Ok(None);
        };
        if let Some(item) = self.sources[entry.source].dequeue()? {
            self.heap.push(MergeEntry {
                item,
                source: entry.source,
            });
        }
        Ok(Some(entry.item))
    }

    /// Closes all source queues. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for queue in &mut self.sources {
            queue.close();
        }
        self.closed = true;
    }
}
