//! Replacement selection: generating long sorted runs.
//!
//! A bounded heap of `H` records is kept ordered by `(run, key, seq)`.
//! Emitting always takes the heap minimum; the record read to replace it
//! joins the current run if it is not smaller than the record just
//! emitted, otherwise it is deferred to the next run. On random input the
//! resulting runs average about `2H` records.
//!
//! The output is the concatenation of all runs. A run boundary is exactly
//! a position where the output strictly decreases, which is how consumers
//! group runs back out of the stream. The insertion sequence number makes
//! equal keys leave the heap in arrival order, so each run is stable.

use std::cmp::Ordering;

use crate::heap::ComparatorHeap;
use crate::RecordComparator;

struct Entry<T> {
    run: u64,
    seq: u64,
    item: T,
}

/// A pull-driven run generator over an input iterator.
///
/// # Example
///
/// ```rust
/// use xxl_sort::replacement::ReplacementSelection;
/// use xxl_sort::natural_order;
///
/// let input = vec![4, 1, 3, 2].into_iter();
/// let generator = ReplacementSelection::new(input, 2, natural_order());
/// let output: Vec<i32> = generator.collect();
/// // Two runs: [1, 3, 4] and [2].
/// assert_eq!(output, vec![1, 3, 4, 2]);
/// ```
pub struct ReplacementSelection<T, I> {
    input: I,
    heap: ComparatorHeap<Entry<T>>,
    cmp: RecordComparator<T>,
    next_seq: u64,
}

impl<T: 'static, I: Iterator<Item = T>> ReplacementSelection<T, I> {
    /// Creates a generator with a heap of `capacity` records.
    ///
    /// A zero capacity is treated as one: the generator degenerates to
    /// pass-through runs of length one and up.
    pub fn new(mut input: I, capacity: usize, cmp: RecordComparator<T>) -> Self {
        let capacity = capacity.max(1);
        let heap_cmp: Box<dyn Fn(&Entry<T>, &Entry<T>) -> Ordering> = {
            let cmp = cmp.clone();
            Box::new(move |a, b| {
                a.run
                    .cmp(&b.run)
                    .then_with(|| cmp(&a.item, &b.item))
                    .then_with(|| a.seq.cmp(&b.seq))
            })
        };

        let mut initial = Vec::with_capacity(capacity);
        let mut next_seq = 0u64;
        for item in input.by_ref().take(capacity) {
            initial.push(Entry {
                run: 0,
                seq: next_seq,
                item,
            });
            next_seq += 1;
        }

        Self {
            input,
            heap: ComparatorHeap::with_items(initial, heap_cmp),
            cmp,
            next_seq,
        }
    }

    /// Number of records currently held in the heap.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if the generator is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T: 'static, I: Iterator<Item = T>> Iterator for ReplacementSelection<T, I> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let entry = self.heap.pop()?;
        if let Some(item) = self.input.next() {
            // Records no smaller than the one just emitted may still join
            // its run; smaller ones must wait for the next run.
            let run = if (self.cmp)(&item, &entry.item) != Ordering::Less {
                entry.run
            } else {
                entry.run + 1
            };
            self.heap.push(Entry {
                run,
                seq: self.next_seq,
                item,
            });
            self.next_seq += 1;
        }
        Some(entry.item)
    }
}
