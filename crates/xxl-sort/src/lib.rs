//! # xxl-sort
//!
//! A two-phase external merge-sort engine.
//!
//! In the open phase, [`ReplacementSelection`] turns the input into long
//! sorted runs (about twice the heap size on random input). Runs are
//! materialized into queues from a [`QueueFactory`] (main memory or
//! container-backed) and merged K ways, smallest queues first, under a
//! fixed memory budget until at most the final fan-in remain. The final
//! merge is online: [`MergeSorter::next`] pulls one record at a time.
//!
//! ## Example
//!
//! ```rust
//! use xxl_sort::config::SortConfig;
//! use xxl_sort::queue::VecQueueFactory;
//! use xxl_sort::sorter::MergeSorter;
//! use xxl_sort::natural_order;
//!
//! let input = vec![3, 1, 2].into_iter();
//! let config = SortConfig::new(8, 64 * 4096, 16 * 4096);
//! let mut sorter = MergeSorter::new(
//!     input,
//!     config,
//!     natural_order(),
//!     Box::new(VecQueueFactory),
//! ).unwrap();
//!
//! let mut sorted = Vec::new();
//! while let Some(value) = sorter.next().unwrap() {
//!     sorted.push(value);
//! }
//! assert_eq!(sorted, vec![1, 2, 3]);
//! sorter.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod heap;
pub mod merger;
pub mod queue;
pub mod replacement;
pub mod sorter;

use std::cmp::Ordering;
use std::rc::Rc;

pub use config::{SortConfig, SortLayout};
pub use heap::ComparatorHeap;
pub use merger::KWayMerger;
pub use queue::{
    BlockQueue, BlockQueueFactory, BufferSizeFn, QueueFactory, RecordQueue, VecQueue,
    VecQueueFactory,
};
pub use replacement::ReplacementSelection;
pub use sorter::MergeSorter;

/// A shared record comparator.
pub type RecordComparator<T> = Rc<dyn Fn(&T, &T) -> Ordering>;

/// A shared ordering over run queues, deciding which queues merge first.
pub type QueueComparator<T> = Rc<dyn Fn(&dyn RecordQueue<T>, &dyn RecordQueue<T>) -> Ordering>;

/// The natural ordering of `T` as a [`RecordComparator`].
#[must_use]
pub fn natural_order<T: Ord>() -> RecordComparator<T> {
    Rc::new(|a, b| a.cmp(b))
}
