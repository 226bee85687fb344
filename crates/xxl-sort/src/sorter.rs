//! The external merge sorter.
//!
//! `open` runs the whole open phase: replacement selection produces the
//! initial runs, each materialized into a queue, and the queues are merged
//! K ways (smallest first) until at most `final_fan_in` remain. The final
//! merge is online: each `next` pulls one record out of the remaining
//! queues.
//!
//! The first intermediate merge uses a reduced fan-in chosen so that every
//! later merge can run at full fan-in and the cascade lands on exactly
//! `final_fan_in` queues.

use std::cmp::Ordering;
use std::rc::Rc;

use tracing::debug;

use xxl_common::error::XxlResult;

use crate::config::{PhaseState, SortConfig, SortLayout};
use crate::heap::ComparatorHeap;
use crate::merger::KWayMerger;
use crate::queue::{BufferSizeFn, QueueFactory, RecordQueue};
use crate::replacement::ReplacementSelection;
use crate::{QueueComparator, RecordComparator};

/// A two-phase external merge sorter over an input iterator.
///
/// The sorter is pull-driven: [`next`](Self::next) (or
/// [`peek`](Self::peek)) triggers the open phase on first use and then
/// streams records in sorted order. Equal records keep their input order.
pub struct MergeSorter<T, I> {
    input: Option<I>,
    comparator: RecordComparator<T>,
    queue_comparator: QueueComparator<T>,
    factory: Box<dyn QueueFactory<T>>,
    layout: SortLayout,
    state: Rc<PhaseState>,
    merger: Option<KWayMerger<T>>,
}

impl<T, I> MergeSorter<T, I>
where
    T: Clone + 'static,
    I: Iterator<Item = T>,
{
    /// Creates a sorter. Runs are merged smallest queue first.
    pub fn new(
        input: I,
        config: SortConfig,
        comparator: RecordComparator<T>,
        factory: Box<dyn QueueFactory<T>>,
    ) -> XxlResult<Self> {
        let layout = config.layout()?;
        Ok(Self {
            input: Some(input),
            comparator,
            queue_comparator: Rc::new(|a, b| a.len().cmp(&b.len())),
            factory,
            state: Rc::new(PhaseState::new(layout.fan_in)),
            layout,
            merger: None,
        })
    }

    /// Replaces the ordering that decides which queues merge first.
    #[must_use]
    pub fn with_queue_ordering(mut self, queue_comparator: QueueComparator<T>) -> Self {
        self.queue_comparator = queue_comparator;
        self
    }

    /// Returns the derived memory layout.
    #[must_use]
    pub fn layout(&self) -> &SortLayout {
        &self.layout
    }

    fn input_size_fn(&self) -> BufferSizeFn {
        let layout = self.layout;
        let state = self.state.clone();
        Rc::new(move || layout.current_input_buffer_size(&state))
    }

    fn output_size_fn(&self) -> BufferSizeFn {
        let layout = self.layout;
        let state = self.state.clone();
        Rc::new(move || layout.current_output_buffer_size(&state))
    }

    /// Runs the open phase: run creation and all intermediate merges.
    ///
    /// Called implicitly by `next` and `peek`; further calls have no
    /// effect.
    pub fn open(&mut self) -> XxlResult<()> {
        let Some(input) = self.input.take() else {
            return Ok(());
        };
        debug!(
            block_size = self.layout.block_size,
            object_size = self.layout.object_size,
            mem_size = self.layout.mem_size,
            first_output_buffer_size = self.layout.first_output_buffer_size,
            heap_size = self.layout.heap_size,
            output_buffer_size = self.layout.output_buffer_size,
            input_buffer_size = self.layout.input_buffer_size,
            fan_in = self.layout.fan_in,
            final_mem_size = self.layout.final_mem_size,
            final_input_buffer_size = self.layout.final_input_buffer_size,
            final_fan_in = self.layout.final_fan_in,
            "memory distribution"
        );

        let cmp = self.comparator.clone();
        let input_size = self.input_size_fn();
        let output_size = self.output_size_fn();

        // Run creation: group the replacement-selection output at strict
        // descents and materialize each run into a queue.
        let mut generator =
            ReplacementSelection::new(input, self.layout.heap_size, cmp.clone());
        let mut run_queues: Vec<Box<dyn RecordQueue<T>>> = Vec::new();
        let mut current: Option<Box<dyn RecordQueue<T>>> = None;
        let mut previous: Option<T> = None;
        for item in generator.by_ref() {
            let starts_new_run = match &previous {
                None => true,
                Some(previous) => cmp(previous, &item) == Ordering::Greater,
            };
            if starts_new_run {
                if let Some(queue) = current.take() {
                    run_queues.push(queue);
                }
                current = Some(self.factory.create(input_size.clone(), output_size.clone()));
            }
            previous = Some(item.clone());
            current
                .as_mut()
                .expect("a run queue is open")
                .enqueue(item)?;
        }
        if let Some(queue) = current.take() {
            run_queues.push(queue);
        }
        self.state.set_runs_created();
        debug!(runs = run_queues.len(), "created initial runs");

        // Priority queue of runs, smallest first under the queue ordering.
        let queue_cmp = self.queue_comparator.clone();
        let mut queues = ComparatorHeap::with_items(
            run_queues,
            Box::new(move |a: &Box<dyn RecordQueue<T>>, b: &Box<dyn RecordQueue<T>>| {
                queue_cmp(a.as_ref(), b.as_ref())
            }),
        );

        // Cascaded merges. The first fan-in is chosen so that the cascade
        // ends on exactly final_fan_in queues with every later merge at
        // full fan-in.
        let fan_in = self.layout.fan_in;
        let final_fan_in = self.layout.final_fan_in;
        if queues.len() > final_fan_in {
            let mut merge_fan_in =
                (queues.len() - final_fan_in + fan_in - 2) % (fan_in - 1) + 2;
            while queues.len() > final_fan_in {
                debug_assert!(merge_fan_in <= queues.len());
                self.state.set_current_fan_in(merge_fan_in);
                let before = queues.len();

                let mut inputs = Vec::with_capacity(merge_fan_in);
                for _ in 0..merge_fan_in {
                    inputs.push(queues.pop().expect("fan-in bounded by queue count"));
                }
                let mut merger = KWayMerger::new(inputs, cmp.clone())?;
                let mut output = self.factory.create(input_size.clone(), output_size.clone());
                while let Some(item) = merger.next()? {
                    output.enqueue(item)?;
                }
                // The drained inputs can release their storage; the output
                // queue stays open until it is consumed in turn.
                merger.close();
                queues.push(output);

                debug!(fan_in = merge_fan_in, before, after = queues.len(), "intermediate merge");
                merge_fan_in = fan_in;
            }
        }

        // Hand the remaining queues to the online merger.
        self.state.set_current_fan_in(queues.len());
        self.state.set_open_phase_finished();
        debug!(fan_in = queues.len(), "final merge");
        self.merger = Some(KWayMerger::new(queues.into_vec(), cmp)?);
        Ok(())
    }

    /// Returns the next record in sorted order, or `None` when done.
    pub fn next(&mut self) -> XxlResult<Option<T>> {
        self.open()?;
        match &mut self.merger {
            Some(merger) => merger.next(),
            None => Ok(None),
        }
    }

    /// Returns the next record without consuming it.
    pub fn peek(&mut self) -> XxlResult<Option<&T>> {
        self.open()?;
        Ok(self.merger.as_ref().and_then(KWayMerger::peek))
    }

    /// Releases the input and all merger resources. After `close` the
    /// sorter yields no further records.
    pub fn close(&mut self) {
        self.input = None;
        if let Some(merger) = &mut self.merger {
            merger.close();
        }
        self.merger = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natural_order;
    use crate::queue::VecQueueFactory;

    fn sort_all(input: Vec<i32>, config: SortConfig) -> Vec<i32> {
        let mut sorter = MergeSorter::new(
            input.into_iter(),
            config,
            natural_order(),
            Box::new(VecQueueFactory),
        )
        .unwrap();
        let mut out = Vec::new();
        while let Some(value) = sorter.next().unwrap() {
            out.push(value);
        }
        sorter.close();
        out
    }

    #[test]
    fn test_small_sort() {
        let out = sort_all(vec![5, 2, 9, 1, 7], SortConfig::new(8, 64 * 4096, 16 * 4096));
        assert_eq!(out, vec![1, 2, 5, 7, 9]);
    }

    #[test]
    fn test_empty_input() {
        let out = sort_all(Vec::new(), SortConfig::new(8, 64 * 4096, 16 * 4096));
        assert!(out.is_empty());
    }

    #[test]
    fn test_peek_matches_next() {
        let mut sorter = MergeSorter::new(
            vec![3, 1, 2].into_iter(),
            SortConfig::new(8, 64 * 4096, 16 * 4096),
            natural_order(),
            Box::new(VecQueueFactory),
        )
        .unwrap();
        assert_eq!(sorter.peek().unwrap().copied(), Some(1));
        assert_eq!(sorter.next().unwrap(), Some(1));
        assert_eq!(sorter.peek().unwrap().copied(), Some(2));
        sorter.close();
    }

    #[test]
    fn test_stability_on_equal_keys() {
        let input = vec![(1, 'a'), (2, 'b'), (1, 'c'), (2, 'd')];
        let cmp: RecordComparator<(i32, char)> = Rc::new(|a, b| a.0.cmp(&b.0));
        let mut sorter = MergeSorter::new(
            input.into_iter(),
            SortConfig::new(8, 64 * 4096, 16 * 4096),
            cmp,
            Box::new(VecQueueFactory),
        )
        .unwrap();
        let mut out = Vec::new();
        while let Some(item) = sorter.next().unwrap() {
            out.push(item);
        }
        assert_eq!(out, vec![(1, 'a'), (1, 'c'), (2, 'b'), (2, 'd')]);
    }

    #[test]
    fn test_close_before_open_is_quiet() {
        let mut sorter = MergeSorter::new(
            vec![1].into_iter(),
            SortConfig::new(8, 64 * 4096, 16 * 4096),
            natural_order(),
            Box::new(VecQueueFactory),
        )
        .unwrap();
        sorter.close();
        assert_eq!(sorter.next().unwrap(), None);
    }
}
