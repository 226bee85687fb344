//! Run queues: FIFO stores for sorted runs.
//!
//! The sorter materializes every run into a queue obtained from a
//! [`QueueFactory`]. The factory receives two parameterless size
//! providers; a queue that spills to storage must ask them *when it opens
//! its storage*, not at construction, because the right buffer sizes
//! depend on the merge phase in progress at that moment.

use std::collections::VecDeque;
use std::rc::Rc;

use xxl_common::codec::FixedSizeCodec;
use xxl_common::error::XxlResult;
use xxl_common::types::PageId;
use xxl_storage::container::BlockContainer;

/// A parameterless provider of the current buffer size in bytes.
pub type BufferSizeFn = Rc<dyn Fn() -> usize>;

/// A FIFO queue of records.
pub trait RecordQueue<T> {
    /// Appends a record.
    fn enqueue(&mut self, item: T) -> XxlResult<()>;

    /// Removes and returns the oldest record, or `None` when empty.
    fn dequeue(&mut self) -> XxlResult<Option<T>>;

    /// Number of records in the queue.
    fn len(&self) -> usize;

    /// Returns true if the queue holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases the queue's resources. The queue is unusable afterwards.
    fn close(&mut self);
}

/// Creates queues for the sorter's runs.
pub trait QueueFactory<T> {
    /// Creates an empty queue.
    ///
    /// Implementations that buffer their storage must honor `input_size`
    /// and `output_size` at the moment a buffer is actually opened.
    fn create(
        &mut self,
        input_size: BufferSizeFn,
        output_size: BufferSizeFn,
    ) -> Box<dyn RecordQueue<T>>;
}

/// A main-memory queue.
#[derive(Debug, Default)]
pub struct VecQueue<T> {
    items: VecDeque<T>,
}

impl<T> VecQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> RecordQueue<T> for VecQueue<T> {
    fn enqueue(&mut self, item: T) -> XxlResult<()> {
        self.items.push_back(item);
        Ok(())
    }

    fn dequeue(&mut self) -> XxlResult<Option<T>> {
        Ok(self.items.pop_front())
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn close(&mut self) {
        self.items.clear();
    }
}

/// Factory for main-memory queues. The buffer-size providers are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct VecQueueFactory;

impl<T: 'static> QueueFactory<T> for VecQueueFactory {
    fn create(
        &mut self,
        _input_size: BufferSizeFn,
        _output_size: BufferSizeFn,
    ) -> Box<dyn RecordQueue<T>> {
        Box::new(VecQueue::new())
    }
}

/// A queue spilling records into a block container through a fixed-size
/// codec.
///
/// Records are buffered until a whole output buffer is filled, then packed
/// into blocks and inserted into the container. Dequeues read back one
/// input buffer's worth of blocks at a time and remove the consumed
/// blocks. The output buffer size is queried once at the first flush, the
/// input buffer size at every refill.
pub struct BlockQueue<T, C, K> {
    container: C,
    codec: K,
    input_size: BufferSizeFn,
    output_size: BufferSizeFn,
    /// Full blocks in FIFO order, with the number of records in each.
    blocks: VecDeque<(PageId, usize)>,
    write_items: Vec<T>,
    write_capacity: Option<usize>,
    read_items: VecDeque<T>,
    records_per_block: usize,
}

impl<T, C, K> BlockQueue<T, C, K>
where
    C: BlockContainer,
    K: FixedSizeCodec<T>,
{
    /// Creates an empty queue over `container`.
    ///
    /// # Panics
    ///
    /// Panics if an encoded record does not fit one block.
    pub fn new(container: C, codec: K, input_size: BufferSizeFn, output_size: BufferSizeFn) -> Self {
        let records_per_block = container.block_size() / codec.encoded_size();
        assert!(
            records_per_block >= 1,
            "encoded record must fit one container block"
        );
        Self {
            container,
            codec,
            input_size,
            output_size,
            blocks: VecDeque::new(),
            write_items: Vec::new(),
            write_capacity: None,
            read_items: VecDeque::new(),
            records_per_block,
        }
    }

    fn flush_write_buffer(&mut self) -> XxlResult<()> {
        let block_size = self.container.block_size();
        let record_size = self.codec.encoded_size();
        let mut block = vec![0u8; block_size];

        let items = std::mem::take(&mut self.write_items);
        for chunk in items.chunks(self.records_per_block) {
            block.fill(0);
            for (i, item) in chunk.iter().enumerate() {
                self.codec
                    .encode(item, &mut block[i * record_size..(i + 1) * record_size]);
            }
            let id = self.container.insert(&block)?;
            self.blocks.push_back((id, chunk.len()));
        }
        Ok(())
    }

    fn refill_read_buffer(&mut self) -> XxlResult<()> {
        // The input buffer size is decided now, by the phase in progress.
        let input_size = (self.input_size)();
        let blocks_to_read = (input_size / self.container.block_size()).max(1);
        let record_size = self.codec.encoded_size();
        let mut block = vec![0u8; self.container.block_size()];

        for _ in 0..blocks_to_read {
            let Some((id, count)) = self.blocks.pop_front() else {
                break;
            };
            self.container.get(id, &mut block)?;
            for i in 0..count {
                self.read_items
                    .push_back(self.codec.decode(&block[i * record_size..(i + 1) * record_size]));
            }
            self.container.remove(id)?;
        }
        Ok(())
    }
}

impl<T, C, K> RecordQueue<T> for BlockQueue<T, C, K>
where
    C: BlockContainer,
    K: FixedSizeCodec<T>,
{
    fn enqueue(&mut self, item: T) -> XxlResult<()> {
        let capacity = match self.write_capacity {
            Some(capacity) => capacity,
            None => {
                // First write: the output buffer size is decided now.
                let capacity =
                    ((self.output_size)() / self.codec.encoded_size()).max(self.records_per_block);
                self.write_capacity = Some(capacity);
                capacity
            }
        };
        self.write_items.push(item);
        if self.write_items.len() >= capacity {
            self.flush_write_buffer()?;
        }
        Ok(())
    }

    fn dequeue(&mut self) -> XxlResult<Option<T>> {
        if let Some(item) = self.read_items.pop_front() {
            return Ok(Some(item));
        }
        if !self.blocks.is_empty() {
            self.refill_read_buffer()?;
        } else if !self.write_items.is_empty() {
            // The unflushed tail is the youngest part of the queue.
            self.read_items.extend(self.write_items.drain(..));
        }
        Ok(self.read_items.pop_front())
    }

    fn len(&self) -> usize {
        self.blocks.iter().map(|(_, count)| count).sum::<usize>()
            + self.write_items.len()
            + self.read_items.len()
    }

    fn close(&mut self) {
        for (id, _) in self.blocks.drain(..) {
            let _ = self.container.remove(id);
        }
        self.write_items.clear();
        self.read_items.clear();
    }
}

/// Factory for container-backed queues sharing one container handle.
#[derive(Debug, Clone)]
pub struct BlockQueueFactory<C, K> {
    container: C,
    codec: K,
}

impl<C, K> BlockQueueFactory<C, K> {
    /// Creates a factory spilling into `container` through `codec`.
    pub fn new(container: C, codec: K) -> Self {
        Self { container, codec }
    }
}

impl<T, C, K> QueueFactory<T> for BlockQueueFactory<C, K>
where
    T: 'static,
    C: BlockContainer + Clone + 'static,
    K: FixedSizeCodec<T> + Copy + 'static,
{
    fn create(
        &mut self,
        input_size: BufferSizeFn,
        output_size: BufferSizeFn,
    ) -> Box<dyn RecordQueue<T>> {
        Box::new(BlockQueue::new(
            self.container.clone(),
            self.codec,
            input_size,
            output_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use xxl_common::codec::I32Codec;
    use xxl_storage::container::MemoryContainer;

    fn size_fn(size: usize) -> BufferSizeFn {
        Rc::new(move || size)
    }

    #[test]
    fn test_vec_queue_fifo() {
        let mut queue = VecQueue::new();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue().unwrap(), Some(1));
        assert_eq!(queue.dequeue().unwrap(), Some(2));
        assert_eq!(queue.dequeue().unwrap(), None);
    }

    #[test]
    fn test_block_queue_roundtrip() {
        let container = MemoryContainer::new(64);
        let mut queue =
            BlockQueue::new(container.clone(), I32Codec, size_fn(64), size_fn(128));

        for value in 0..100 {
            queue.enqueue(value).unwrap();
        }
        assert_eq!(queue.len(), 100);
        // 128-byte output buffer = 32 records per flush; some blocks exist.
        assert!(!container.is_empty());

        for value in 0..100 {
            assert_eq!(queue.dequeue().unwrap(), Some(value));
        }
        assert_eq!(queue.dequeue().unwrap(), None);
        // Consumed blocks were removed from the container.
        assert!(container.is_empty());
    }

    #[test]
    fn test_block_queue_close_releases_blocks() {
        let container = MemoryContainer::new(64);
        let mut queue =
            BlockQueue::new(container.clone(), I32Codec, size_fn(64), size_fn(64));
        for value in 0..50 {
            queue.enqueue(value).unwrap();
        }
        assert!(!container.is_empty());
        queue.close();
        assert!(container.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_block_queue_queries_sizes_at_call_time() {
        // The providers are consulted when buffers open, so late changes
        // must be observed.
        let out_size = Rc::new(Cell::new(64usize));
        let in_size = Rc::new(Cell::new(64usize));

        let container = MemoryContainer::new(64);
        let out = out_size.clone();
        let inp = in_size.clone();
        let mut queue = BlockQueue::new(
            container,
            I32Codec,
            Rc::new(move || inp.get()) as BufferSizeFn,
            Rc::new(move || out.get()) as BufferSizeFn,
        );

        // Raise the output size before the first enqueue: the larger
        // buffer must be honored (128 bytes = 32 records before a flush).
        out_size.set(128);
        for value in 0..32 {
            queue.enqueue(value).unwrap();
        }
        in_size.set(128);
        for value in 0..32 {
            assert_eq!(queue.dequeue().unwrap(), Some(value));
        }
    }

    #[test]
    fn test_factory_shares_container() {
        let container = MemoryContainer::new(64);
        let mut factory = BlockQueueFactory::new(container.clone(), I32Codec);
        let mut a: Box<dyn RecordQueue<i32>> = factory.create(size_fn(64), size_fn(64));
        let mut b: Box<dyn RecordQueue<i32>> = factory.create(size_fn(64), size_fn(64));

        for value in 0..20 {
            a.enqueue(value).unwrap();
            b.enqueue(-value).unwrap();
        }
        assert_eq!(a.dequeue().unwrap(), Some(0));
        assert_eq!(b.dequeue().unwrap(), Some(0));
        a.close();
        b.close();
    }
}
