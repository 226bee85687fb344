//! Block containers: keyed stores of fixed-size byte blocks.
//!
//! A container is the storage seam beneath the record manager and the
//! sorter's file-backed queues. It hands out stable [`PageId`]s for blocks
//! of one fixed size and knows nothing about their contents.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use xxl_common::error::{XxlError, XxlResult};
use xxl_common::types::PageId;

/// A keyed store of fixed-size byte blocks.
///
/// All blocks in one container have exactly [`block_size`] bytes.
/// Identifiers are allocated by [`insert`], stay stable until [`remove`],
/// and are never reissued.
///
/// Methods take `&self`; implementations provide their own interior
/// mutability so that several components (e.g. the queues of one sorter)
/// can share a container handle. The contract assumes a single logical
/// writer; concurrent writers yield container-defined behavior.
///
/// [`block_size`]: BlockContainer::block_size
/// [`insert`]: BlockContainer::insert
/// [`remove`]: BlockContainer::remove
pub trait BlockContainer {
    /// Returns the fixed size of every block in this container.
    fn block_size(&self) -> usize;

    /// Stores the exact bytes of `block` and returns a fresh identifier.
    ///
    /// Fails with [`XxlError::InvalidArgument`] if `block` does not have
    /// exactly [`block_size`](Self::block_size) bytes.
    fn insert(&self, block: &[u8]) -> XxlResult<PageId>;

    /// Copies the block stored under `id` into `out`.
    ///
    /// Fails with [`XxlError::PageNotFound`] if `id` was never issued or
    /// was removed.
    fn get(&self, id: PageId, out: &mut [u8]) -> XxlResult<()>;

    /// Replaces the block stored under `id` in place.
    fn update(&self, id: PageId, block: &[u8]) -> XxlResult<()>;

    /// Removes the block stored under `id`; subsequent `get`s fail.
    fn remove(&self, id: PageId) -> XxlResult<()>;

    /// Removes all blocks.
    fn clear(&self);

    /// Returns the number of live blocks.
    fn len(&self) -> usize;

    /// Returns true if the container holds no blocks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` refers to a live block.
    fn contains(&self, id: PageId) -> bool;
}

struct ContainerInner {
    blocks: BTreeMap<PageId, Vec<u8>>,
    next_id: u64,
}

/// An in-memory block container.
///
/// Blocks live in a [`BTreeMap`] behind a mutex; cloning the container
/// clones a handle to the same storage, so one container can back a record
/// manager and any number of spill queues at once.
///
/// # Example
///
/// ```rust
/// use xxl_storage::container::{BlockContainer, MemoryContainer};
///
/// let container = MemoryContainer::new(64);
/// let id = container.insert(&[7u8; 64]).unwrap();
///
/// let mut out = [0u8; 64];
/// container.get(id, &mut out).unwrap();
/// assert_eq!(out, [7u8; 64]);
/// ```
#[derive(Clone)]
pub struct MemoryContainer {
    block_size: usize,
    inner: Arc<Mutex<ContainerInner>>,
}

impl MemoryContainer {
    /// Creates an empty container for blocks of `block_size` bytes.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            inner: Arc::new(Mutex::new(ContainerInner {
                blocks: BTreeMap::new(),
                next_id: 0,
            })),
        }
    }

    fn check_block(&self, block: &[u8]) -> XxlResult<()> {
        if block.len() != self.block_size {
            return Err(XxlError::invalid_argument(format!(
                "block of {} bytes does not match block size {}",
                block.len(),
                self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockContainer for MemoryContainer {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn insert(&self, block: &[u8]) -> XxlResult<PageId> {
        self.check_block(block)?;
        let mut inner = self.inner.lock();
        let id = PageId::new(inner.next_id);
        inner.next_id += 1;
        inner.blocks.insert(id, block.to_vec());
        Ok(id)
    }

    fn get(&self, id: PageId, out: &mut [u8]) -> XxlResult<()> {
        self.check_block(out)?;
        let inner = self.inner.lock();
        let block = inner
            .blocks
            .get(&id)
            .ok_or(XxlError::PageNotFound { page_id: id })?;
        out.copy_from_slice(block);
        Ok(())
    }

    fn update(&self, id: PageId, block: &[u8]) -> XxlResult<()> {
        self.check_block(block)?;
        let mut inner = self.inner.lock();
        let slot = inner
            .blocks
            .get_mut(&id)
            .ok_or(XxlError::PageNotFound { page_id: id })?;
        slot.copy_from_slice(block);
        Ok(())
    }

    fn remove(&self, id: PageId) -> XxlResult<()> {
        let mut inner = self.inner.lock();
        inner
            .blocks
            .remove(&id)
            .map(|_| ())
            .ok_or(XxlError::PageNotFound { page_id: id })
    }

    fn clear(&self) {
        self.inner.lock().blocks.clear();
    }

    fn len(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    fn contains(&self, id: PageId) -> bool {
        self.inner.lock().blocks.contains_key(&id)
    }
}
