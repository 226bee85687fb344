//! The record manager: variable-length records over a block container.
//!
//! A [`RecordManager`] packs records into pages (one page per container
//! block), keeps per-page accounting in memory, and routes every operation
//! through a [`PlacementStrategy`] and a [`TidManager`]. Records that
//! outgrow their home page migrate; depending on the TID manager the old
//! location keeps a link record or the id table is rewritten, so public
//! ids stay valid either way.
//!
//! Instances are strictly single-threaded: operations reuse three internal
//! page buffers and must complete before the next operation starts.

use std::collections::VecDeque;
use std::fmt;
use std::io::{Read, Write};

use bytes::Bytes;
use tracing::{debug, trace};

use xxl_common::constants::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use xxl_common::error::{XxlError, XxlResult};
use xxl_common::types::PageId;

use crate::container::BlockContainer;
use crate::page::{max_record_size, occupied_size, RecordPage, RecordPageRef};
use crate::page_info::{PageInformation, PagesMap};
use crate::strategy::PlacementStrategy;
use crate::tid::{RecordId, Tid};
use crate::tid_manager::TidManager;

/// A variable-length record store layered on a fixed-size block container.
pub struct RecordManager<C: BlockContainer> {
    container: C,
    page_size: usize,
    strategy: Box<dyn PlacementStrategy>,
    tid_manager: Box<dyn TidManager>,
    pages: PagesMap,
    direct_reserves: usize,
    // Reusable page buffers: the home page of the id being operated on,
    // the link-target page, and a staging buffer for inserts and
    // reservation flushes. Not reentrant.
    home_buf: Vec<u8>,
    target_buf: Vec<u8>,
    scratch_buf: Vec<u8>,
}

impl<C: BlockContainer> RecordManager<C> {
    /// Creates a record manager over `container`.
    ///
    /// `page_size` must equal the container's block size;
    /// `direct_reserves` is the number of in-memory reservation slots per
    /// page (zero disables in-memory reservation).
    pub fn new(
        container: C,
        page_size: usize,
        mut strategy: Box<dyn PlacementStrategy>,
        tid_manager: Box<dyn TidManager>,
        direct_reserves: usize,
    ) -> XxlResult<Self> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(XxlError::invalid_argument(format!(
                "page size {} outside supported range [{}, {}]",
                page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if container.block_size() != page_size {
            return Err(XxlError::invalid_argument(format!(
                "page size {} does not match container block size {}",
                page_size,
                container.block_size()
            )));
        }
        let pages = PagesMap::new();
        strategy.init(&pages, page_size);
        Ok(Self {
            container,
            page_size,
            strategy,
            tid_manager,
            pages,
            direct_reserves,
            home_buf: vec![0u8; page_size],
            target_buf: vec![0u8; page_size],
            scratch_buf: vec![0u8; page_size],
        })
    }

    /// Returns the underlying container.
    pub fn container(&self) -> &C {
        &self.container
    }

    /// Returns the page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the size of the largest record this manager accepts.
    #[must_use]
    pub fn max_record_size(&self) -> usize {
        max_record_size(self.page_size)
    }

    fn check_record_size(&self, record: &[u8]) -> XxlResult<()> {
        if record.is_empty() {
            return Err(XxlError::invalid_argument("empty records are not allowed"));
        }
        let max = self.max_record_size();
        if record.len() > max {
            return Err(XxlError::RecordTooLarge {
                size: record.len(),
                max_size: max,
            });
        }
        Ok(())
    }

    /// Applies an accounting delta and notifies the strategy.
    fn apply_accounting(
        &mut self,
        page_id: PageId,
        record_nr: i16,
        records_delta: i32,
        bytes_delta: i64,
        links_delta: i32,
    ) -> XxlResult<()> {
        let page_size = self.page_size;
        let pi = self
            .pages
            .get_mut(&page_id)
            .ok_or_else(|| XxlError::invariant(format!("page {} missing from pages map", page_id)))?;
        pi.update_accounting(record_nr, records_delta, bytes_delta, links_delta, page_size)?;
        let pi = self.pages.get(&page_id).expect("just updated");
        self.strategy
            .record_updated(page_id, pi, record_nr, bytes_delta);
        Ok(())
    }

    /// Materializes pending in-memory reservations into the page and
    /// persists it. No-op when none are pending.
    fn flush_reservations(&mut self, page_id: PageId) -> XxlResult<()> {
        let reservations = match self.pages.get_mut(&page_id) {
            Some(pi) if pi.has_reservations() => pi.take_reservations(),
            _ => return Ok(()),
        };
        self.container.get(page_id, &mut self.scratch_buf)?;
        {
            let mut page = RecordPage::new(&mut self.scratch_buf);
            for reservation in &reservations {
                page.insert_record(&reservation.payload, reservation.record_nr, false)?;
            }
        }
        self.container.update(page_id, &self.scratch_buf)?;
        trace!(page = %page_id, count = reservations.len(), "materialized reservations");
        Ok(())
    }

    /// Allocates a fresh page hosting `record` at record number 0.
    fn allocate_page_with(&mut self, record: &[u8]) -> XxlResult<Tid> {
        let page_id = {
            let mut page = RecordPage::new(&mut self.scratch_buf);
            page.initialize();
            page.insert_record(record, 0, false)?;
            self.container.insert(&self.scratch_buf)?
        };
        self.pages.insert(page_id, PageInformation::new());
        let pi = self.pages.get(&page_id).expect("just inserted");
        self.strategy.page_inserted(page_id, pi);
        debug!(page = %page_id, "allocated page");
        Ok(Tid::new(page_id, 0))
    }

    /// Places a record on some page without registering a public id.
    ///
    /// `update` uses this for relocation so the TID manager only ever
    /// tracks the caller's original id.
    fn place_record(&mut self, record: &[u8]) -> XxlResult<Tid> {
        let tid = match self.strategy.page_for_record(&self.pages, record.len()) {
            None => self.allocate_page_with(record)?,
            Some(page_id) => {
                self.flush_reservations(page_id)?;
                self.container.get(page_id, &mut self.scratch_buf)?;
                let record_nr = {
                    let mut page = RecordPage::new(&mut self.scratch_buf);
                    let record_nr = page.free_record_number()?;
                    page.insert_record(record, record_nr, false)?;
                    record_nr
                };
                self.container.update(page_id, &self.scratch_buf)?;
                Tid::new(page_id, record_nr)
            }
        };
        self.apply_accounting(tid.page, tid.record, 1, record.len() as i64, 0)?;
        Ok(tid)
    }

    /// Inserts a record and returns its public id.
    pub fn insert(&mut self, record: &[u8]) -> XxlResult<RecordId> {
        self.check_record_size(record)?;
        let tid = self.place_record(record)?;
        Ok(self.tid_manager.insert(tid))
    }

    /// Reserves an id for a record produced by `producer`.
    ///
    /// The producer runs once to materialize the record (its size is not
    /// known up front). When the target page has a free reservation slot
    /// the record number is allocated in memory and no page is read; the
    /// payload is kept in the slot and written into the page the next time
    /// it is loaded for mutation. Otherwise this behaves like `insert`.
    pub fn reserve<F>(&mut self, producer: F) -> XxlResult<RecordId>
    where
        F: FnOnce() -> Bytes,
    {
        let record = producer();
        self.check_record_size(&record)?;

        let tid = match self.strategy.page_for_record(&self.pages, record.len()) {
            None => {
                let tid = self.allocate_page_with(&record)?;
                self.apply_accounting(tid.page, tid.record, 1, record.len() as i64, 0)?;
                tid
            }
            Some(page_id) => {
                let direct_reserves = self.direct_reserves;
                let page_size = self.page_size;
                let reserved = self
                    .pages
                    .get_mut(&page_id)
                    .ok_or_else(|| {
                        XxlError::invariant(format!("page {} missing from pages map", page_id))
                    })?
                    .try_reserve_record_nr(&record, page_size, direct_reserves)?;

                let tid = match reserved {
                    Some(record_nr) => {
                        trace!(page = %page_id, record_nr, "reserved record number in memory");
                        Tid::new(page_id, record_nr)
                    }
                    None => {
                        // No slot left (or no usable number); take the
                        // on-page allocation path.
                        self.flush_reservations(page_id)?;
                        self.container.get(page_id, &mut self.home_buf)?;
                        let record_nr = {
                            let mut page = RecordPage::new(&mut self.home_buf);
                            let record_nr = page.free_record_number()?;
                            page.insert_record(&record, record_nr, false)?;
                            record_nr
                        };
                        self.container.update(page_id, &self.home_buf)?;
                        Tid::new(page_id, record_nr)
                    }
                };
                self.apply_accounting(tid.page, tid.record, 1, record.len() as i64, 0)?;
                tid
            }
        };
        Ok(self.tid_manager.insert(tid))
    }

    /// Returns the record stored under `id`.
    ///
    /// Follows at most one link; a link target that is itself a link is a
    /// fatal [`XxlError::LinkDepthExceeded`].
    pub fn get(&mut self, id: RecordId) -> XxlResult<Bytes> {
        let tid = self.tid_manager.query(id).ok_or(XxlError::RecordNotFound)?;

        // A pending reservation is served straight from memory.
        if let Some(pi) = self.pages.get(&tid.page) {
            if let Some(reservation) = pi.reservation(tid.record) {
                return Ok(Bytes::copy_from_slice(&reservation.payload));
            }
        }

        self.container.get(tid.page, &mut self.home_buf)?;
        let (payload, is_link) = {
            let page = RecordPageRef::new(&self.home_buf);
            let (data, is_link) = page.record(tid.record)?;
            (Bytes::copy_from_slice(data), is_link)
        };
        if !is_link {
            return Ok(payload);
        }

        let target = Tid::from_bytes(&payload)?;
        self.container.get(target.page, &mut self.target_buf)?;
        let page = RecordPageRef::new(&self.target_buf);
        let (data, is_link) = page.record(target.record)?;
        if is_link {
            return Err(XxlError::LinkDepthExceeded {
                page_id: target.page,
                record_nr: target.record,
            });
        }
        Ok(Bytes::copy_from_slice(data))
    }

    /// Replaces the record stored under `id`.
    ///
    /// Stays in place when the new size fits the hosting page; otherwise
    /// the payload migrates and either a link record is left at the home
    /// position or the id table is rewritten, depending on the TID
    /// manager.
    pub fn update(&mut self, id: RecordId, record: &[u8]) -> XxlResult<()> {
        self.check_record_size(record)?;
        let tid = self.tid_manager.query(id).ok_or(XxlError::RecordNotFound)?;

        self.flush_reservations(tid.page)?;
        self.container.get(tid.page, &mut self.home_buf)?;

        // Resolve the payload position, following a link if present.
        let (current, link_followed, home_len) = {
            let page = RecordPageRef::new(&self.home_buf);
            let (data, is_link) = page.record(tid.record)?;
            if is_link {
                (Tid::from_bytes(data)?, true, 0)
            } else {
                (tid, false, data.len())
            }
        };
        let old_len = if link_followed {
            self.flush_reservations(current.page)?;
            self.container.get(current.page, &mut self.target_buf)?;
            let page = RecordPageRef::new(&self.target_buf);
            let (data, is_link) = page.record(current.record)?;
            if is_link {
                return Err(XxlError::LinkDepthExceeded {
                    page_id: current.page,
                    record_nr: current.record,
                });
            }
            data.len()
        } else {
            home_len
        };

        // Does the replacement fit the page that currently hosts the
        // payload? Record count is unchanged by an in-place replacement.
        let fits_in_place = {
            let pi = self.pages.get(&current.page).ok_or_else(|| {
                XxlError::invariant(format!("page {} missing from pages map", current.page))
            })?;
            let bytes = pi.bytes_used() as i64 + record.len() as i64 - old_len as i64;
            occupied_size(pi.total_records(), bytes as usize) <= self.page_size
        };

        if fits_in_place {
            {
                let buf = if link_followed {
                    &mut self.target_buf
                } else {
                    &mut self.home_buf
                };
                let mut page = RecordPage::new(buf);
                page.remove(current.record)?;
                page.insert_record(record, current.record, false)?;
            }
            let buf = if link_followed {
                &self.target_buf
            } else {
                &self.home_buf
            };
            self.container.update(current.page, buf)?;
            return self.apply_accounting(
                current.page,
                current.record,
                0,
                record.len() as i64 - old_len as i64,
                0,
            );
        }

        // The current page cannot host the new size: drop the old payload
        // and persist that removal first.
        {
            let buf = if link_followed {
                &mut self.target_buf
            } else {
                &mut self.home_buf
            };
            let mut page = RecordPage::new(buf);
            page.remove(current.record)?;
        }
        {
            let buf = if link_followed {
                &self.target_buf
            } else {
                &self.home_buf
            };
            self.container.update(current.page, buf)?;
        }
        self.apply_accounting(current.page, current.record, -1, -(old_len as i64), 0)?;

        // If we arrived through a link, the new payload may fit the home
        // page in place of the link record.
        if link_followed {
            let fits_home = {
                let pi = self.pages.get(&tid.page).ok_or_else(|| {
                    XxlError::invariant(format!("page {} missing from pages map", tid.page))
                })?;
                let bytes = pi.bytes_used() as i64 + record.len() as i64 - Tid::SIZE as i64;
                occupied_size(pi.total_records(), bytes as usize) <= self.page_size
            };
            if fits_home {
                {
                    let mut page = RecordPage::new(&mut self.home_buf);
                    page.remove(tid.record)?;
                    page.insert_record(record, tid.record, false)?;
                }
                self.container.update(tid.page, &self.home_buf)?;
                self.apply_accounting(
                    tid.page,
                    tid.record,
                    1,
                    record.len() as i64 - Tid::SIZE as i64,
                    -1,
                )?;
                debug!(home = %tid, "collapsed link back into home page");
                return Ok(());
            }
        }

        // Place the payload on a different page. The strategy can never
        // pick the two loaded pages here: the failed fit checks above imply
        // they cannot take the record plus a directory entry either.
        let last_tid = self.place_record(record)?;

        if self.tid_manager.uses_links() {
            let link = last_tid.to_bytes();
            {
                let mut page = RecordPage::new(&mut self.home_buf);
                if link_followed {
                    // A link is exchanged for a link: same size, already a
                    // link, no accounting change.
                    page.update(&link, tid.record, true)?;
                } else {
                    page.insert_record(&link, tid.record, true)?;
                }
            }
            self.container.update(tid.page, &self.home_buf)?;
            if !link_followed {
                self.apply_accounting(tid.page, tid.record, 0, Tid::SIZE as i64, 1)?;
            }
            debug!(home = %tid, target = %last_tid, "left link record");
        } else {
            self.tid_manager.update(id, last_tid)?;
            trace!(id = ?id, target = %last_tid, "rewrote id mapping");
        }
        Ok(())
    }

    /// Removes one record from the page loaded in the home or target
    /// buffer, reclaiming the page if it becomes empty.
    fn remove_from_page(&mut self, tid: Tid, use_target_buf: bool, is_link: bool) -> XxlResult<()> {
        let (freed, now_empty) = {
            let buf = if use_target_buf {
                &mut self.target_buf
            } else {
                &mut self.home_buf
            };
            let mut page = RecordPage::new(buf);
            let freed = page.remove(tid.record)?;
            (freed, page.record_count() == 0)
        };

        if now_empty {
            self.container.remove(tid.page)?;
            let pi = self.pages.remove(&tid.page).ok_or_else(|| {
                XxlError::invariant(format!("page {} missing from pages map", tid.page))
            })?;
            self.strategy.page_removed(tid.page, &pi);
            debug!(page = %tid.page, "reclaimed empty page");
            return Ok(());
        }

        {
            let buf = if use_target_buf {
                &self.target_buf
            } else {
                &self.home_buf
            };
            self.container.update(tid.page, buf)?;
        }
        let (records_delta, links_delta) = if is_link { (0, -1) } else { (-1, 0) };
        self.apply_accounting(
            tid.page,
            tid.record,
            records_delta,
            -(freed as i64),
            links_delta,
        )
    }

    /// Removes the record stored under `id`, along with any link record
    /// pointing at it.
    pub fn remove(&mut self, id: RecordId) -> XxlResult<()> {
        let tid = self.tid_manager.query(id).ok_or(XxlError::RecordNotFound)?;

        self.flush_reservations(tid.page)?;
        self.container.get(tid.page, &mut self.home_buf)?;
        let target = {
            let page = RecordPageRef::new(&self.home_buf);
            let (data, is_link) = page.record(tid.record)?;
            if is_link {
                Some(Tid::from_bytes(data)?)
            } else {
                None
            }
        };

        match target {
            None => {
                self.remove_from_page(tid, false, false)?;
            }
            Some(current) => {
                self.flush_reservations(current.page)?;
                self.container.get(current.page, &mut self.target_buf)?;
                {
                    let page = RecordPageRef::new(&self.target_buf);
                    let (_, is_link) = page.record(current.record)?;
                    if is_link {
                        return Err(XxlError::LinkDepthExceeded {
                            page_id: current.page,
                            record_nr: current.record,
                        });
                    }
                }
                self.remove_from_page(current, true, false)?;
                self.remove_from_page(tid, false, true)?;
            }
        }
        self.tid_manager.remove(id)
    }

    /// Removes all records, pages, and ids.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.container.clear();
        self.tid_manager.remove_all();
        self.strategy.init(&self.pages, self.page_size);
    }

    /// Returns true if `id` refers to a live record.
    #[must_use]
    pub fn is_used(&self, id: RecordId) -> bool {
        self.tid_manager.query(id).is_some()
    }

    /// Returns the number of records (links excluded).
    #[must_use]
    pub fn size(&self) -> usize {
        self.pages.values().map(|pi| pi.num_records() as usize).sum()
    }

    /// Returns the bytes of all stored records together (link payload
    /// bytes included).
    #[must_use]
    pub fn size_of_all_stored_records(&self) -> u64 {
        self.pages.values().map(|pi| u64::from(pi.bytes_used())).sum()
    }

    /// Returns the number of pages in use.
    #[must_use]
    pub fn number_of_pages(&self) -> usize {
        self.pages.len()
    }

    /// Returns the fraction of page space occupied by record bytes.
    ///
    /// The optimum is below 1.0 because headers and directories also take
    /// space.
    #[must_use]
    pub fn space_usage(&self) -> f64 {
        if self.pages.is_empty() {
            return 0.0;
        }
        self.size_of_all_stored_records() as f64 / (self.pages.len() * self.page_size) as f64
    }

    /// Returns a snapshot of the manager's metrics.
    #[must_use]
    pub fn stats(&self) -> RecordManagerStats {
        RecordManagerStats {
            records: self.size(),
            stored_bytes: self.size_of_all_stored_records(),
            pages: self.number_of_pages(),
            space_usage: self.space_usage(),
        }
    }

    /// Returns the serialized size of a public id in bytes.
    #[must_use]
    pub fn id_size(&self) -> usize {
        self.tid_manager.id_size()
    }

    /// Serializes a public id.
    #[must_use]
    pub fn encode_id(&self, id: RecordId) -> Vec<u8> {
        self.tid_manager.encode_id(id)
    }

    /// Deserializes a public id.
    pub fn decode_id(&self, bytes: &[u8]) -> XxlResult<RecordId> {
        self.tid_manager.decode_id(bytes)
    }

    /// Verifies the in-memory accounting against every page's header.
    ///
    /// A failure is fatal: the instance should be discarded.
    pub fn check_consistency(&mut self) -> XxlResult<()> {
        let ids: Vec<PageId> = self.pages.keys().copied().collect();
        for page_id in ids {
            self.container.get(page_id, &mut self.scratch_buf)?;
            let page = RecordPageRef::new(&self.scratch_buf);
            let (records, links, bytes) = (
                page.record_count(),
                page.link_record_count(),
                page.bytes_used(),
            );
            let pi = self.pages.get(&page_id).expect("snapshotted key");
            pi.check_consistency(page_id, records, links, bytes, true)?;
        }
        Ok(())
    }

    /// Returns a cursor over all live public ids.
    ///
    /// Removals requested through the cursor are deferred and applied once
    /// the cursor is exhausted, so the walk never observes its own
    /// mutations.
    pub fn ids(&mut self) -> IdCursor<'_, C> {
        let source = match self.tid_manager.ids() {
            Some(list) => IdSource::Managed(list.into()),
            None => IdSource::PageWalk {
                pages: self.pages.keys().copied().collect(),
                current: VecDeque::new(),
            },
        };
        IdCursor {
            manager: self,
            source,
            deferred: Vec::new(),
            done: false,
        }
    }

    /// Serializes the pages map into `sink`.
    ///
    /// Call after [`close`](Self::close) to persist the manager's state.
    pub fn write<W: Write>(&self, sink: &mut W) -> XxlResult<()> {
        bincode::serialize_into(sink, &self.pages)?;
        Ok(())
    }

    /// Restores the pages map from `source` and re-initializes the
    /// strategy against it.
    pub fn read<R: Read>(&mut self, source: &mut R) -> XxlResult<()> {
        self.pages = bincode::deserialize_from(source)?;
        self.strategy.init(&self.pages, self.page_size);
        Ok(())
    }

    /// Closes the manager: flushes outstanding reservations and releases
    /// strategy and TID-manager resources. State can still be saved with
    /// [`write`](Self::write) afterwards.
    pub fn close(&mut self) -> XxlResult<()> {
        let pending: Vec<PageId> = self
            .pages
            .iter()
            .filter(|(_, pi)| pi.has_reservations())
            .map(|(&id, _)| id)
            .collect();
        for page_id in pending {
            self.flush_reservations(page_id)?;
        }
        self.strategy.close();
        self.tid_manager.close();
        Ok(())
    }
}

/// Metrics snapshot of a record manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordManagerStats {
    /// Number of records (links excluded).
    pub records: usize,
    /// Bytes of all stored records (link payloads included).
    pub stored_bytes: u64,
    /// Number of pages in use.
    pub pages: usize,
    /// Fraction of page space occupied by record bytes.
    pub space_usage: f64,
}

impl fmt::Display for RecordManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records, {} bytes in {} pages ({:.1}% used)",
            self.records,
            self.stored_bytes,
            self.pages,
            self.space_usage * 100.0
        )
    }
}

enum IdSource {
    Managed(VecDeque<RecordId>),
    PageWalk {
        pages: VecDeque<PageId>,
        current: VecDeque<RecordId>,
    },
}

/// A cursor over the live ids of a record manager.
///
/// Deletions are batched: [`defer_remove`](Self::defer_remove) queues an
/// id, and the queued removals run when the cursor reaches its end.
pub struct IdCursor<'a, C: BlockContainer> {
    manager: &'a mut RecordManager<C>,
    source: IdSource,
    deferred: Vec<RecordId>,
    done: bool,
}

impl<C: BlockContainer> IdCursor<'_, C> {
    /// Advances the cursor. Returns `Ok(None)` once exhausted, at which
    /// point all deferred removals have been applied.
    pub fn next(&mut self) -> XxlResult<Option<RecordId>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let queued = match &mut self.source {
                IdSource::Managed(queue) => queue.pop_front(),
                IdSource::PageWalk { current, .. } => current.pop_front(),
            };
            if let Some(id) = queued {
                return Ok(Some(id));
            }

            let next_page = match &mut self.source {
                IdSource::Managed(_) => None,
                IdSource::PageWalk { pages, .. } => pages.pop_front(),
            };
            let Some(page_id) = next_page else {
                return self.finish();
            };

            let mut found = Vec::new();
            self.manager
                .container
                .get(page_id, &mut self.manager.scratch_buf)?;
            {
                let page = RecordPageRef::new(&self.manager.scratch_buf);
                for record_nr in page.record_numbers_without_links() {
                    found.push(RecordId::Tid(Tid::new(page_id, record_nr)));
                }
            }
            // Reserved record numbers are live records too, even though
            // they are not in the directory yet.
            if let Some(pi) = self.manager.pages.get(&page_id) {
                for record_nr in pi.reservation_record_numbers() {
                    found.push(RecordId::Tid(Tid::new(page_id, record_nr)));
                }
            }
            if let IdSource::PageWalk { current, .. } = &mut self.source {
                current.extend(found);
            }
        }
    }

    /// Queues `id` for removal once the cursor is exhausted.
    pub fn defer_remove(&mut self, id: RecordId) {
        self.deferred.push(id);
    }

    fn finish(&mut self) -> XxlResult<Option<RecordId>> {
        self.done = true;
        for id in std::mem::take(&mut self.deferred) {
            self.manager.remove(id)?;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainer;
    use crate::strategy::FirstFitStrategy;
    use crate::tid_manager::{DirectTidManager, MappedTidManager};

    const PAGE_SIZE: usize = 128;

    fn new_manager(page_size: usize, direct_reserves: usize) -> RecordManager<MemoryContainer> {
        RecordManager::new(
            MemoryContainer::new(page_size),
            page_size,
            Box::new(FirstFitStrategy::new()),
            Box::new(DirectTidManager::new()),
            direct_reserves,
        )
        .unwrap()
    }

    fn new_mapped_manager(page_size: usize) -> RecordManager<MemoryContainer> {
        RecordManager::new(
            MemoryContainer::new(page_size),
            page_size,
            Box::new(FirstFitStrategy::new()),
            Box::new(MappedTidManager::new()),
            4,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let id = manager.insert(b"hello world").unwrap();
        assert_eq!(&manager.get(id).unwrap()[..], b"hello world");
        assert_eq!(manager.size(), 1);
        assert_eq!(manager.number_of_pages(), 1);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_records_share_pages() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let a = manager.insert(&[1u8; 30]).unwrap();
        let b = manager.insert(&[2u8; 30]).unwrap();
        assert_eq!(manager.number_of_pages(), 1);
        assert_eq!(&manager.get(a).unwrap()[..], &[1u8; 30][..]);
        assert_eq!(&manager.get(b).unwrap()[..], &[2u8; 30][..]);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_update_in_place() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let id = manager.insert(&[1u8; 30]).unwrap();
        manager.update(id, &[9u8; 20]).unwrap();
        assert_eq!(&manager.get(id).unwrap()[..], &[9u8; 20][..]);
        assert_eq!(manager.number_of_pages(), 1);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_update_grows_with_link() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let a = manager.insert(&[1u8; 50]).unwrap();
        let _b = manager.insert(&[2u8; 50]).unwrap();
        assert_eq!(manager.number_of_pages(), 1);

        manager.update(a, &[7u8; 100]).unwrap();
        assert_eq!(&manager.get(a).unwrap()[..], &[7u8; 100][..]);
        assert_eq!(manager.number_of_pages(), 2);
        assert_eq!(manager.size(), 2);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_update_through_link_stays_stable() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let a = manager.insert(&[1u8; 50]).unwrap();
        let _b = manager.insert(&[2u8; 50]).unwrap();
        manager.update(a, &[7u8; 100]).unwrap();

        // Update again through the link, still too big for the home page.
        manager.update(a, &[8u8; 90]).unwrap();
        assert_eq!(&manager.get(a).unwrap()[..], &[8u8; 90][..]);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_update_collapses_link_when_it_fits_home() {
        let mut manager = new_manager(256, 0);
        let a = manager.insert(&[1u8; 50]).unwrap();
        let b = manager.insert(&[2u8; 170]).unwrap();
        // Growing `a` moves it to a second page, leaving a link behind.
        manager.update(a, &[7u8; 120]).unwrap();
        assert_eq!(manager.number_of_pages(), 2);
        // Fill the second page so it cannot absorb further growth, then
        // free up the home page.
        let _d = manager.insert(&[4u8; 110]).unwrap();
        manager.remove(b).unwrap();

        // Growth no longer fits next to the filler, but the home page can
        // host the payload in place of the link.
        manager.update(a, &[3u8; 130]).unwrap();
        assert_eq!(&manager.get(a).unwrap()[..], &[3u8; 130][..]);
        assert_eq!(manager.number_of_pages(), 2);
        assert_eq!(manager.size(), 2);
        // No link record remains: stored bytes are exactly the payloads.
        assert_eq!(manager.size_of_all_stored_records(), 130 + 110);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_mapped_manager_rewrites_instead_of_linking() {
        let mut manager = new_mapped_manager(PAGE_SIZE);
        let a = manager.insert(&[1u8; 50]).unwrap();
        let _b = manager.insert(&[2u8; 50]).unwrap();
        manager.update(a, &[7u8; 100]).unwrap();

        assert_eq!(&manager.get(a).unwrap()[..], &[7u8; 100][..]);
        // No link record anywhere: stored bytes are exactly the payloads.
        assert_eq!(manager.size_of_all_stored_records(), 150);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_reclaims_empty_page() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let id = manager.insert(&[1u8; 30]).unwrap();
        manager.remove(id).unwrap();
        assert_eq!(manager.number_of_pages(), 0);
        assert_eq!(manager.size(), 0);
        assert!(manager.container().is_empty());
        assert!(manager.get(id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_through_link_removes_both() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let a = manager.insert(&[1u8; 50]).unwrap();
        let _b = manager.insert(&[2u8; 50]).unwrap();
        manager.update(a, &[7u8; 100]).unwrap();
        assert_eq!(manager.number_of_pages(), 2);

        manager.remove(a).unwrap();
        // The payload page is gone and the link is gone from the home page.
        assert_eq!(manager.number_of_pages(), 1);
        assert_eq!(manager.size(), 1);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_reserve_serves_payload_from_memory() {
        let mut manager = new_manager(PAGE_SIZE, 2);
        let _a = manager.insert(&[1u8; 20]).unwrap();
        let id = manager
            .reserve(|| Bytes::copy_from_slice(&[5u8; 10]))
            .unwrap();
        assert_eq!(&manager.get(id).unwrap()[..], &[5u8; 10][..]);
        assert_eq!(manager.size(), 2);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_reserved_record_survives_flush() {
        let mut manager = new_manager(PAGE_SIZE, 2);
        let _a = manager.insert(&[1u8; 20]).unwrap();
        let id = manager
            .reserve(|| Bytes::copy_from_slice(&[5u8; 10]))
            .unwrap();
        // A later insert on the same page materializes the reservation.
        let _c = manager.insert(&[2u8; 20]).unwrap();
        assert_eq!(&manager.get(id).unwrap()[..], &[5u8; 10][..]);
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let too_big = vec![0u8; manager.max_record_size() + 1];
        let err = manager.insert(&too_big).unwrap_err();
        assert_eq!(err.kind(), xxl_common::ErrorKind::SizeExceeded);
        assert_eq!(manager.size(), 0);
        assert_eq!(manager.number_of_pages(), 0);
    }

    #[test]
    fn test_clear() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let id = manager.insert(&[1u8; 10]).unwrap();
        manager.clear();
        assert_eq!(manager.size(), 0);
        assert_eq!(manager.number_of_pages(), 0);
        assert!(manager.container().is_empty());
        assert!(manager.get(id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_ids_cursor_with_deferred_removal() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        let a = manager.insert(&[1u8; 10]).unwrap();
        let b = manager.insert(&[2u8; 10]).unwrap();
        let c = manager.insert(&[3u8; 10]).unwrap();

        let mut seen = Vec::new();
        let mut cursor = manager.ids();
        while let Some(id) = cursor.next().unwrap() {
            seen.push(id);
            if id == b {
                cursor.defer_remove(id);
            }
        }
        assert_eq!(seen.len(), 3);

        assert_eq!(manager.size(), 2);
        assert!(manager.get(a).is_ok());
        assert!(manager.get(b).unwrap_err().is_not_found());
        assert!(manager.get(c).is_ok());
        manager.check_consistency().unwrap();
    }

    #[test]
    fn test_persistence_roundtrip() {
        let container = MemoryContainer::new(PAGE_SIZE);
        let mut manager = RecordManager::new(
            container.clone(),
            PAGE_SIZE,
            Box::new(FirstFitStrategy::new()),
            Box::new(DirectTidManager::new()),
            2,
        )
        .unwrap();
        let a = manager.insert(&[1u8; 30]).unwrap();
        let b = manager.insert(&[2u8; 40]).unwrap();
        manager.close().unwrap();

        let mut snapshot = Vec::new();
        manager.write(&mut snapshot).unwrap();

        let mut restored = RecordManager::new(
            container,
            PAGE_SIZE,
            Box::new(FirstFitStrategy::new()),
            Box::new(DirectTidManager::new()),
            2,
        )
        .unwrap();
        restored.read(&mut snapshot.as_slice()).unwrap();

        assert_eq!(restored.size(), 2);
        assert_eq!(&restored.get(a).unwrap()[..], &[1u8; 30][..]);
        assert_eq!(&restored.get(b).unwrap()[..], &[2u8; 40][..]);
        restored.check_consistency().unwrap();
    }

    #[test]
    fn test_stats_display() {
        let mut manager = new_manager(PAGE_SIZE, 0);
        manager.insert(&[1u8; 30]).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.stored_bytes, 30);
        assert_eq!(stats.pages, 1);
        assert!(stats.to_string().contains("1 records"));
    }
}
