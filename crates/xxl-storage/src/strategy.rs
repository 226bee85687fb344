//! Placement strategies: choosing the page that hosts a new record.
//!
//! Strategies see every accounting change through notification hooks and
//! answer one question: which live page can take a record of a given size.
//! They never perform I/O; decisions are made from the in-memory
//! [`PagesMap`] alone.

use xxl_common::types::PageId;

use crate::page_info::{PageInformation, PagesMap};

/// Decides which page hosts a new record.
///
/// The pages map is passed by reference on every call; strategies may keep
/// derived indexes of their own, maintained through the notification
/// hooks.
pub trait PlacementStrategy {
    /// Called once after construction and again after every reload of the
    /// pages map.
    fn init(&mut self, pages: &PagesMap, page_size: usize);

    /// Returns a page with room for a record of `size` bytes (directory
    /// entry included), or `None` if a new page must be allocated.
    fn page_for_record(&mut self, pages: &PagesMap, size: usize) -> Option<PageId>;

    /// Notification: a page was added to the map.
    fn page_inserted(&mut self, page_id: PageId, pi: &PageInformation);

    /// Notification: a page was removed from the map.
    fn page_removed(&mut self, page_id: PageId, pi: &PageInformation);

    /// Notification: a page's accounting changed by `bytes_delta` bytes
    /// for record `record_nr`.
    fn record_updated(
        &mut self,
        page_id: PageId,
        pi: &PageInformation,
        record_nr: i16,
        bytes_delta: i64,
    );

    /// Releases strategy resources.
    fn close(&mut self) {}
}

/// Reference strategy: the first page that fits, lowest page id first.
///
/// Scans the ordered pages map front to back, so ties always resolve to
/// the lowest page id.
#[derive(Debug, Default)]
pub struct FirstFitStrategy {
    page_size: usize,
}

impl FirstFitStrategy {
    /// Creates a new first-fit strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlacementStrategy for FirstFitStrategy {
    fn init(&mut self, _pages: &PagesMap, page_size: usize) {
        self.page_size = page_size;
    }

    fn page_for_record(&mut self, pages: &PagesMap, size: usize) -> Option<PageId> {
        pages
            .iter()
            .find(|(_, pi)| pi.bytes_free_after_possible_reservation(self.page_size, size) >= 0)
            .map(|(&id, _)| id)
    }

    fn page_inserted(&mut self, _page_id: PageId, _pi: &PageInformation) {}

    fn page_removed(&mut self, _page_id: PageId, _pi: &PageInformation) {}

    fn record_updated(
        &mut self,
        _page_id: PageId,
        _pi: &PageInformation,
        _record_nr: i16,
        _bytes_delta: i64,
    ) {
    }
}

/// Best-fit strategy: the page whose free space leaves the smallest
/// non-negative leftover, ties to the lowest page id.
///
/// Packs pages tighter than first fit at the cost of a full scan per
/// placement.
#[derive(Debug, Default)]
pub struct BestFitStrategy {
    page_size: usize,
}

impl BestFitStrategy {
    /// Creates a new best-fit strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlacementStrategy for BestFitStrategy {
    fn init(&mut self, _pages: &PagesMap, page_size: usize) {
        self.page_size = page_size;
    }

    fn page_for_record(&mut self, pages: &PagesMap, size: usize) -> Option<PageId> {
        let mut best: Option<(PageId, i64)> = None;
        for (&id, pi) in pages {
            let leftover = pi.bytes_free_after_possible_reservation(self.page_size, size);
            if leftover < 0 {
                continue;
            }
            match best {
                Some((_, best_leftover)) if best_leftover <= leftover => {}
                _ => best = Some((id, leftover)),
            }
        }
        best.map(|(id, _)| id)
    }

    fn page_inserted(&mut self, _page_id: PageId, _pi: &PageInformation) {}

    fn page_removed(&mut self, _page_id: PageId, _pi: &PageInformation) {}

    fn record_updated(
        &mut self,
        _page_id: PageId,
        _pi: &PageInformation,
        _record_nr: i16,
        _bytes_delta: i64,
    ) {
    }
}
