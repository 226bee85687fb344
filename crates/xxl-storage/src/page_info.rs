//! In-memory page accounting.
//!
//! The record manager keeps one [`PageInformation`] per live page. It
//! mirrors the page's header counters without touching the container and
//! additionally holds *reservations*: record numbers (with their payloads)
//! allocated in memory that have not been written into the page's
//! directory yet.
//!
//! Invariants maintained against the on-page state:
//!
//! - `page.record_count == num_records + num_link_records - pending reservations`
//! - `page.bytes_used == bytes_used - pending reservation bytes`
//! - `min_record_nr <= every assigned record number <= max_record_nr`
//!
//! `min_record_nr`/`max_record_nr` only widen; after removes they may be
//! stale, which is safe because fresh numbers are always taken from
//! `min - 1` or `max + 1`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use xxl_common::constants::MAX_RECORDS_PER_PAGE;
use xxl_common::error::{XxlError, XxlResult};
use xxl_common::types::PageId;

use crate::page::occupied_size;

/// The sorted mapping from page ids to their in-memory accounting.
///
/// This map is the record manager's persisted state: it is serialized as a
/// single snapshot on shutdown and reloaded on startup.
pub type PagesMap = BTreeMap<PageId, PageInformation>;

/// A record number allocated in memory, with its payload retained until it
/// is materialized into the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// The reserved record number.
    pub record_nr: i16,
    /// The record bytes produced at reservation time.
    pub payload: Vec<u8>,
}

/// Per-page accounting kept in memory. Performs no I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInformation {
    /// Number of proper records inside the page (links excluded).
    num_records: u16,
    /// Number of link records inside the page.
    num_link_records: u16,
    /// Bytes used by record data (links included).
    bytes_used: u32,
    /// Smallest record number ever assigned, `-1` when none yet.
    min_record_nr: i16,
    /// Largest record number ever assigned, `-1` when none yet.
    max_record_nr: i16,
    /// Reservations not yet materialized into the page.
    reservations: Vec<Reservation>,
}

impl PageInformation {
    /// Creates accounting for a fresh, empty page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_records: 0,
            num_link_records: 0,
            bytes_used: 0,
            min_record_nr: -1,
            max_record_nr: -1,
            reservations: Vec::new(),
        }
    }

    /// Number of proper records (links excluded).
    #[inline]
    #[must_use]
    pub fn num_records(&self) -> u16 {
        self.num_records
    }

    /// Number of link records.
    #[inline]
    #[must_use]
    pub fn num_link_records(&self) -> u16 {
        self.num_link_records
    }

    /// Number of directory entries the page accounts for (links included).
    #[inline]
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.num_records as usize + self.num_link_records as usize
    }

    /// Bytes used by record data (links included).
    #[inline]
    #[must_use]
    pub fn bytes_used(&self) -> u32 {
        self.bytes_used
    }

    /// Applies an accounting delta after a page mutation or reservation.
    ///
    /// `records_delta` and `links_delta` must be `-1`, `0`, or `+1`.
    /// Violated bounds indicate a bug and are reported as
    /// [`XxlError::InvariantViolation`].
    pub fn update_accounting(
        &mut self,
        record_nr: i16,
        records_delta: i32,
        bytes_delta: i64,
        links_delta: i32,
        page_size: usize,
    ) -> XxlResult<()> {
        if record_nr >= 0 {
            if self.min_record_nr == -1 {
                self.min_record_nr = record_nr;
                self.max_record_nr = record_nr;
            } else {
                self.min_record_nr = self.min_record_nr.min(record_nr);
                self.max_record_nr = self.max_record_nr.max(record_nr);
            }
        }

        if (records_delta > 0 || links_delta > 0) && self.total_records() >= MAX_RECORDS_PER_PAGE {
            return Err(XxlError::CapacityExceeded {
                max: MAX_RECORDS_PER_PAGE,
            });
        }

        let records = i32::from(self.num_records) + records_delta;
        let links = i32::from(self.num_link_records) + links_delta;
        let bytes = i64::from(self.bytes_used) + bytes_delta;

        if records < 0 {
            return Err(XxlError::invariant("record count dropped below zero"));
        }
        if links < 0 {
            return Err(XxlError::invariant("link record count dropped below zero"));
        }
        if bytes < 0 {
            return Err(XxlError::invariant("bytes used dropped below zero"));
        }
        if bytes as usize > page_size {
            return Err(XxlError::invariant(format!(
                "bytes used {} exceed page size {}",
                bytes, page_size
            )));
        }

        self.num_records = records as u16;
        self.num_link_records = links as u16;
        self.bytes_used = bytes as u32;

        let needed = occupied_size(self.total_records(), self.bytes_used as usize);
        if needed > page_size {
            return Err(XxlError::invariant(format!(
                "page contents of {} bytes exceed page size {}",
                needed, page_size
            )));
        }
        Ok(())
    }

    /// Bytes that would stay free after reserving `bytes` more for one
    /// more record. Negative means the reservation is not possible.
    #[must_use]
    pub fn bytes_free_after_possible_reservation(&self, page_size: usize, bytes: usize) -> i64 {
        page_size as i64
            - occupied_size(self.total_records() + 1, self.bytes_used as usize + bytes) as i64
    }

    /// Returns true if an in-memory reservation slot is available.
    #[must_use]
    pub fn is_reservation_possible(&self, direct_reserves: usize) -> bool {
        self.reservations.len() < direct_reserves
    }

    /// Tries to allocate a record number in memory, without touching the
    /// page.
    ///
    /// Returns `None` when no slot is free or the `min - 1`/`max + 1` rule
    /// cannot produce a number; the caller then falls back to the on-page
    /// path. Accounting counters are *not* updated here; the caller applies
    /// [`update_accounting`](Self::update_accounting) itself.
    pub fn try_reserve_record_nr(
        &mut self,
        payload: &[u8],
        page_size: usize,
        direct_reserves: usize,
    ) -> XxlResult<Option<i16>> {
        if self.bytes_free_after_possible_reservation(page_size, payload.len()) < 0 {
            return Err(XxlError::PageOverflow {
                needed: occupied_size(self.total_records() + 1, self.bytes_used as usize)
                    + payload.len(),
                page_size,
            });
        }
        if !self.is_reservation_possible(direct_reserves)
            || self.total_records() >= MAX_RECORDS_PER_PAGE
        {
            return Ok(None);
        }

        let record_nr = if self.min_record_nr > 0 {
            self.min_record_nr -= 1;
            self.min_record_nr
        } else if self.max_record_nr < i16::MAX {
            self.max_record_nr += 1;
            self.max_record_nr
        } else {
            return Ok(None);
        };

        self.reservations.push(Reservation {
            record_nr,
            payload: payload.to_vec(),
        });
        Ok(Some(record_nr))
    }

    /// Returns the pending reservation for `record_nr`, if any.
    #[must_use]
    pub fn reservation(&self, record_nr: i16) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.record_nr == record_nr)
    }

    /// Returns true if reservations are pending materialization.
    #[must_use]
    pub fn has_reservations(&self) -> bool {
        !self.reservations.is_empty()
    }

    /// Takes all pending reservations for materialization into the page.
    pub fn take_reservations(&mut self) -> Vec<Reservation> {
        std::mem::take(&mut self.reservations)
    }

    /// Number of reservations pending materialization.
    #[must_use]
    pub fn pending_reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Record numbers of reservations pending materialization.
    pub fn reservation_record_numbers(&self) -> impl Iterator<Item = i16> + '_ {
        self.reservations.iter().map(|r| r.record_nr)
    }

    /// Bytes held by reservations pending materialization.
    #[must_use]
    pub fn pending_reservation_bytes(&self) -> usize {
        self.reservations.iter().map(|r| r.payload.len()).sum()
    }

    /// Checks this accounting against the page's own header counters.
    ///
    /// `full_check` also compares the link count, which requires a
    /// directory scan on the caller's side.
    pub fn check_consistency(
        &self,
        page_id: PageId,
        page_records: u16,
        page_links: u16,
        page_bytes: u32,
        full_check: bool,
    ) -> XxlResult<()> {
        let expected_records = self.total_records() - self.pending_reservation_count();
        if page_records as usize != expected_records {
            return Err(XxlError::invariant(format!(
                "page {}: {} directory entries, accounting expects {}",
                page_id, page_records, expected_records
            )));
        }
        let expected_bytes = self.bytes_used as usize - self.pending_reservation_bytes();
        if page_bytes as usize != expected_bytes {
            return Err(XxlError::invariant(format!(
                "page {}: {} bytes used, accounting expects {}",
                page_id, page_bytes, expected_bytes
            )));
        }
        if full_check && page_links != self.num_link_records {
            return Err(XxlError::invariant(format!(
                "page {}: {} link records, accounting expects {}",
                page_id, page_links, self.num_link_records
            )));
        }
        Ok(())
    }
}

impl Default for PageInformation {
    fn default() -> Self {
        Self::new()
    }
}
