//! Record pages: directory-keyed views over page buffers.
//!
//! [`RecordPage`] is a mutable view used for all page mutations;
//! [`RecordPageRef`] is its read-only twin for cheap header/directory
//! traversal. Both operate directly on the block bytes, so serializing a
//! page is a plain buffer copy.

use super::header::{read_bytes_used, read_record_count, PageHeader, PAGE_HEADER_SIZE};
use super::{max_record_size, occupied_size};

use xxl_common::constants::MAX_RECORDS_PER_PAGE;
use xxl_common::error::{XxlError, XxlResult};

/// Size of a directory entry in bytes.
pub const DIR_ENTRY_SIZE: usize = 8;

/// Flag bit marking a link record.
const FLAG_LINK: u8 = 0b0000_0001;

/// A directory entry.
///
/// Each entry is 8 bytes: record_nr (2), offset (2), length (2), flags (1),
/// reserved (1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// The record number this entry is keyed by. Non-negative.
    pub record_nr: i16,
    /// Offset of the record data from the start of the page.
    pub offset: u16,
    /// Length of the record data in bytes.
    pub length: u16,
    /// True if the record body is a serialized forwarding TID.
    pub is_link: bool,
}

impl DirEntry {
    /// Reads an entry from bytes.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= DIR_ENTRY_SIZE);
        Self {
            record_nr: i16::from_le_bytes([bytes[0], bytes[1]]),
            offset: u16::from_le_bytes([bytes[2], bytes[3]]),
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
            is_link: bytes[6] & FLAG_LINK != 0,
        }
    }

    /// Writes the entry to bytes.
    #[inline]
    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut bytes = [0u8; DIR_ENTRY_SIZE];
        bytes[0..2].copy_from_slice(&self.record_nr.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.length.to_le_bytes());
        bytes[6] = if self.is_link { FLAG_LINK } else { 0 };
        bytes
    }
}

#[inline]
fn entry_at(data: &[u8], idx: usize) -> DirEntry {
    let off = PAGE_HEADER_SIZE + idx * DIR_ENTRY_SIZE;
    DirEntry::from_bytes(&data[off..off + DIR_ENTRY_SIZE])
}

#[inline]
fn write_entry(data: &mut [u8], idx: usize, entry: DirEntry) {
    let off = PAGE_HEADER_SIZE + idx * DIR_ENTRY_SIZE;
    data[off..off + DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
}

fn find_entry(data: &[u8], record_nr: i16) -> Option<(usize, DirEntry)> {
    let count = read_record_count(data) as usize;
    (0..count)
        .map(|i| (i, entry_at(data, i)))
        .find(|(_, e)| e.record_nr == record_nr)
}

fn read_record(data: &[u8], record_nr: i16) -> XxlResult<(&[u8], bool)> {
    let (_, entry) = find_entry(data, record_nr).ok_or(XxlError::RecordNotFound)?;
    let start = entry.offset as usize;
    let end = start + entry.length as usize;
    if end > data.len() {
        return Err(XxlError::invariant(format!(
            "directory entry {} points past the page end",
            record_nr
        )));
    }
    Ok((&data[start..end], entry.is_link))
}

fn link_count(data: &[u8]) -> u16 {
    let count = read_record_count(data) as usize;
    (0..count).filter(|&i| entry_at(data, i).is_link).count() as u16
}

fn free_record_number(data: &[u8]) -> XxlResult<i16> {
    let count = read_record_count(data) as usize;
    if count == 0 {
        return Ok(0);
    }
    let mut min = i16::MAX;
    let mut max = i16::MIN;
    for i in 0..count {
        let nr = entry_at(data, i).record_nr;
        min = min.min(nr);
        max = max.max(nr);
    }
    if min > 0 {
        Ok(min - 1)
    } else if max < i16::MAX {
        Ok(max + 1)
    } else {
        Err(XxlError::CapacityExceeded {
            max: MAX_RECORDS_PER_PAGE,
        })
    }
}

/// A mutable record-page view over a page buffer.
///
/// # Example
///
/// ```rust
/// use xxl_storage::page::RecordPage;
///
/// let mut buffer = vec![0u8; 128];
/// let mut page = RecordPage::new(&mut buffer);
/// page.initialize();
///
/// page.insert_record(b"hello", 0, false).unwrap();
/// let (data, is_link) = page.record(0).unwrap();
/// assert_eq!(data, b"hello");
/// assert!(!is_link);
/// ```
pub struct RecordPage<'a> {
    data: &'a mut [u8],
}

impl<'a> RecordPage<'a> {
    /// Creates a record-page view into the given buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than the page header.
    #[inline]
    pub fn new(data: &'a mut [u8]) -> Self {
        assert!(
            data.len() >= PAGE_HEADER_SIZE,
            "buffer too small for record page"
        );
        Self { data }
    }

    /// Resets the page to hold no records.
    pub fn initialize(&mut self) {
        self.data.fill(0);
    }

    /// Returns the page size.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    /// Returns the number of directory entries (links included).
    #[inline]
    pub fn record_count(&self) -> u16 {
        read_record_count(self.data)
    }

    /// Returns the number of link records.
    #[inline]
    pub fn link_record_count(&self) -> u16 {
        link_count(self.data)
    }

    /// Returns the number of record data bytes (links included).
    #[inline]
    pub fn bytes_used(&self) -> u32 {
        read_bytes_used(self.data)
    }

    /// Returns the record stored under `record_nr` and its link flag.
    pub fn record(&self, record_nr: i16) -> XxlResult<(&[u8], bool)> {
        read_record(self.data, record_nr)
    }

    /// Inserts a record under a record number not currently in use.
    ///
    /// Fails without side effects if the record is empty, oversized, or
    /// would not fit next to the existing contents.
    pub fn insert_record(&mut self, record: &[u8], record_nr: i16, is_link: bool) -> XxlResult<()> {
        let len = record.len();
        if len == 0 {
            return Err(XxlError::invalid_argument("empty records are not allowed"));
        }
        if record_nr < 0 {
            return Err(XxlError::invalid_argument(
                "record numbers must be non-negative",
            ));
        }
        let max = max_record_size(self.data.len());
        if len > max {
            return Err(XxlError::RecordTooLarge {
                size: len,
                max_size: max,
            });
        }
        let count = self.record_count() as usize;
        if count >= MAX_RECORDS_PER_PAGE {
            return Err(XxlError::CapacityExceeded {
                max: MAX_RECORDS_PER_PAGE,
            });
        }
        if find_entry(self.data, record_nr).is_some() {
            return Err(XxlError::invariant(format!(
                "record number {} is already in use",
                record_nr
            )));
        }
        let used = self.bytes_used() as usize;
        let needed = occupied_size(count + 1, used + len);
        if needed > self.data.len() {
            return Err(XxlError::PageOverflow {
                needed,
                page_size: self.data.len(),
            });
        }

        let offset = self.data.len() - used - len;
        self.data[offset..offset + len].copy_from_slice(record);
        write_entry(
            self.data,
            count,
            DirEntry {
                record_nr,
                offset: offset as u16,
                length: len as u16,
                is_link,
            },
        );

        let mut header = PageHeader::new(self.data);
        header.set_record_count((count + 1) as u16);
        header.set_bytes_used((used + len) as u32);
        Ok(())
    }

    /// Removes the record under `record_nr`, compacting the data region.
    ///
    /// Returns the number of freed data bytes.
    pub fn remove(&mut self, record_nr: i16) -> XxlResult<usize> {
        let (idx, entry) = find_entry(self.data, record_nr).ok_or(XxlError::RecordNotFound)?;
        let count = self.record_count() as usize;
        let used = self.bytes_used() as usize;
        let len = entry.length as usize;
        let off = entry.offset as usize;

        // Records inserted after this one live at lower offsets; shift them
        // up so the data region stays packed against the page end.
        let data_start = self.data.len() - used;
        self.data.copy_within(data_start..off, data_start + len);
        for i in 0..count {
            if i == idx {
                continue;
            }
            let mut e = entry_at(self.data, i);
            if (e.offset as usize) < off {
                e.offset += len as u16;
                write_entry(self.data, i, e);
            }
        }

        // Close the directory gap.
        let tail_start = PAGE_HEADER_SIZE + (idx + 1) * DIR_ENTRY_SIZE;
        let tail_end = PAGE_HEADER_SIZE + count * DIR_ENTRY_SIZE;
        self.data
            .copy_within(tail_start..tail_end, tail_start - DIR_ENTRY_SIZE);

        let mut header = PageHeader::new(self.data);
        header.set_record_count((count - 1) as u16);
        header.set_bytes_used((used - len) as u32);
        Ok(len)
    }

    /// Replaces a record in place.
    ///
    /// The new record must have exactly the old record's length; callers
    /// needing growth must `remove` and re-insert. The link flag may be
    /// flipped by a same-length update.
    pub fn update(&mut self, record: &[u8], record_nr: i16, is_link: bool) -> XxlResult<()> {
        let (idx, entry) = find_entry(self.data, record_nr).ok_or(XxlError::RecordNotFound)?;
        if record.len() != entry.length as usize {
            return Err(XxlError::invalid_argument(format!(
                "in-place update requires equal length (old {}, new {})",
                entry.length,
                record.len()
            )));
        }
        let start = entry.offset as usize;
        self.data[start..start + record.len()].copy_from_slice(record);
        write_entry(self.data, idx, DirEntry { is_link, ..entry });
        Ok(())
    }

    /// Returns a record number not currently in the directory.
    ///
    /// The choice is deterministic: `min - 1` while the smallest assigned
    /// number is positive, otherwise `max + 1`. An empty page yields `0`.
    pub fn free_record_number(&self) -> XxlResult<i16> {
        free_record_number(self.data)
    }

    /// Returns the record numbers of all non-link records, in directory
    /// order. The sequence is lazy and not restartable.
    pub fn record_numbers_without_links(&self) -> impl Iterator<Item = i16> + '_ {
        let count = self.record_count() as usize;
        (0..count)
            .map(|i| entry_at(self.data, i))
            .filter(|e| !e.is_link)
            .map(|e| e.record_nr)
    }
}

/// Read-only record-page view.
///
/// Only the header and directory are touched unless a record body is
/// requested, which keeps page traversal cheap.
pub struct RecordPageRef<'a> {
    data: &'a [u8],
}

impl<'a> RecordPageRef<'a> {
    /// Creates a read-only view into the given buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is smaller than the page header.
    #[inline]
    pub fn new(data: &'a [u8]) -> Self {
        assert!(
            data.len() >= PAGE_HEADER_SIZE,
            "buffer too small for record page"
        );
        Self { data }
    }

    /// Returns the number of directory entries (links included).
    #[inline]
    pub fn record_count(&self) -> u16 {
        read_record_count(self.data)
    }

    /// Returns the number of link records.
    #[inline]
    pub fn link_record_count(&self) -> u16 {
        link_count(self.data)
    }

    /// Returns the number of record data bytes (links included).
    #[inline]
    pub fn bytes_used(&self) -> u32 {
        read_bytes_used(self.data)
    }

    /// Returns the record stored under `record_nr` and its link flag.
    pub fn record(&self, record_nr: i16) -> XxlResult<(&'a [u8], bool)> {
        read_record(self.data, record_nr)
    }

    /// Returns the record numbers of all non-link records, in directory
    /// order.
    pub fn record_numbers_without_links(&self) -> impl Iterator<Item = i16> + 'a {
        let data = self.data;
        let count = read_record_count(data) as usize;
        (0..count)
            .map(move |i| entry_at(data, i))
            .filter(|e| !e.is_link)
            .map(|e| e.record_nr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xxl_common::error::ErrorKind;

    const TEST_PAGE_SIZE: usize = 256;

    fn new_page_buffer() -> Vec<u8> {
        vec![0u8; TEST_PAGE_SIZE]
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = DirEntry {
            record_nr: -3,
            offset: 0x1234,
            length: 0x0056,
            is_link: true,
        };
        assert_eq!(DirEntry::from_bytes(&entry.to_bytes()), entry);
    }

    #[test]
    fn test_insert_and_read() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(b"alpha", 0, false).unwrap();
        page.insert_record(b"beta", 1, true).unwrap();

        assert_eq!(page.record_count(), 2);
        assert_eq!(page.link_record_count(), 1);
        assert_eq!(page.bytes_used(), 9);

        let (data, is_link) = page.record(0).unwrap();
        assert_eq!(data, b"alpha");
        assert!(!is_link);

        let (data, is_link) = page.record(1).unwrap();
        assert_eq!(data, b"beta");
        assert!(is_link);
    }

    #[test]
    fn test_sparse_record_numbers() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(b"a", 5, false).unwrap();
        page.insert_record(b"b", 100, false).unwrap();
        assert_eq!(page.record(100).unwrap().0, b"b");
        assert!(page.record(6).unwrap_err().is_not_found());
    }

    #[test]
    fn test_duplicate_record_number_rejected() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(b"a", 0, false).unwrap();
        let err = page.insert_record(b"b", 0, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_remove_compacts_data() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(b"first", 0, false).unwrap();
        page.insert_record(b"second", 1, false).unwrap();
        page.insert_record(b"third", 2, false).unwrap();

        let freed = page.remove(1).unwrap();
        assert_eq!(freed, 6);
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.bytes_used(), 10);

        // Survivors keep their contents after compaction.
        assert_eq!(page.record(0).unwrap().0, b"first");
        assert_eq!(page.record(2).unwrap().0, b"third");
        assert!(page.record(1).unwrap_err().is_not_found());

        // The data region is packed again: a record exactly filling the
        // freed space fits.
        page.insert_record(b"fourth", 1, false).unwrap();
        assert_eq!(page.record(1).unwrap().0, b"fourth");
    }

    #[test]
    fn test_update_same_length_and_flag_flip() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(b"0123456789", 0, false).unwrap();
        page.update(b"abcdefghij", 0, true).unwrap();

        let (data, is_link) = page.record(0).unwrap();
        assert_eq!(data, b"abcdefghij");
        assert!(is_link);

        let err = page.update(b"too short", 0, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_free_record_number_rule() {
        let mut buffer = new_page_buffer();
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();
        assert_eq!(page.free_record_number().unwrap(), 0);

        page.insert_record(b"a", 5, false).unwrap();
        assert_eq!(page.free_record_number().unwrap(), 4);

        page.insert_record(b"b", 1, false).unwrap();
        assert_eq!(page.free_record_number().unwrap(), 0);

        page.insert_record(b"c", 0, false).unwrap();
        assert_eq!(page.free_record_number().unwrap(), 6);
    }

    #[test]
    fn test_overflow_rejected_without_side_effects() {
        let mut buffer = vec![0u8; 64];
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        page.insert_record(&[1u8; 30], 0, false).unwrap();
        let err = page.insert_record(&[2u8; 30], 1, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);

        assert_eq!(page.record_count(), 1);
        assert_eq!(page.bytes_used(), 30);
        assert_eq!(page.record(0).unwrap().0, &[1u8; 30][..]);
    }

    #[test]
    fn test_max_record_exactly_fits() {
        let mut buffer = vec![0u8; 64];
        let mut page = RecordPage::new(&mut buffer);
        page.initialize();

        let max = max_record_size(64);
        page.insert_record(&vec![3u8; max], 0, false).unwrap();
        assert_eq!(occupied_size(1, max), 64);
    }

    #[test]
    fn test_readonly_view_matches() {
        let mut buffer = new_page_buffer();
        {
            let mut page = RecordPage::new(&mut buffer);
            page.initialize();
            page.insert_record(b"data", 0, false).unwrap();
            page.insert_record(&[0u8; 10], 1, true).unwrap();
        }

        let page = RecordPageRef::new(&buffer);
        assert_eq!(page.record_count(), 2);
        assert_eq!(page.link_record_count(), 1);
        assert_eq!(page.bytes_used(), 14);
        assert_eq!(page.record(0).unwrap().0, b"data");

        let without_links: Vec<i16> = page.record_numbers_without_links().collect();
        assert_eq!(without_links, vec![0]);
    }
}
