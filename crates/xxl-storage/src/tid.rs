//! Tuple identifiers and public record identifiers.
//!
//! A [`Tid`] addresses a record inside the record manager: the page that
//! hosts it and its record number within that page. The fixed wire format
//! (big-endian page id followed by a big-endian signed record number) is
//! what link records carry as their body.
//!
//! A [`RecordId`] is what callers hold. Depending on the TID manager it is
//! either the TID itself or a synthetic dense identifier backed by a
//! mapping table; either way it stays valid until the record is removed.

use std::fmt;

use xxl_common::constants::{PAGE_ID_SIZE, TID_SIZE};
use xxl_common::error::{XxlError, XxlResult};
use xxl_common::types::PageId;

/// A tuple identifier: `{page, record}`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid {
    /// The page hosting the record.
    pub page: PageId,
    /// The record number within the page.
    pub record: i16,
}

impl Tid {
    /// Serialized size of a TID in bytes.
    pub const SIZE: usize = TID_SIZE;

    /// Creates a new TID.
    #[inline]
    #[must_use]
    pub const fn new(page: PageId, record: i16) -> Self {
        Self { page, record }
    }

    /// Converts to the fixed wire format.
    #[inline]
    #[must_use]
    pub fn to_bytes(self) -> [u8; TID_SIZE] {
        let mut bytes = [0u8; TID_SIZE];
        bytes[..PAGE_ID_SIZE].copy_from_slice(&self.page.to_be_bytes());
        bytes[PAGE_ID_SIZE..].copy_from_slice(&self.record.to_be_bytes());
        bytes
    }

    /// Parses the fixed wire format.
    pub fn from_bytes(bytes: &[u8]) -> XxlResult<Self> {
        if bytes.len() != TID_SIZE {
            return Err(XxlError::invariant(format!(
                "TID payload of {} bytes, expected {}",
                bytes.len(),
                TID_SIZE
            )));
        }
        let page = PageId::from_be_bytes(bytes[..PAGE_ID_SIZE].try_into().unwrap());
        let record = i16::from_be_bytes(bytes[PAGE_ID_SIZE..].try_into().unwrap());
        Ok(Self { page, record })
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({}:{})", self.page, self.record)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.record)
    }
}

/// Public identifier handed out by a record manager.
///
/// The variant in use is fixed per manager by its TID manager; callers
/// treat the value as opaque.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordId {
    /// The tuple identifier itself (link mode).
    Tid(Tid),
    /// A synthetic dense identifier backed by a mapping table.
    Mapped(u64),
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tid(tid) => write!(f, "RecordId({})", tid),
            Self::Mapped(id) => write!(f, "RecordId(#{})", id),
        }
    }
}
