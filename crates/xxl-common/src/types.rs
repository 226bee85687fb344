//! Core identifier types for XXL.
//!
//! A page id is the container key of one page. The record manager asks
//! little of it: a total order (the pages map is sorted by page id, and
//! placement strategies break ties toward the lowest id) and the fixed
//! big-endian encoding that TIDs embed. Allocation state lives in the
//! container, so the id type carries no sentinel or successor surface.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::PAGE_ID_SIZE;

/// Page identifier - the container key of one page.
///
/// Identifiers are issued by a container and never reused.
///
/// # Example
///
/// ```rust
/// use xxl_common::types::PageId;
///
/// let page = PageId::new(42);
/// assert!(page < PageId::new(43));
/// assert_eq!(page.to_string(), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageId(u64);

impl PageId {
    /// Creates a page id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Decodes a page id from its fixed wire encoding.
    #[inline]
    #[must_use]
    pub fn from_be_bytes(bytes: [u8; PAGE_ID_SIZE]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Encodes the page id into its fixed wire encoding (big-endian, so
    /// encoded ids sort like their numeric values).
    #[inline]
    #[must_use]
    pub fn to_be_bytes(self) -> [u8; PAGE_ID_SIZE] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        for raw in [0u64, 1, 0xDEAD_BEEF, u64::MAX] {
            let id = PageId::new(raw);
            assert_eq!(PageId::from_be_bytes(id.to_be_bytes()), id);
        }
    }

    #[test]
    fn test_wire_order_matches_numeric_order() {
        // The pages map sorts by id; the encoding must agree with it.
        let small = PageId::new(3).to_be_bytes();
        let large = PageId::new(0x0100).to_be_bytes();
        assert!(small < large);
    }

    #[test]
    fn test_display() {
        assert_eq!(PageId::new(42).to_string(), "42");
    }
}
