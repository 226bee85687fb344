//! TID managers: the externally visible identifier namespace.
//!
//! A TID manager decides what a [`RecordId`] is and how record migration
//! stays invisible to callers. Two policies exist:
//!
//! - [`DirectTidManager`] hands out the TID itself. Updates that move a
//!   record leave a link record behind in the original page, so old ids
//!   keep resolving.
//! - [`MappedTidManager`] issues dense synthetic ids over an `id → TID`
//!   table and rewrites the table on migration; no links are needed.

use std::collections::BTreeMap;

use xxl_common::constants::TID_SIZE;
use xxl_common::error::{XxlError, XxlResult};

use crate::tid::{RecordId, Tid};

/// Owner of the externally visible identifier namespace.
pub trait TidManager {
    /// Registers a TID and returns the public id for it.
    fn insert(&mut self, tid: Tid) -> RecordId;

    /// Resolves a public id to its current TID, or `None` if unknown.
    fn query(&self, id: RecordId) -> Option<Tid>;

    /// Re-points a public id at a new TID after migration.
    ///
    /// Link-mode managers have nothing to rewrite and treat this as an
    /// error; the record manager writes a link record instead.
    fn update(&mut self, id: RecordId, tid: Tid) -> XxlResult<()>;

    /// Forgets a public id.
    fn remove(&mut self, id: RecordId) -> XxlResult<()>;

    /// Forgets all public ids.
    fn remove_all(&mut self);

    /// Returns all live public ids, or `None` if the manager keeps no
    /// table and the caller must walk pages to discover TIDs.
    fn ids(&self) -> Option<Vec<RecordId>>;

    /// Returns true if migrations leave link records behind.
    fn uses_links(&self) -> bool;

    /// Returns the serialized size of a public id in bytes.
    fn id_size(&self) -> usize;

    /// Serializes a public id.
    fn encode_id(&self, id: RecordId) -> Vec<u8>;

    /// Deserializes a public id.
    fn decode_id(&self, bytes: &[u8]) -> XxlResult<RecordId>;

    /// Releases manager resources.
    fn close(&mut self) {}
}

/// TID-as-id manager: public ids are the TIDs themselves.
///
/// Keeps no state; migrations are handled with link records.
#[derive(Debug, Default)]
pub struct DirectTidManager;

impl DirectTidManager {
    /// Creates a new direct TID manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TidManager for DirectTidManager {
    fn insert(&mut self, tid: Tid) -> RecordId {
        RecordId::Tid(tid)
    }

    fn query(&self, id: RecordId) -> Option<Tid> {
        match id {
            RecordId::Tid(tid) => Some(tid),
            RecordId::Mapped(_) => None,
        }
    }

    fn update(&mut self, id: RecordId, _tid: Tid) -> XxlResult<()> {
        Err(XxlError::invariant(format!(
            "direct TID manager cannot re-point {:?}; a link record is required",
            id
        )))
    }

    fn remove(&mut self, _id: RecordId) -> XxlResult<()> {
        Ok(())
    }

    fn remove_all(&mut self) {}

    fn ids(&self) -> Option<Vec<RecordId>> {
        None
    }

    fn uses_links(&self) -> bool {
        true
    }

    fn id_size(&self) -> usize {
        TID_SIZE
    }

    fn encode_id(&self, id: RecordId) -> Vec<u8> {
        match id {
            RecordId::Tid(tid) => tid.to_bytes().to_vec(),
            RecordId::Mapped(_) => Vec::new(),
        }
    }

    fn decode_id(&self, bytes: &[u8]) -> XxlResult<RecordId> {
        Ok(RecordId::Tid(Tid::from_bytes(bytes)?))
    }
}

/// Synthetic-id manager: dense opaque ids over an `id → TID` table.
#[derive(Debug, Default)]
pub struct MappedTidManager {
    table: BTreeMap<u64, Tid>,
    next_id: u64,
}

impl MappedTidManager {
    /// Creates a new mapped TID manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live ids in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl TidManager for MappedTidManager {
    fn insert(&mut self, tid: Tid) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        self.table.insert(id, tid);
        RecordId::Mapped(id)
    }

    fn query(&self, id: RecordId) -> Option<Tid> {
        match id {
            RecordId::Mapped(id) => self.table.get(&id).copied(),
            RecordId::Tid(_) => None,
        }
    }

    fn update(&mut self, id: RecordId, tid: Tid) -> XxlResult<()> {
        let RecordId::Mapped(id) = id else {
            return Err(XxlError::invariant(format!(
                "foreign id {:?} in mapped TID manager",
                id
            )));
        };
        match self.table.get_mut(&id) {
            Some(slot) => {
                *slot = tid;
                Ok(())
            }
            None => Err(XxlError::RecordNotFound),
        }
    }

    fn remove(&mut self, id: RecordId) -> XxlResult<()> {
        let RecordId::Mapped(id) = id else {
            return Err(XxlError::RecordNotFound);
        };
        self.table
            .remove(&id)
            .map(|_| ())
            .ok_or(XxlError::RecordNotFound)
    }

    fn remove_all(&mut self) {
        self.table.clear();
    }

    fn ids(&self) -> Option<Vec<RecordId>> {
        Some(self.table.keys().map(|&id| RecordId::Mapped(id)).collect())
    }

    fn uses_links(&self) -> bool {
        false
    }

    fn id_size(&self) -> usize {
        8
    }

    fn encode_id(&self, id: RecordId) -> Vec<u8> {
        match id {
            RecordId::Mapped(id) => id.to_be_bytes().to_vec(),
            RecordId::Tid(_) => Vec::new(),
        }
    }

    fn decode_id(&self, bytes: &[u8]) -> XxlResult<RecordId> {
        if bytes.len() != 8 {
            return Err(XxlError::invariant(format!(
                "mapped id payload of {} bytes, expected 8",
                bytes.len()
            )));
        }
        Ok(RecordId::Mapped(u64::from_be_bytes(
            bytes.try_into().unwrap(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xxl_common::types::PageId;

    #[test]
    fn test_direct_manager_is_identity() {
        let mut manager = DirectTidManager::new();
        let tid = Tid::new(PageId::new(3), 7);
        let id = manager.insert(tid);
        assert_eq!(manager.query(id), Some(tid));
        assert!(manager.uses_links());
        assert_eq!(manager.id_size(), TID_SIZE);
        assert!(manager.ids().is_none());

        let decoded = manager.decode_id(&manager.encode_id(id)).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_mapped_manager_issues_dense_ids() {
        let mut manager = MappedTidManager::new();
        let a = manager.insert(Tid::new(PageId::new(0), 0));
        let b = manager.insert(Tid::new(PageId::new(0), 1));
        assert_eq!(a, RecordId::Mapped(0));
        assert_eq!(b, RecordId::Mapped(1));
        assert!(!manager.uses_links());
    }

    #[test]
    fn test_mapped_manager_rewrite() {
        let mut manager = MappedTidManager::new();
        let id = manager.insert(Tid::new(PageId::new(1), 0));
        let moved = Tid::new(PageId::new(2), 4);
        manager.update(id, moved).unwrap();
        assert_eq!(manager.query(id), Some(moved));
    }

    #[test]
    fn test_mapped_manager_remove() {
        let mut manager = MappedTidManager::new();
        let id = manager.insert(Tid::new(PageId::new(1), 0));
        manager.remove(id).unwrap();
        assert_eq!(manager.query(id), None);
        assert!(manager.remove(id).is_err());
    }

    #[test]
    fn test_mapped_manager_ids() {
        let mut manager = MappedTidManager::new();
        let a = manager.insert(Tid::new(PageId::new(1), 0));
        let b = manager.insert(Tid::new(PageId::new(1), 1));
        assert_eq!(manager.ids(), Some(vec![a, b]));
    }
}
