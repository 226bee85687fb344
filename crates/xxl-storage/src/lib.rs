//! # xxl-storage
//!
//! A variable-length record store layered on top of a fixed-size block
//! container.
//!
//! The [`RecordManager`] partitions records into pages, packs multiple
//! records per page, keeps page-level accounting in memory, and handles
//! grow/shrink via tuple-identifier (TID) links when records outgrow their
//! home page. Callers address records through opaque [`RecordId`]s that
//! stay valid across in-place updates and silent migrations.
//!
//! ## Example
//!
//! ```rust
//! use xxl_storage::container::MemoryContainer;
//! use xxl_storage::manager::RecordManager;
//! use xxl_storage::strategy::FirstFitStrategy;
//! use xxl_storage::tid_manager::DirectTidManager;
//!
//! let container = MemoryContainer::new(512);
//! let mut manager = RecordManager::new(
//!     container,
//!     512,
//!     Box::new(FirstFitStrategy::new()),
//!     Box::new(DirectTidManager::new()),
//!     4,
//! ).unwrap();
//!
//! let id = manager.insert(b"hello").unwrap();
//! assert_eq!(&manager.get(id).unwrap()[..], b"hello");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod manager;
pub mod page;
pub mod page_info;
pub mod strategy;
pub mod tid;
pub mod tid_manager;

pub use container::{BlockContainer, MemoryContainer};
pub use manager::RecordManager;
pub use page_info::{PageInformation, PagesMap};
pub use tid::{RecordId, Tid};
