//! # xxl-common
//!
//! Common types, errors, and codecs for XXL.
//!
//! This crate provides the foundation shared by the record-manager and
//! merge-sort cores:
//!
//! - **Types**: the `PageId` identifier for blocks in a container
//! - **Errors**: unified error handling with `XxlError`
//! - **Codecs**: the fixed-size serializer/deserializer contract
//! - **Constants**: page-layout and identifier sizes
//!
//! ## Example
//!
//! ```rust
//! use xxl_common::error::{XxlError, XxlResult};
//! use xxl_common::types::PageId;
//!
//! fn missing(page_id: PageId) -> XxlResult<()> {
//!     Err(XxlError::PageNotFound { page_id })
//! }
//!
//! assert!(missing(PageId::new(42)).unwrap_err().is_not_found());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{ErrorKind, XxlError, XxlResult};
pub use types::PageId;
