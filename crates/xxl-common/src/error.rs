//! Error handling for XXL.
//!
//! This module provides a unified error type and result alias used across
//! both cores.

use std::fmt;
use thiserror::Error;

use crate::types::PageId;

/// Result type alias for XXL operations.
pub type XxlResult<T> = std::result::Result<T, XxlError>;

/// Error kinds for categorizing errors.
///
/// These kinds are stable across versions and can be used for programmatic
/// error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A record, page, or queue element does not exist.
    NotFound,
    /// A record or accounting change would exceed the page size.
    SizeExceeded,
    /// A page would exceed its maximum record count.
    CapacityExceeded,
    /// Internal accounting disagrees with the on-disk state. Fatal.
    InvariantViolation,
    /// A link record points at another link record. Fatal.
    LinkDepthExceeded,
    /// An I/O or serialization failure bubbled up from below.
    Io,
    /// An argument violated an operation's contract.
    InvalidArgument,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for XXL.
///
/// Each variant carries the context needed for debugging. Variants map onto
/// a small set of stable [`ErrorKind`]s via [`XxlError::kind`].
///
/// # Example
///
/// ```rust
/// use xxl_common::error::{ErrorKind, XxlError, XxlResult};
/// use xxl_common::types::PageId;
///
/// fn read_page(page_id: PageId) -> XxlResult<Vec<u8>> {
///     Err(XxlError::PageNotFound { page_id })
/// }
///
/// assert_eq!(read_page(PageId::new(7)).unwrap_err().kind(), ErrorKind::NotFound);
/// ```
#[derive(Debug, Error)]
pub enum XxlError {
    /// A record with the given identifier does not exist.
    #[error("record not found")]
    RecordNotFound,

    /// A page (container block) does not exist.
    #[error("page {page_id} not found")]
    PageNotFound {
        /// The missing page ID.
        page_id: PageId,
    },

    /// A record is larger than the largest record a page can host.
    #[error("record size {size} exceeds maximum {max_size}")]
    RecordTooLarge {
        /// Actual record size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// Header, directory, and data together would exceed the page size.
    #[error("page contents of {needed} bytes exceed page size {page_size}")]
    PageOverflow {
        /// Bytes needed by header + directory + data.
        needed: usize,
        /// The fixed page size.
        page_size: usize,
    },

    /// A page would exceed its maximum record count.
    #[error("page cannot hold more than {max} records")]
    CapacityExceeded {
        /// The record-count limit.
        max: usize,
    },

    /// Internal accounting disagrees with the on-disk state.
    ///
    /// This indicates a bug; the manager makes no attempt to self-heal.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the mismatch.
        message: String,
    },

    /// A link record points at another link record.
    #[error("link target {page_id}:{record_nr} is itself a link")]
    LinkDepthExceeded {
        /// Page hosting the offending target.
        page_id: PageId,
        /// Record number of the offending target.
        record_nr: i16,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// State snapshot encoding or decoding failed.
    #[error("state serialization failed: {source}")]
    Serialization {
        /// The underlying codec error.
        #[from]
        source: bincode::Error,
    },

    /// An argument violated an operation's contract.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },
}

impl XxlError {
    /// Returns the error kind for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::RecordNotFound | Self::PageNotFound { .. } => ErrorKind::NotFound,
            Self::RecordTooLarge { .. } | Self::PageOverflow { .. } => ErrorKind::SizeExceeded,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::LinkDepthExceeded { .. } => ErrorKind::LinkDepthExceeded,
            Self::Io { .. } | Self::Serialization { .. } => ErrorKind::Io,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }

    /// Returns true if this error is fatal for the owning instance.
    ///
    /// After a fatal error the caller should discard the instance.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvariantViolation | ErrorKind::LinkDepthExceeded
        )
    }

    /// Returns true if this error reports a missing record or page.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }

    /// Creates an invariant-violation error.
    #[must_use]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = XxlError::PageNotFound {
            page_id: PageId::new(42),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = XxlError::PageNotFound {
            page_id: PageId::new(42),
        };
        assert_eq!(err.to_string(), "page 42 not found");

        let err = XxlError::RecordTooLarge {
            size: 5000,
            max_size: 4080,
        };
        assert_eq!(err.to_string(), "record size 5000 exceeds maximum 4080");
    }

    #[test]
    fn test_fatal() {
        assert!(XxlError::invariant("accounting mismatch").is_fatal());
        assert!(XxlError::LinkDepthExceeded {
            page_id: PageId::new(1),
            record_nr: 3,
        }
        .is_fatal());
        assert!(!XxlError::RecordNotFound.is_fatal());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: XxlError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
