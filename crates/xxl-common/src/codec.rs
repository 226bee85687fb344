//! Fixed-size record codecs.
//!
//! The sorter's container-backed queues and the record manager's link
//! records both serialize values into fixed-width byte layouts. This module
//! defines that contract and a few primitive codecs.
//!
//! Codecs are zero-sized value types; construct them freely instead of
//! sharing a global instance.

/// Serializer/deserializer contract for a fixed byte layout.
///
/// Every value of `T` encodes to exactly [`encoded_size`] bytes.
///
/// [`encoded_size`]: FixedSizeCodec::encoded_size
///
/// # Example
///
/// ```rust
/// use xxl_common::codec::{FixedSizeCodec, I32Codec};
///
/// let codec = I32Codec;
/// let mut buf = [0u8; 4];
/// codec.encode(&-7, &mut buf);
/// assert_eq!(codec.decode(&buf), -7);
/// ```
pub trait FixedSizeCodec<T> {
    /// Returns the fixed number of bytes every encoded value occupies.
    fn encoded_size(&self) -> usize;

    /// Encodes `item` into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `out` is shorter than [`encoded_size`](Self::encoded_size).
    fn encode(&self, item: &T, out: &mut [u8]);

    /// Decodes a value from `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than [`encoded_size`](Self::encoded_size).
    fn decode(&self, bytes: &[u8]) -> T;
}

/// Big-endian codec for `i32` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct I32Codec;

impl FixedSizeCodec<i32> for I32Codec {
    #[inline]
    fn encoded_size(&self) -> usize {
        4
    }

    #[inline]
    fn encode(&self, item: &i32, out: &mut [u8]) {
        out[..4].copy_from_slice(&item.to_be_bytes());
    }

    #[inline]
    fn decode(&self, bytes: &[u8]) -> i32 {
        i32::from_be_bytes(bytes[..4].try_into().unwrap())
    }
}

/// Big-endian codec for `u64` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct U64Codec;

impl FixedSizeCodec<u64> for U64Codec {
    #[inline]
    fn encoded_size(&self) -> usize {
        8
    }

    #[inline]
    fn encode(&self, item: &u64, out: &mut [u8]) {
        out[..8].copy_from_slice(&item.to_be_bytes());
    }

    #[inline]
    fn decode(&self, bytes: &[u8]) -> u64 {
        u64::from_be_bytes(bytes[..8].try_into().unwrap())
    }
}

/// Big-endian codec for `(i32, i32)` pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct I32PairCodec;

impl FixedSizeCodec<(i32, i32)> for I32PairCodec {
    #[inline]
    fn encoded_size(&self) -> usize {
        8
    }

    #[inline]
    fn encode(&self, item: &(i32, i32), out: &mut [u8]) {
        out[..4].copy_from_slice(&item.0.to_be_bytes());
        out[4..8].copy_from_slice(&item.1.to_be_bytes());
    }

    #[inline]
    fn decode(&self, bytes: &[u8]) -> (i32, i32) {
        (
            i32::from_be_bytes(bytes[..4].try_into().unwrap()),
            i32::from_be_bytes(bytes[4..8].try_into().unwrap()),
        )
    }
}
