//! Synthetic record payloads.
//!
//! Every record carries the decimal sequence number of its worker stream,
//! followed by a space, tiled until the configured record size is reached.
//! A payload read back from the topic therefore identifies the record that
//! produced it:
//!
//! ```text
//! seq = 12, size = 16   =>   "12 12 12 12 12 1"
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// A single record handed to a [`ProducerClient`](crate::kafka::ProducerClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Index of the worker that built the record.
    pub worker: usize,
    /// Position of the record in that worker's stream, starting at 0.
    pub seq: u64,
    pub payload: Bytes,
}

impl Record {
    /// Builds the record `seq` of `worker` with a payload of exactly `size` bytes.
    pub fn new(worker: usize, seq: u64, size: usize) -> Self {
        Self {
            worker,
            seq,
            payload: format_value(seq, size),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Formats `seq` as `"<seq> "` repeated to fill exactly `size` bytes.
///
/// The last tile is truncated when `size` is not a multiple of the tile
/// length. A `size` of zero yields an empty payload; callers reject that
/// size during configuration.
pub fn format_value(seq: u64, size: usize) -> Bytes {
    let tile = format!("{seq} ");
    let tile = tile.as_bytes();

    let mut buf = BytesMut::with_capacity(size);
    while buf.len() < size {
        let take = tile.len().min(size - buf.len());
        buf.put_slice(&tile[..take]);
    }
    buf.freeze()
}
