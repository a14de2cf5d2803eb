use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use bytes::BytesMut;

use crate::utils::hex_prefix;

static BUFFER_ID: AtomicUsize = AtomicUsize::new(1);

/// A fixed-capacity byte region with a read/write cursor.
///
/// Writers move `position` forward from 0; `flip` turns the written span
/// into the readable span `[0, limit)`. A buffer with `limit == 0` after
/// publishing is the end-of-stream marker.
///
/// Buffers move between producer and consumer by value, so exactly one
/// side owns a buffer at any instant.
pub struct Buffer {
    id: usize,
    data: BytesMut,
    position: usize,
    limit: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            data: BytesMut::zeroed(capacity),
            position: 0,
            limit: capacity,
        }
    }

    /// The reserved zero-length buffer.
    pub fn sentinel() -> Self {
        Self::new(0)
    }

    /// Allocate `count` buffers of `capacity` bytes each.
    pub fn allocate(count: usize, capacity: usize) -> Vec<Buffer> {
        (0..count).map(|_| Buffer::new(capacity)).collect()
    }
}

impl Buffer {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        assert!(
            position <= self.limit,
            "position {} beyond limit {}",
            position,
            self.limit
        );
        self.position = position;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        assert!(limit <= self.capacity());
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Prepare for writing from the start.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
    }

    /// Turn what has been written into the readable span.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// No readable data: the end-of-stream marker once published.
    pub fn is_eos(&self) -> bool {
        self.limit == 0
    }

    /// The readable span `[position, limit)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Everything written/readable from the start, `[0, limit)`.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    pub(crate) fn bytes(&self, start: usize, len: usize) -> &[u8] {
        &self.data[start..start + len]
    }

    pub(crate) fn bytes_mut(&mut self, start: usize, len: usize) -> &mut [u8] {
        &mut self.data[start..start + len]
    }

    /// Append `src` at the position. Returns false, writing nothing, if it
    /// doesn't fit before the limit.
    pub fn put_slice(&mut self, src: &[u8]) -> bool {
        if src.len() > self.remaining() {
            return false;
        }
        let end = self.position + src.len();
        self.data[self.position..end].copy_from_slice(src);
        self.position = end;
        true
    }

    /// Replace the contents with `src` and make it readable. Returns the
    /// number of bytes copied, which is less than `src.len()` only when the
    /// buffer is too small.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity());
        self.data[..n].copy_from_slice(&src[..n]);
        self.position = 0;
        self.limit = n;
        n
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "buffer#{} [pos: {}, lim: {}, cap: {}, data: {}]",
            self.id,
            self.position,
            self.limit,
            self.capacity(),
            hex_prefix(self.filled(), 16),
        )
    }
}
