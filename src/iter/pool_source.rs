use std::{sync::Arc, time::Duration};

use super::{BufferSource, MoreDataListener};
use crate::{
    buffer::{Buffer, BufferPool},
    error::StreamError,
    types::{SmallResult, StreamResult},
};

/// Drains the filled buffers of a `BufferPool`, the consuming end of a push
/// stream.
///
/// Each filled buffer is copied into the iterator's buffer and released
/// back to the pool straight away. Once the pool is closed every refill
/// fails with `Closed`.
pub struct PoolSource {
    pool: Arc<BufferPool>,
    eos: bool,
}

impl PoolSource {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool, eos: false }
    }
}

impl BufferSource for PoolSource {
    fn refill(&mut self, buf: &mut Buffer, timeout: Option<Duration>) -> StreamResult<i64> {
        if self.eos {
            return Ok(0);
        }

        let filled = match timeout {
            None => self.pool.acquire_filled_buffer(true),
            Some(t) if t == Duration::from_secs(0) => self.pool.acquire_filled_buffer(false),
            Some(t) => self.pool.acquire_filled_buffer_timeout(t),
        };
        let filled = match filled {
            Some(b) => b,
            None if !self.pool.is_open() => {
                return Err(StreamError::closed("read from a closed buffer pool"))
            }
            None => return Ok(-1),
        };

        if filled.is_eos() {
            self.eos = true;
            self.pool.release(filled);
            return Ok(0);
        }

        let len = filled.limit();
        if len > buf.capacity() {
            let capacity = buf.capacity();
            self.pool.release(filled);
            return Err(StreamError::internal(&format!(
                "pool buffer of {} bytes doesn't fit the {} byte read buffer",
                len, capacity
            )));
        }

        buf.fill_from(filled.filled());
        self.pool.release(filled);
        Ok(len as i64)
    }

    fn restart(&mut self) -> SmallResult {
        self.eos = false;
        Ok(())
    }

    fn add_listener(&mut self, listener: MoreDataListener) -> bool {
        self.pool.add_listener(listener);
        true
    }
}
