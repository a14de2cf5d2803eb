use std::time::Duration;

use log::{debug, trace};

use super::{BufferSource, FetchResult, MoreDataListener, TupleIter};
use crate::{
    buffer::Buffer,
    codec::TupleReader,
    config::StreamConfig,
    error::StreamError,
    types::{SmallResult, StreamResult},
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum IterState {
    Active,
    Exhausted,
    Closed,
}

/// Iterates rows out of buffers that a `BufferSource` refills.
///
/// The blocking form lets the source wait for data as long as it takes;
/// the non-blocking form bounds every refill by the fetch timeout and
/// reports `Underflow` when nothing arrived in time. Both share this one
/// state machine.
///
/// Once the source reports end of data, every later fetch reports it too
/// without touching the source again, until `restart`.
pub struct BufferedTupleIter<S, R: TupleReader> {
    source: S,
    reader: R,
    buffer: Buffer,
    row: R::Row,
    state: IterState,

    blocking: bool,
    timeout: Option<Duration>,
    timeout_as_underflow: bool,
}

impl<S: BufferSource, R: TupleReader> BufferedTupleIter<S, R> {
    pub fn blocking(source: S, reader: R, config: &StreamConfig) -> Self {
        Self::new(source, reader, config, true)
    }

    pub fn non_blocking(source: S, reader: R, config: &StreamConfig) -> Self {
        Self::new(source, reader, config, false)
    }

    fn new(source: S, reader: R, config: &StreamConfig, blocking: bool) -> Self {
        let row = reader.new_row();
        let mut buffer = Buffer::new(config.buffer_size);
        buffer.set_limit(0);

        Self {
            source,
            reader,
            buffer,
            row,
            state: IterState::Active,
            blocking,
            timeout: config.fetch_timeout,
            timeout_as_underflow: config.timeout_as_underflow,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    fn refill(&mut self) -> StreamResult<i64> {
        let wait = if self.blocking {
            None
        } else {
            Some(self.timeout.unwrap_or_else(|| Duration::from_secs(0)))
        };

        self.buffer.clear();
        let n = self.source.refill(&mut self.buffer, wait)?;
        if n > 0 {
            let n = n as usize;
            if n > self.buffer.capacity() {
                return Err(StreamError::internal(&format!(
                    "refill reports {} bytes, buffer holds {}",
                    n,
                    self.buffer.capacity()
                )));
            }
            self.buffer.set_limit(n);
            self.buffer.set_position(0);
        } else {
            self.buffer.set_limit(0);
        }
        trace!("refill returns {}, {:?}", n, self.buffer);
        Ok(n)
    }

    fn on_no_data(&self) -> StreamResult<FetchResult<&R::Row>> {
        match self.timeout {
            Some(t) if !self.blocking && t > Duration::from_secs(0) && !self.timeout_as_underflow => {
                Err(StreamError::timeout(&format!(
                    "no data within {:?}",
                    t
                )))
            }
            _ => Ok(FetchResult::Underflow),
        }
    }
}

impl<S: BufferSource, R: TupleReader> TupleIter for BufferedTupleIter<S, R> {
    type Row = R::Row;

    fn fetch(&mut self) -> StreamResult<FetchResult<&R::Row>> {
        match self.state {
            IterState::Closed => return Err(StreamError::closed("fetch on a closed iterator")),
            IterState::Exhausted => return Ok(FetchResult::EndOfData),
            IterState::Active => {}
        }

        if !self.buffer.has_remaining() {
            let n = self.refill()?;
            if n == 0 {
                debug!("source exhausted");
                self.state = IterState::Exhausted;
                return Ok(FetchResult::EndOfData);
            }
            if n < 0 {
                return self.on_no_data();
            }
        }

        self.reader.unmarshal(&mut self.buffer, &mut self.row)?;
        Ok(FetchResult::Row(&self.row))
    }

    fn restart(&mut self) -> SmallResult {
        if self.state == IterState::Closed {
            return Err(StreamError::closed("restart of a closed iterator"));
        }

        self.buffer.clear();
        self.buffer.set_limit(0);
        self.state = IterState::Active;
        self.source.restart()
    }

    fn close(&mut self) {
        if self.state != IterState::Closed {
            self.state = IterState::Closed;
            self.source.close();
        }
    }

    fn add_listener(&mut self, listener: MoreDataListener) -> bool {
        if self.blocking {
            return false;
        }
        self.source.add_listener(listener)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>, as_underflow: bool) -> bool {
        if self.blocking {
            return false;
        }
        self.timeout = timeout;
        self.timeout_as_underflow = as_underflow;
        true
    }
}
