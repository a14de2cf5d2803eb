mod buffered;
mod lookahead;
mod pool_source;
mod queue;
mod rows;

pub use buffered::BufferedTupleIter;
pub use lookahead::Lookahead;
pub use pool_source::PoolSource;
pub use queue::{QueueTupleIter, RestartHook, RowSink};
pub use rows::RowIterator;

use std::time::Duration;

use crate::{
    buffer::Buffer,
    types::{SmallResult, StreamResult},
};

/// Invoked once, from whichever thread makes data available, after it was
/// registered.
pub type MoreDataListener = Box<dyn FnOnce() + Send>;

/// Outcome of one fetch.
#[derive(Debug, PartialEq)]
pub enum FetchResult<T> {
    Row(T),

    /// The source is exhausted. Repeats on every later fetch until restart.
    EndOfData,

    /// No row available right now, try again later.
    Underflow,
}

impl<T> FetchResult<T> {
    pub fn is_row(&self) -> bool {
        matches!(self, FetchResult::Row(_))
    }

    pub fn is_end_of_data(&self) -> bool {
        matches!(self, FetchResult::EndOfData)
    }

    pub fn is_underflow(&self) -> bool {
        matches!(self, FetchResult::Underflow)
    }

    pub fn row(self) -> Option<T> {
        match self {
            FetchResult::Row(row) => Some(row),
            _ => None,
        }
    }
}

/// A pull-style source of rows.
///
/// A fetched row is borrowed from the iterator and stays valid only until
/// the next call on it; iterators decode into scratch storage they reuse.
pub trait TupleIter {
    type Row;

    fn fetch(&mut self) -> StreamResult<FetchResult<&Self::Row>>;

    /// Reposition to the beginning. A closed iterator can't restart.
    fn restart(&mut self) -> SmallResult;

    /// Release resources. Calling it again does nothing.
    fn close(&mut self);

    /// Register a callback for when data arrives after an underflow.
    /// Returns false if this iterator doesn't support listeners.
    fn add_listener(&mut self, _listener: MoreDataListener) -> bool {
        false
    }

    /// How long a fetch may wait before it gives up, and whether giving up
    /// reports `Underflow` or a timeout error. Returns false if this iterator
    /// doesn't support timeouts.
    fn set_timeout(&mut self, _timeout: Option<Duration>, _as_underflow: bool) -> bool {
        false
    }
}

impl<I: TupleIter + ?Sized> TupleIter for Box<I> {
    type Row = I::Row;

    fn fetch(&mut self) -> StreamResult<FetchResult<&Self::Row>> {
        (**self).fetch()
    }

    fn restart(&mut self) -> SmallResult {
        (**self).restart()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn add_listener(&mut self, listener: MoreDataListener) -> bool {
        (**self).add_listener(listener)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>, as_underflow: bool) -> bool {
        (**self).set_timeout(timeout, as_underflow)
    }
}

/// The refill side of a buffer-backed iterator: whatever produces the bytes
/// (the native engine, a pool, a pipe).
pub trait BufferSource {
    /// Put the next chunk of marshalled rows into `buf` starting at offset
    /// 0.
    ///
    /// Returns the number of bytes (> 0), 0 at end of data, or a negative
    /// value when no data is available yet. `timeout` of `None` lets the
    /// source wait as long as it needs; `Some` bounds the wait, zero
    /// meaning don't wait at all.
    fn refill(&mut self, buf: &mut Buffer, timeout: Option<Duration>) -> StreamResult<i64>;

    /// Reset the cursor the bytes come from.
    fn restart(&mut self) -> SmallResult;

    fn close(&mut self) {}

    fn add_listener(&mut self, _listener: MoreDataListener) -> bool {
        false
    }
}
