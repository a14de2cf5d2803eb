use std::fmt::Debug;

use log::{debug, trace};

use crate::{
    buffer::Buffer,
    codec::TupleWriter,
    error::StreamError,
    iter::{FetchResult, Lookahead, TupleIter},
    types::{SmallResult, StreamResult},
};

/// Lets the native engine drive a managed-side transform: each `execute`
/// marshals as many input rows as fit (up to a quantum) into a buffer the
/// caller supplies.
///
/// A row that didn't fit is kept and written first on the next call, so no
/// row is lost or duplicated across calls.
pub struct TransformBridge<I: TupleIter, W> {
    input: I,
    writer: W,
    pending: Lookahead<I::Row>,
    closed: bool,
}

impl<I, W> TransformBridge<I, W>
where
    I: TupleIter,
    I::Row: Clone + Debug,
    W: TupleWriter<Row = I::Row>,
{
    pub fn new(input: I, writer: W) -> Self {
        Self {
            input,
            writer,
            pending: Lookahead::new(),
            closed: false,
        }
    }

    /// Fill `out` from its start with at most `quantum` rows (no limit if
    /// 0). `out` is left flipped to the written span.
    ///
    /// Returns the number of bytes written, 0 at end of data, or -1 if the
    /// input underflowed before any row was written.
    pub fn execute(&mut self, out: &mut Buffer, quantum: usize) -> StreamResult<i64> {
        if self.closed {
            return Err(StreamError::closed("execute on a closed transform"));
        }

        out.clear();
        let quantum = if quantum == 0 { usize::MAX } else { quantum };

        if !self.pending.is_full() {
            match self.input.fetch()? {
                FetchResult::Row(row) => self.pending.fill(row),
                FetchResult::EndOfData => {
                    out.flip();
                    return Ok(0);
                }
                FetchResult::Underflow => {
                    out.flip();
                    return Ok(-1);
                }
            }
        }

        let mut rows = 0;
        loop {
            let row = match self.pending.get() {
                Some(row) => row,
                None => break,
            };
            if !self.writer.marshal(row, out)? {
                if rows == 0 {
                    let size = self.writer.byte_count(row)?;
                    return Err(StreamError::row_too_long(
                        size,
                        out.capacity(),
                        &format!("{:?}", row),
                    ));
                }
                trace!("buffer full after {} rows, one row pending", rows);
                break;
            }
            self.pending.clear();
            rows += 1;

            if rows >= quantum {
                break;
            }
            match self.input.fetch()? {
                FetchResult::Row(row) => self.pending.fill(row),
                FetchResult::EndOfData | FetchResult::Underflow => break,
            }
        }

        let written = out.position();
        out.flip();
        debug!("execute wrote {} rows, {} bytes", rows, written);
        Ok(written as i64)
    }
}

impl<I: TupleIter, W> TransformBridge<I, W> {
    /// Rewind the input. A row held back from the last call is dropped.
    pub fn restart(&mut self) -> SmallResult {
        if self.closed {
            return Err(StreamError::closed("restart of a closed transform"));
        }
        self.pending.clear();
        self.input.restart()
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.input.close();
        }
    }

    pub fn input(&self) -> &I {
        &self.input
    }
}
