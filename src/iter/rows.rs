use std::{thread, time::Duration};

use super::{FetchResult, TupleIter};
use crate::types::StreamResult;

/// Adapts a `TupleIter` to a std `Iterator` of owned rows, sleeping
/// through underflows. Ends after end of data or the first error.
pub struct RowIterator<I> {
    inner: I,
    poll_interval: Duration,
    done: bool,
}

impl<I: TupleIter> RowIterator<I> {
    pub fn new(inner: I, poll_interval: Duration) -> Self {
        Self {
            inner,
            poll_interval,
            done: false,
        }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I> Iterator for RowIterator<I>
where
    I: TupleIter,
    I::Row: Clone,
{
    type Item = StreamResult<I::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.inner.fetch() {
                Ok(FetchResult::Row(row)) => return Some(Ok(row.clone())),
                Ok(FetchResult::EndOfData) => {
                    self.done = true;
                    return None;
                }
                Ok(FetchResult::Underflow) => thread::sleep(self.poll_interval),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
