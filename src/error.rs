use std::{error::Error, fmt};

use backtrace::Backtrace;
use log::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A single row doesn't fit into an empty buffer. Surfaces to the user
    /// as an ordinary execution failure.
    RowTooLong,

    /// The codec layout disagrees with the row-type descriptor, or the
    /// wire data is corrupt. This is an engine defect, not a user error.
    Internal,

    /// A fetch waited longer than its timeout and the timeout is not
    /// mapped to underflow.
    Timeout,

    /// The surrounding execution context was cancelled.
    Cancelled,

    /// The stream or pool was used after close.
    Closed,
}

pub struct StreamError {
    kind: ErrorKind,
    details: String,

    // only captured for internal errors
    backtrace: Option<Backtrace>,
}

impl StreamError {
    pub fn new(kind: ErrorKind, msg: &str) -> StreamError {
        StreamError {
            kind,
            details: msg.to_string(),
            backtrace: None,
        }
    }

    pub fn internal(msg: &str) -> StreamError {
        let bt = Backtrace::new();
        error!("internal error: {}", msg);

        StreamError {
            kind: ErrorKind::Internal,
            details: msg.to_string(),
            backtrace: Some(bt),
        }
    }

    /// `row` is the textual form of the offending row, for diagnostics.
    pub fn row_too_long(size: usize, capacity: usize, row: &str) -> StreamError {
        StreamError::new(
            ErrorKind::RowTooLong,
            &format!(
                "row length {} exceeds buffer capacity {}, row: {}",
                size, capacity, row
            ),
        )
    }

    pub fn timeout(msg: &str) -> StreamError {
        StreamError::new(ErrorKind::Timeout, msg)
    }

    pub fn cancelled() -> StreamError {
        StreamError::new(ErrorKind::Cancelled, "execution cancelled")
    }

    pub fn closed(msg: &str) -> StreamError {
        StreamError::new(ErrorKind::Closed, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Internal errors are engine defects, everything else is a condition
    /// of the query being executed.
    pub fn is_internal(&self) -> bool {
        self.kind == ErrorKind::Internal
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::Internal => write!(f, "internal error: {}", self.details),
            _ => write!(f, "{}", self.details),
        }
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.details)?;
        if let Some(bt) = &self.backtrace {
            write!(f, "\n{:?}", bt)?;
        }
        Ok(())
    }
}

impl Error for StreamError {}
