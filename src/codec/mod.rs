mod accessor;
mod layout;

pub use accessor::{TupleCodec, MARKER_SIZE, TUPLE_MARKER};
pub use layout::{FieldLayout, Storage, TupleLayout, END_OFFSET_SIZE, TUPLE_ALIGNMENT};

use crate::{buffer::Buffer, types::StreamResult};

/// Marshals rows into buffers.
///
/// This is the seam where generated row-specific code plugs in; the crate's
/// own `TupleCodec` implements it for `Tuple` from a layout table.
pub trait TupleWriter {
    type Row;

    /// Write one row at the buffer's position (aligned up first).
    ///
    /// Returns `Ok(false)` if the row doesn't fit before the buffer's limit;
    /// the position is left unchanged and any bytes touched past it must be
    /// ignored. On success the position ends on an alignment boundary.
    fn marshal(&mut self, row: &Self::Row, buf: &mut Buffer) -> StreamResult<bool>;

    /// Marshalled size of `row`, padding included.
    fn byte_count(&self, row: &Self::Row) -> StreamResult<usize>;
}

/// Unmarshals rows out of buffers into caller-owned scratch rows.
pub trait TupleReader {
    type Row;

    /// A scratch row to unmarshal into, created once per consumer.
    fn new_row(&self) -> Self::Row;

    /// Read one row at the buffer's position into `row`, advancing past it
    /// and its padding.
    fn unmarshal(&mut self, buf: &mut Buffer, row: &mut Self::Row) -> StreamResult<()>;
}
