use std::{convert::TryInto, mem, sync::Arc};

use bit_vec::BitVec;
use log::trace;

use super::{
    layout::{FieldLayout, Storage, TupleLayout, END_OFFSET_SIZE, TUPLE_ALIGNMENT},
    TupleReader, TupleWriter,
};
use crate::{
    buffer::Buffer,
    config::StreamConfig,
    error::StreamError,
    schema::{Schema, Type},
    tuple::{Cell, Tuple},
    types::StreamResult,
    utils::{align_up, hex_prefix},
};

/// Precedes every tuple when the debug marker is negotiated.
pub const TUPLE_MARKER: u64 = 0x9897_ab50_9de7_dcf5;
pub const MARKER_SIZE: usize = 8;

/// Marshals and unmarshals `Tuple`s according to a `TupleLayout`.
///
/// A codec keeps scratch state (the bit map, the storage of string and
/// binary values parked while their field is NULL) and is used by one
/// thread; give each side of a stream its own clone.
#[derive(Clone)]
pub struct TupleCodec {
    layout: Arc<TupleLayout>,
    debug_marker: bool,
    bits: BitVec,
    spare: Vec<Option<Cell>>,
}

impl TupleCodec {
    pub fn new(layout: Arc<TupleLayout>, debug_marker: bool) -> Self {
        let bits = BitVec::from_elem(layout.bit_count(), false);
        let spare = vec![None; layout.fields().len()];
        Self {
            layout,
            debug_marker,
            bits,
            spare,
        }
    }

    pub fn for_schema(schema: &Schema, config: &StreamConfig) -> StreamResult<Self> {
        let layout = Arc::new(TupleLayout::new(schema)?);
        Ok(Self::new(layout, config.debug_marker))
    }

    pub fn layout(&self) -> &Arc<TupleLayout> {
        &self.layout
    }

    pub fn debug_marker(&self) -> bool {
        self.debug_marker
    }

    fn marker_size(&self) -> usize {
        if self.debug_marker {
            MARKER_SIZE
        } else {
            0
        }
    }
}

impl TupleWriter for TupleCodec {
    type Row = Tuple;

    fn marshal(&mut self, tuple: &Tuple, buf: &mut Buffer) -> StreamResult<bool> {
        let start = align_up(buf.position(), TUPLE_ALIGNMENT);
        let size = self.byte_count(tuple)?;
        if start + size > buf.limit() {
            trace!(
                "tuple of {} bytes doesn't fit at {} in {:?}",
                size,
                start,
                buf
            );
            return Ok(false);
        }

        // padding before the tuple, then the whole image, start out zeroed
        let position = buf.position();
        for b in buf.bytes_mut(position, start + size - position) {
            *b = 0;
        }

        let mut at = start;
        if self.debug_marker {
            buf.bytes_mut(at, MARKER_SIZE)
                .copy_from_slice(&TUPLE_MARKER.to_ne_bytes());
            at += MARKER_SIZE;
        }

        self.bits.clear();
        let layout = Arc::clone(&self.layout);
        let mut var_end = layout.fixed_size();

        for (i, (field, cell)) in layout.fields().iter().zip(tuple.get_cells()).enumerate() {
            if let Some(bit) = field.null_bit {
                self.bits.set(bit, cell.is_null());
            }

            match field.storage {
                Storage::Bit { bit } => {
                    if let Cell::Bool(v) = cell {
                        self.bits.set(bit, *v);
                    }
                }
                Storage::Fixed { offset, width } => {
                    if !cell.is_null() {
                        write_fixed(buf.bytes_mut(at + offset, width), field, cell, i)?;
                    }
                }
                Storage::Variable { end_offset, .. } => {
                    let payload: &[u8] = match cell {
                        Cell::String(s) => s.as_bytes(),
                        Cell::Bytes(b) => b,
                        _ => &[],
                    };
                    buf.bytes_mut(at + var_end, payload.len())
                        .copy_from_slice(payload);
                    var_end += payload.len();

                    // recorded for NULLs too, it marks where the next payload
                    // starts
                    buf.bytes_mut(at + end_offset, END_OFFSET_SIZE)
                        .copy_from_slice(&(var_end as u16).to_ne_bytes());
                }
            }
        }

        let bit_bytes = layout.bit_bytes();
        if bit_bytes > 0 {
            let dst = buf.bytes_mut(at + var_end, bit_bytes);
            let mut j = 0;
            for block in self.bits.blocks() {
                for byte in block.to_le_bytes().iter() {
                    if j < bit_bytes {
                        dst[j] = *byte;
                    }
                    j += 1;
                }
            }
        }

        buf.set_position(start + size);
        Ok(true)
    }

    fn byte_count(&self, tuple: &Tuple) -> StreamResult<usize> {
        Ok(self.marker_size() + self.layout.byte_count(tuple)?)
    }
}

impl TupleReader for TupleCodec {
    type Row = Tuple;

    fn new_row(&self) -> Tuple {
        Tuple::scratch(self.layout.schema())
    }

    fn unmarshal(&mut self, buf: &mut Buffer, tuple: &mut Tuple) -> StreamResult<()> {
        let start = align_up(buf.position(), TUPLE_ALIGNMENT);
        let limit = buf.limit();
        let layout = Arc::clone(&self.layout);

        let mut at = start;
        if self.debug_marker {
            if at + MARKER_SIZE > limit {
                return Err(overrun(buf, start, MARKER_SIZE));
            }
            let marker = u64::from_ne_bytes(read_array(buf.bytes(at, MARKER_SIZE)));
            if marker != TUPLE_MARKER {
                return Err(StreamError::internal(&format!(
                    "tuple marker mismatch at {}: {:x}, {:?}",
                    at, marker, buf
                )));
            }
            at += MARKER_SIZE;
        }

        if at + layout.fixed_size() > limit {
            return Err(overrun(buf, start, layout.fixed_size()));
        }

        let var_end = match layout.last_var() {
            Some(i) => match layout.field(i).storage {
                Storage::Variable { end_offset, .. } => read_end_offset(buf, at + end_offset),
                _ => layout.fixed_size(),
            },
            None => layout.fixed_size(),
        };
        if var_end < layout.fixed_size() {
            return Err(StreamError::internal(&format!(
                "variable region ends at {} inside the fixed region of {} bytes",
                var_end,
                layout.fixed_size()
            )));
        }

        let size = self.marker_size() + layout.size_with_var_len(var_end - layout.fixed_size());
        if start + size > limit {
            return Err(overrun(buf, start, size));
        }

        let bit_bytes = layout.bit_bytes();
        if bit_bytes > 0 {
            let src = buf.bytes(at + var_end, bit_bytes);
            for bit in 0..layout.bit_count() {
                self.bits.set(bit, (src[bit / 8] >> (bit % 8)) & 1 == 1);
            }
        }

        tuple.conform(layout.schema());
        let mut var_start = layout.fixed_size();
        for (i, field) in layout.fields().iter().enumerate() {
            let is_null = match field.null_bit {
                Some(bit) => self.bits[bit],
                None => false,
            };

            match field.storage {
                Storage::Bit { bit } => {
                    tuple.set_cell(i, Cell::Bool(self.bits[bit]));
                }
                Storage::Fixed { offset, width } => {
                    let cell = tuple.get_cell_mut(i);
                    if is_null {
                        set_null(cell, &mut self.spare[i]);
                    } else {
                        take_spare(cell, &mut self.spare[i]);
                        read_fixed(buf.bytes(at + offset, width), field, cell)?;
                    }
                }
                Storage::Variable { end_offset, max_len } => {
                    let end = read_end_offset(buf, at + end_offset);
                    if end < var_start || end > var_end || end - var_start > max_len {
                        return Err(StreamError::internal(&format!(
                            "corrupt end offset {} of field {} (previous end {}, region end {})",
                            end, i, var_start, var_end
                        )));
                    }
                    let cell = tuple.get_cell_mut(i);
                    if is_null {
                        set_null(cell, &mut self.spare[i]);
                    } else {
                        take_spare(cell, &mut self.spare[i]);
                        let payload = buf.bytes(at + var_start, end - var_start);
                        read_payload(payload, &field.t, cell)?;
                    }
                    var_start = end;
                }
            }
        }

        buf.set_position(start + size);
        Ok(())
    }
}

fn write_fixed(dst: &mut [u8], field: &FieldLayout, cell: &Cell, i: usize) -> StreamResult<()> {
    match (cell, &field.t) {
        (Cell::Bool(v), Type::Bool) => dst[0] = *v as u8,
        (Cell::Int8(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::Int16(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::Int32(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::Int64(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::Float32(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::Float64(v), _) => dst.copy_from_slice(&v.to_ne_bytes()),
        (Cell::String(s), Type::Char(_)) => {
            dst[..s.len()].copy_from_slice(s.as_bytes());
            for b in &mut dst[s.len()..] {
                *b = b' ';
            }
        }
        (Cell::Bytes(v), Type::Binary(_)) => dst[..v.len()].copy_from_slice(v),
        _ => {
            return Err(StreamError::internal(&format!(
                "can't store {} in fixed field {} of type {:?}",
                cell, i, field.t
            )))
        }
    }
    Ok(())
}

// Overwrites `cell` in place; string and binary cells keep their storage.
fn read_fixed(src: &[u8], field: &FieldLayout, cell: &mut Cell) -> StreamResult<()> {
    match field.t {
        Type::Bool => *cell = Cell::Bool(src[0] != 0),
        Type::Int8 => *cell = Cell::Int8(i8::from_ne_bytes(read_array(src))),
        Type::Int16 => *cell = Cell::Int16(i16::from_ne_bytes(read_array(src))),
        Type::Int32 => *cell = Cell::Int32(i32::from_ne_bytes(read_array(src))),
        Type::Int64 => *cell = Cell::Int64(i64::from_ne_bytes(read_array(src))),
        Type::Float32 => *cell = Cell::Float32(f32::from_ne_bytes(read_array(src))),
        Type::Float64 => *cell = Cell::Float64(f64::from_ne_bytes(read_array(src))),
        Type::Char(_) | Type::Binary(_) => read_payload(src, &field.t, cell)?,
        Type::Varchar(_) | Type::Varbinary(_) => {
            return Err(StreamError::internal(&format!(
                "variable-width type {:?} in the fixed region",
                field.t
            )))
        }
    }
    Ok(())
}

fn read_payload(src: &[u8], t: &Type, cell: &mut Cell) -> StreamResult<()> {
    if t.is_character() {
        let s = std::str::from_utf8(src).map_err(|e| {
            StreamError::internal(&format!("invalid utf-8 in {:?} value: {}", t, e))
        })?;
        match cell {
            Cell::String(v) => {
                v.clear();
                v.push_str(s);
            }
            _ => *cell = Cell::String(s.to_owned()),
        }
    } else {
        match cell {
            Cell::Bytes(v) => {
                v.clear();
                v.extend_from_slice(src);
            }
            _ => *cell = Cell::Bytes(src.to_vec()),
        }
    }
    Ok(())
}

fn set_null(cell: &mut Cell, spare: &mut Option<Cell>) {
    match mem::replace(cell, Cell::Null) {
        old @ Cell::String(_) | old @ Cell::Bytes(_) => *spare = Some(old),
        _ => {}
    }
}

fn take_spare(cell: &mut Cell, spare: &mut Option<Cell>) {
    if cell.is_null() {
        if let Some(old) = spare.take() {
            *cell = old;
        }
    }
}

fn read_end_offset(buf: &Buffer, at: usize) -> usize {
    u16::from_ne_bytes(read_array(buf.bytes(at, END_OFFSET_SIZE))) as usize
}

fn read_array<const N: usize>(src: &[u8]) -> [u8; N] {
    // callers slice exactly N bytes
    src.try_into().unwrap()
}

fn overrun(buf: &Buffer, start: usize, need: usize) -> StreamError {
    StreamError::internal(&format!(
        "tuple at {} needs {} bytes, buffer limit is {}: {}",
        start,
        need,
        buf.limit(),
        hex_prefix(buf.filled(), 32)
    ))
}
