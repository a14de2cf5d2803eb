use crate::{
    error::StreamError,
    schema::{Schema, Type},
    tuple::{Cell, Tuple},
    types::StreamResult,
    utils::align_up,
};

/// Every tuple starts, and is padded to end, on this boundary.
pub const TUPLE_ALIGNMENT: usize = 4;

/// Size of the end offset a variable-width field keeps in the fixed region.
pub const END_OFFSET_SIZE: usize = 2;

/// Where a field's value lives inside the tuple image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Storage {
    /// At a precomputed offset in the fixed region.
    Fixed { offset: usize, width: usize },

    /// Payload in the variable region, a native-order u16 end offset at
    /// `end_offset` in the fixed region.
    Variable { end_offset: usize, max_len: usize },

    /// A single bit of the bit map (not-null booleans).
    Bit { bit: usize },
}

#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub t: Type,
    pub storage: Storage,

    /// Set for nullable fields; a set bit means NULL.
    pub null_bit: Option<usize>,
}

/// The field layout table of one row type, computed once when a stream is
/// opened.
///
/// Image of a tuple, relative to its start:
///
/// - fixed region: fixed-width values and the end offsets of variable-width
///   values, in declaration order
/// - variable-width payloads, in declaration order
/// - bit map, LSB-first: value bits of not-null booleans and null bits of
///   nullable fields, interleaved in declaration order
/// - zero padding up to `TUPLE_ALIGNMENT`
#[derive(Debug, Clone)]
pub struct TupleLayout {
    schema: Schema,
    fields: Vec<FieldLayout>,

    /// Size of the fixed region, which is also where the variable region
    /// starts.
    fixed_size: usize,

    /// Index of the last variable-width field, if any.
    last_var: Option<usize>,

    bit_count: usize,
    bit_bytes: usize,

    min_size: usize,
    max_size: usize,
}

impl TupleLayout {
    pub fn new(schema: &Schema) -> StreamResult<Self> {
        let mut fields = Vec::with_capacity(schema.len());
        let mut offset = 0;
        let mut bit_count = 0;
        let mut var_max = 0;
        let mut last_var = None;

        for (i, field) in schema.get_fields().iter().enumerate() {
            let storage = if field.is_bit() {
                let bit = bit_count;
                bit_count += 1;
                Storage::Bit { bit }
            } else if field.t.is_fixed_width() {
                let storage = Storage::Fixed {
                    offset,
                    width: field.t.width(),
                };
                offset += field.t.width();
                storage
            } else {
                let storage = Storage::Variable {
                    end_offset: offset,
                    max_len: field.t.width(),
                };
                offset += END_OFFSET_SIZE;
                var_max += field.t.width();
                last_var = Some(i);
                storage
            };

            let null_bit = if field.nullable {
                let bit = bit_count;
                bit_count += 1;
                Some(bit)
            } else {
                None
            };

            fields.push(FieldLayout {
                t: field.t,
                storage,
                null_bit,
            });
        }

        if offset + var_max > u16::MAX as usize {
            return Err(StreamError::internal(&format!(
                "row type too wide for 16-bit offsets: fixed {} + variable {}",
                offset, var_max
            )));
        }

        let bit_bytes = (bit_count + 7) / 8;
        let min_raw = offset + bit_bytes;
        let max_raw = min_raw + var_max;

        Ok(Self {
            schema: schema.clone(),
            fields,
            fixed_size: offset,
            last_var,
            bit_count,
            bit_bytes,
            min_size: Self::round(min_raw),
            max_size: Self::round(max_raw),
        })
    }

    // zero-byte tuples still occupy one alignment unit
    fn round(raw: usize) -> usize {
        align_up(raw.max(1), TUPLE_ALIGNMENT)
    }
}

impl TupleLayout {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> &FieldLayout {
        &self.fields[i]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    pub fn last_var(&self) -> Option<usize> {
        self.last_var
    }

    pub fn bit_count(&self) -> usize {
        self.bit_count
    }

    pub fn bit_bytes(&self) -> usize {
        self.bit_bytes
    }

    pub fn min_byte_count(&self) -> usize {
        self.min_size
    }

    pub fn max_byte_count(&self) -> usize {
        self.max_size
    }

    pub fn is_fixed_width(&self) -> bool {
        self.last_var.is_none()
    }

    /// Size of a tuple whose variable-width payloads total `var_len` bytes,
    /// padding included.
    pub fn size_with_var_len(&self, var_len: usize) -> usize {
        Self::round(self.fixed_size + var_len + self.bit_bytes)
    }

    /// Size of the marshalled image of `tuple`, padding included.
    ///
    /// Also validates the tuple against the descriptor, any disagreement is
    /// an internal error.
    pub fn byte_count(&self, tuple: &Tuple) -> StreamResult<usize> {
        self.check(tuple)?;
        if self.is_fixed_width() {
            return Ok(self.max_size);
        }

        let mut var_len = 0;
        for (field, cell) in self.fields.iter().zip(tuple.get_cells()) {
            if let Storage::Variable { .. } = field.storage {
                var_len += payload_len(cell);
            }
        }
        Ok(self.size_with_var_len(var_len))
    }

    fn check(&self, tuple: &Tuple) -> StreamResult<()> {
        if tuple.len() != self.fields.len() {
            return Err(StreamError::internal(&format!(
                "tuple has {} cells, row type declares {} fields",
                tuple.len(),
                self.fields.len()
            )));
        }

        for (i, (field, cell)) in self.fields.iter().zip(tuple.get_cells()).enumerate() {
            if cell.is_null() {
                if field.null_bit.is_none() {
                    return Err(StreamError::internal(&format!(
                        "null value in not-null field {} ({})",
                        i,
                        self.schema.get_field(i).name
                    )));
                }
                continue;
            }

            if !cell.matches(&field.t) {
                return Err(StreamError::internal(&format!(
                    "value {} doesn't match type {:?} of field {}",
                    cell, field.t, i
                )));
            }

            let len = payload_len(cell);
            if len > field.t.width() {
                return Err(StreamError::internal(&format!(
                    "value of length {} exceeds width {} of field {}",
                    len,
                    field.t.width(),
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Length of the variable part of a cell; fixed-width kinds report 0.
fn payload_len(cell: &Cell) -> usize {
    match cell {
        Cell::String(s) => s.len(),
        Cell::Bytes(b) => b.len(),
        _ => 0,
    }
}
