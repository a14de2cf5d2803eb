use std::{thread::sleep, time::Duration};

use small_stream::{
    schema::small_int_schema, types::StreamResult, Buffer, Cell, FetchResult, Field, Schema, Tuple,
    TupleCodec, TupleIter, TupleLayout, TupleReader, TupleWriter, Type,
};

pub fn int_schema(width: usize) -> Schema {
    small_int_schema(width)
}

pub fn new_int_tuples(count: usize, width: usize) -> Vec<Tuple> {
    (0..count)
        .map(|i| Tuple::new_int_tuple(i as i64, width))
        .collect()
}

/// Every storage class: fixed, variable, not-null bool bits, nullable
/// fields.
pub fn mixed_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", Type::Int32),
        Field::nullable("name", Type::Varchar(16)),
        Field::new("flag", Type::Bool),
        Field::nullable("maybe", Type::Bool),
        Field::new("code", Type::Char(4)),
        Field::nullable("blob", Type::Varbinary(8)),
        Field::new("score", Type::Float64),
    ])
}

pub fn mixed_tuple(i: usize) -> Tuple {
    let name = if i % 3 == 0 {
        Cell::Null
    } else {
        Cell::String("x".repeat(i % 17))
    };
    let maybe = match i % 4 {
        0 => Cell::Null,
        1 => Cell::Bool(true),
        _ => Cell::Bool(false),
    };
    let blob = if i % 5 == 0 {
        Cell::Null
    } else {
        Cell::Bytes((0..(i % 9) as u8).collect())
    };

    Tuple::new(vec![
        Cell::Int32(i as i32),
        name,
        Cell::Bool(i % 2 == 0),
        maybe,
        Cell::String(format!("c{:03}", i % 1000)),
        blob,
        Cell::Float64(i as f64 * 0.5),
    ])
}

pub fn codec(schema: &Schema) -> TupleCodec {
    TupleCodec::new(TupleLayout::new(schema).unwrap().into(), false)
}

/// Marshal `rows` into as many buffers of `capacity` bytes as needed and
/// return the written bytes of each.
pub fn marshal_chunks(codec: &mut TupleCodec, rows: &[Tuple], capacity: usize) -> Vec<Vec<u8>> {
    let mut chunks = vec![];
    let mut buf = Buffer::new(capacity);
    for row in rows {
        if !codec.marshal(row, &mut buf).unwrap() {
            buf.flip();
            chunks.push(buf.filled().to_vec());
            buf.clear();
            assert!(codec.marshal(row, &mut buf).unwrap());
        }
    }
    if buf.position() > 0 {
        buf.flip();
        chunks.push(buf.filled().to_vec());
    }
    chunks
}

/// Unmarshal every row of a readable buffer.
pub fn unmarshal_all(codec: &mut TupleCodec, buf: &mut Buffer) -> Vec<Tuple> {
    let mut rows = vec![];
    let mut row = codec.new_row();
    while buf.has_remaining() {
        codec.unmarshal(buf, &mut row).unwrap();
        rows.push(row.clone());
    }
    rows
}

/// Fetch until end of data, waiting out underflows.
pub fn read_all<I: TupleIter<Row = Tuple>>(iter: &mut I) -> StreamResult<Vec<Tuple>> {
    let mut rows = vec![];
    loop {
        match iter.fetch()? {
            FetchResult::Row(row) => rows.push(row.clone()),
            FetchResult::EndOfData => return Ok(rows),
            FetchResult::Underflow => sleep(Duration::from_millis(1)),
        }
    }
}
