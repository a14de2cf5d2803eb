use std::fmt;

use crate::schema::Type;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// An empty value of the kind that `t` unmarshals into, used to seed
    /// scratch tuples.
    pub fn default_for(t: &Type) -> Cell {
        match t {
            Type::Bool => Cell::Bool(false),
            Type::Int8 => Cell::Int8(0),
            Type::Int16 => Cell::Int16(0),
            Type::Int32 => Cell::Int32(0),
            Type::Int64 => Cell::Int64(0),
            Type::Float32 => Cell::Float32(0.0),
            Type::Float64 => Cell::Float64(0.0),
            Type::Char(n) | Type::Varchar(n) => Cell::String(String::with_capacity(*n as usize)),
            Type::Binary(n) | Type::Varbinary(n) => Cell::Bytes(Vec::with_capacity(*n as usize)),
        }
    }

    /// Whether this cell can be stored in a field of type `t` (NULL is
    /// checked separately against nullability).
    pub fn matches(&self, t: &Type) -> bool {
        match (self, t) {
            (Cell::Null, _) => true,
            (Cell::Bool(_), Type::Bool) => true,
            (Cell::Int8(_), Type::Int8) => true,
            (Cell::Int16(_), Type::Int16) => true,
            (Cell::Int32(_), Type::Int32) => true,
            (Cell::Int64(_), Type::Int64) => true,
            (Cell::Float32(_), Type::Float32) => true,
            (Cell::Float64(_), Type::Float64) => true,
            (Cell::String(_), Type::Char(_)) | (Cell::String(_), Type::Varchar(_)) => true,
            (Cell::Bytes(_), Type::Binary(_)) | (Cell::Bytes(_), Type::Varbinary(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Bool(v) => write!(f, "{}", v),
            Cell::Int8(v) => write!(f, "{}", v),
            Cell::Int16(v) => write!(f, "{}", v),
            Cell::Int32(v) => write!(f, "{}", v),
            Cell::Int64(v) => write!(f, "{}", v),
            Cell::Float32(v) => write!(f, "{}", v),
            Cell::Float64(v) => write!(f, "{}", v),
            Cell::String(v) => write!(f, "'{}'", v),
            Cell::Bytes(v) => write!(f, "X'{}'", hex::encode(v)),
        }
    }
}
