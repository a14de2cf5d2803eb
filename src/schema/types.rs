/// Storage type of a field, as declared by the row-type descriptor.
///
/// The length carried by the string/binary types is the declared width in
/// bytes: the exact width for `Char`/`Binary`, the upper bound for
/// `Varchar`/`Varbinary`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Type {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Char(u16),
    Binary(u16),
    Varchar(u16),
    Varbinary(u16),
}

impl Type {
    pub fn is_fixed_width(&self) -> bool {
        !matches!(self, Type::Varchar(_) | Type::Varbinary(_))
    }

    pub fn is_bool(&self) -> bool {
        *self == Type::Bool
    }

    /// Width in bytes of the value when it's stored in the fixed region.
    /// For variable-width types this is the maximum payload length.
    pub fn width(&self) -> usize {
        match self {
            Type::Bool | Type::Int8 => 1,
            Type::Int16 => 2,
            Type::Int32 | Type::Float32 => 4,
            Type::Int64 | Type::Float64 => 8,
            Type::Char(n) | Type::Binary(n) | Type::Varchar(n) | Type::Varbinary(n) => *n as usize,
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self, Type::Char(_) | Type::Varchar(_))
    }
}
