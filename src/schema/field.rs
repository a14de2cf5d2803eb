use super::Type;

#[derive(PartialEq, Debug, Clone)]
pub struct Field {
    pub name: String,
    pub t: Type,
    pub nullable: bool,
}

impl Field {
    pub fn new(field_name: &str, field_type: Type) -> Field {
        Field {
            name: field_name.to_string(),
            t: field_type,
            nullable: false,
        }
    }

    pub fn nullable(field_name: &str, field_type: Type) -> Field {
        Field {
            name: field_name.to_string(),
            t: field_type,
            nullable: true,
        }
    }

    /// Not-null booleans are stored as a single bit in the bit map.
    pub fn is_bit(&self) -> bool {
        self.t.is_bool() && !self.nullable
    }
}
