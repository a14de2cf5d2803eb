use super::{Field, Type};

/// The row-type descriptor: field order, width and nullability. Every
/// layout decision of the codec derives from this and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn get_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub fn small_int_schema(width: usize) -> Schema {
    let mut fields: Vec<Field> = Vec::new();
    for i in 0..width {
        fields.push(Field::new(&format!("int-column-{}", i), Type::Int64));
    }

    Schema::new(fields)
}
