mod field;
mod schema;
mod types;

pub use field::Field;
pub use schema::{small_int_schema, Schema};
pub use types::Type;
