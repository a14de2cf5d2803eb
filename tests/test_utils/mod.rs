mod rows;
mod setup;
mod sources;

pub use rows::*;
pub use setup::*;
pub use sources::*;
