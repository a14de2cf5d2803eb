mod cancel;
mod context;
mod push;

pub use cancel::CancelToken;
pub use context::{Allocation, ExecContext, StreamHandle};
pub use push::PushTupleStream;
