pub mod buffer;
pub mod codec;
pub mod config;
pub mod iter;
pub mod schema;
pub mod stream;
pub mod transform;
pub mod tuple;
pub mod types;
pub mod utils;

mod error;
mod log;

pub use buffer::{Buffer, BufferPipe, BufferPool};
pub use codec::{TupleCodec, TupleLayout, TupleReader, TupleWriter};
pub use config::StreamConfig;
pub use error::{ErrorKind, StreamError};
pub use iter::{BufferSource, BufferedTupleIter, FetchResult, TupleIter};
pub use schema::{Field, Schema, Type};
pub use stream::{CancelToken, ExecContext, PushTupleStream, StreamHandle};
pub use transform::TransformBridge;
pub use tuple::{Cell, Tuple};
