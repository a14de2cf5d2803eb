mod buffer;
mod pipe;
mod pool;

pub use buffer::Buffer;
pub use pipe::{BufferPipe, PipeReader, PipeWriter};
pub use pool::{BufferPool, PoolStats};
