use std::{
    fmt::{self, Debug},
    mem,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};

use log::{debug, info};

use super::{CancelToken, PushTupleStream};
use crate::{
    buffer::{Buffer, BufferPipe, PipeReader, PipeWriter},
    codec::{TupleReader, TupleWriter},
    config::StreamConfig,
    iter::{BufferSource, BufferedTupleIter, QueueTupleIter, TupleIter},
    transform::TransformBridge,
    types::{Shared, SmallResult},
    utils::HandyMutex,
};

/// Opaque token by which the native side refers to a stream it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// Something an execution context closes on the way out.
pub trait Allocation: Send {
    fn close_allocation(&mut self);
}

impl<I, W> Allocation for PushTupleStream<I, W>
where
    I: TupleIter + Send + 'static,
    I::Row: Clone + Debug + Send,
    W: TupleWriter<Row = I::Row> + Send + 'static,
{
    fn close_allocation(&mut self) {
        let buffers = self.close();
        debug!("push stream closed, {} buffers dropped", buffers.len());
    }
}

impl<S, R> Allocation for BufferedTupleIter<S, R>
where
    S: BufferSource + Send,
    R: TupleReader + Send,
    R::Row: Send,
{
    fn close_allocation(&mut self) {
        self.close();
    }
}

impl<T: Send + 'static> Allocation for QueueTupleIter<T> {
    fn close_allocation(&mut self) {
        self.close();
    }
}

impl<I, W> Allocation for TransformBridge<I, W>
where
    I: TupleIter + Send,
    I::Row: Send,
    W: Send,
{
    fn close_allocation(&mut self) {
        self.close();
    }
}

/// Per-statement execution state: the cancel flag every stream observes,
/// and the allocations to close when the statement ends.
pub struct ExecContext {
    config: StreamConfig,
    cancel: CancelToken,
    next_handle: AtomicU64,
    allocations: Mutex<Vec<(StreamHandle, Shared<dyn Allocation>)>>,
    closed: AtomicBool,
}

impl ExecContext {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            next_handle: AtomicU64::new(1),
            allocations: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// A token that observes this context's cancellation, for the streams
    /// created under it.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.child()
    }

    pub fn cancel(&self) {
        info!("execution cancelled");
        self.cancel.cancel();
    }

    pub fn check_cancel(&self) -> SmallResult {
        self.cancel.check()
    }

    /// The buffers a push stream under this context is opened with.
    pub fn allocate_buffers(&self) -> Vec<Buffer> {
        Buffer::allocate(self.config.pool_buffers, self.config.buffer_size)
    }

    /// A pipe over `pipe_capacity` buffers of the configured size.
    pub fn open_pipe(&self) -> (PipeWriter, PipeReader) {
        BufferPipe::new(Buffer::allocate(
            self.config.pipe_capacity,
            self.config.buffer_size,
        ))
    }

    /// Track an allocation until `close`, and hand out a handle for it.
    pub fn register<A: Allocation + 'static>(&self, allocation: Shared<A>) -> StreamHandle {
        let handle = StreamHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let allocation: Shared<dyn Allocation> = allocation;
        if self.is_closed() {
            debug!("{} registered after close, closing it now", handle);
            allocation.lk().close_allocation();
            return handle;
        }

        self.allocations.lk().push((handle, allocation));
        debug!("registered {}", handle);
        handle
    }

    pub fn contains(&self, handle: StreamHandle) -> bool {
        self.allocations.lk().iter().any(|(h, _)| *h == handle)
    }

    pub fn len(&self) -> usize {
        self.allocations.lk().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close one allocation ahead of the context. Returns false if the
    /// handle is unknown or already closed.
    pub fn close_stream(&self, handle: StreamHandle) -> bool {
        let allocation = {
            let mut allocations = self.allocations.lk();
            match allocations.iter().position(|(h, _)| *h == handle) {
                Some(i) => allocations.remove(i).1,
                None => return false,
            }
        };
        allocation.lk().close_allocation();
        debug!("closed {}", handle);
        true
    }

    /// Close every registered allocation, most recent first. Only the first
    /// call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let allocations = mem::take(&mut *self.allocations.lk());
        info!("closing execution context, {} allocations", allocations.len());
        for (handle, allocation) in allocations.into_iter().rev() {
            allocation.lk().close_allocation();
            debug!("closed {}", handle);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ExecContext {
    fn drop(&mut self) {
        self.close();
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}
