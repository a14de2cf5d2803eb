use std::{
    fmt::Debug,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info};

use super::CancelToken;
use crate::{
    buffer::{Buffer, BufferPool, PoolStats},
    codec::TupleWriter,
    config::StreamConfig,
    error::StreamError,
    iter::{FetchResult, Lookahead, TupleIter},
    types::{Shared, SmallResult, StreamResult},
    utils::HandyMutex,
};

/// Marshals rows of an iterator into pool buffers on a dedicated thread,
/// for the native consumer to pick up with `get_buffer`.
///
/// The producer stops at end of data, on `request_stop`, on cancellation of
/// the parent token, or on an error (recorded for `take_error`). However it
/// stops, it ends the stream with a zero-length buffer.
pub struct PushTupleStream<I, W>
where
    I: TupleIter,
{
    name: String,
    pool: Arc<BufferPool>,

    // the iterator and writer live here while no producer runs
    parts: Option<(I, W)>,
    worker: Option<JoinHandle<(I, W)>>,

    parent: CancelToken,
    stop: CancelToken,
    failure: Shared<Option<StreamError>>,
    backoff: Duration,
    closed: bool,
}

impl<I, W> PushTupleStream<I, W>
where
    I: TupleIter + Send + 'static,
    I::Row: Clone + Debug + Send,
    W: TupleWriter<Row = I::Row> + Send + 'static,
{
    pub fn new(name: &str, iter: I, writer: W, config: &StreamConfig, cancel: &CancelToken) -> Self {
        Self {
            name: name.to_string(),
            pool: Arc::new(BufferPool::new(name)),
            parts: Some((iter, writer)),
            worker: None,
            parent: cancel.clone(),
            stop: cancel.child(),
            failure: Arc::default(),
            backoff: config.underflow_backoff,
            closed: false,
        }
    }

    /// The pool the producer fills, for wiring a `PoolSource` to it.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Hand the pool its buffers and start the producer.
    pub fn open(&mut self, buffers: Vec<Buffer>) -> SmallResult {
        if self.closed {
            return Err(StreamError::closed("open of a closed push stream"));
        }
        if self.worker.is_some() {
            return Err(StreamError::internal(&format!(
                "push stream {} is already open",
                self.name
            )));
        }

        info!("{} open with {} buffers", self.name, buffers.len());
        self.pool.open(buffers);
        self.spawn()
    }

    fn spawn(&mut self) -> SmallResult {
        let (iter, writer) = self.parts.take().ok_or_else(|| {
            StreamError::internal(&format!("push stream {} lost its source", self.name))
        })?;

        self.stop = self.parent.child();
        let mut producer = Producer {
            name: self.name.clone(),
            iter,
            writer,
            pending: Lookahead::new(),
            pool: Arc::clone(&self.pool),
            stop: self.stop.clone(),
            failure: Arc::clone(&self.failure),
            backoff: self.backoff,
        };

        let handle = thread::Builder::new()
            .name(format!("push-{}", self.name))
            .spawn(move || {
                producer.run();
                (producer.iter, producer.writer)
            })
            .map_err(|e| StreamError::internal(&format!("can't spawn producer: {}", e)))?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Next filled buffer, or `None` if none is ready. Never blocks. A
    /// buffer with no readable bytes ends the stream.
    pub fn get_buffer(&self) -> Option<Buffer> {
        self.pool.acquire_filled_buffer(false)
    }

    pub fn free_buffer(&self, buffer: Buffer) {
        self.pool.release(buffer);
    }

    /// Ask the producer to stop, optionally waiting for its thread to end.
    pub fn request_stop(&mut self, wait: bool) -> SmallResult {
        debug!("{} stop requested, wait: {}", self.name, wait);
        self.stop.cancel();
        self.pool.interrupt_writer();
        if wait {
            self.join()?;
        }
        Ok(())
    }

    fn join(&mut self) -> SmallResult {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(parts) => self.parts = Some(parts),
                Err(_) => {
                    return Err(StreamError::internal(&format!(
                        "producer of {} panicked",
                        self.name
                    )))
                }
            }
        }
        Ok(())
    }

    /// Stop the producer, rewind the source and the pool, and start over.
    pub fn restart(&mut self) -> SmallResult {
        if self.closed {
            return Err(StreamError::closed("restart of a closed push stream"));
        }

        self.request_stop(true)?;
        if let Some((iter, _)) = self.parts.as_mut() {
            iter.restart()?;
        }
        self.pool.reset();
        self.failure.lk().take();

        info!("{} restarted", self.name);
        self.spawn()
    }

    /// Stop the producer, close the source, and give back the buffers the
    /// pool still holds. Later calls return nothing.
    pub fn close(&mut self) -> Vec<Buffer> {
        if self.closed {
            return vec![];
        }
        self.closed = true;

        if let Err(e) = self.request_stop(true) {
            error!("{} close: {}", self.name, e);
        }
        if let Some((iter, _)) = self.parts.as_mut() {
            iter.close();
        }

        info!("{} closed", self.name);
        self.pool.close()
    }

    /// The error the producer stopped with, if any. Taken only once.
    pub fn take_error(&self) -> Option<StreamError> {
        self.failure.lk().take()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<I: TupleIter, W> Drop for PushTupleStream<I, W> {
    fn drop(&mut self) {
        if !self.closed {
            self.stop.cancel();
            self.pool.interrupt_writer();
            self.pool.close();
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }
    }
}

struct Producer<I: TupleIter, W> {
    name: String,
    iter: I,
    writer: W,
    pending: Lookahead<I::Row>,
    pool: Arc<BufferPool>,
    stop: CancelToken,
    failure: Shared<Option<StreamError>>,
    backoff: Duration,
}

impl<I, W> Producer<I, W>
where
    I: TupleIter,
    I::Row: Clone + Debug,
    W: TupleWriter<Row = I::Row>,
{
    fn run(&mut self) {
        debug!("{} producer starts", self.name);
        if let Err(e) = self.produce() {
            error!("{} producer failed: {}", self.name, e);
            *self.failure.lk() = Some(e);
        }
        self.pool.publish_eos();
        debug!("{} producer ends", self.name);
    }

    fn produce(&mut self) -> SmallResult {
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            if !self.pending.is_full() {
                match self.iter.fetch()? {
                    FetchResult::Row(row) => self.pending.fill(row),
                    FetchResult::EndOfData => return Ok(()),
                    FetchResult::Underflow => {
                        thread::sleep(self.backoff);
                        continue;
                    }
                }
            }

            let mut buffer = match self.pool.acquire_free_buffer(true) {
                Some(buffer) => buffer,
                // pool closed or writer interrupted
                None => return Ok(()),
            };
            let filled = self.fill(&mut buffer);
            self.pool.publish(buffer);
            if filled? {
                return Ok(());
            }
        }
    }

    /// Marshal rows into `buffer` until it is full or the source has
    /// nothing more right now. Returns true when the stream is done.
    fn fill(&mut self, buffer: &mut Buffer) -> StreamResult<bool> {
        let mut written = 0;
        loop {
            let row = match self.pending.get() {
                Some(row) => row,
                None => return Ok(false),
            };
            if !self.writer.marshal(row, buffer)? {
                if written == 0 {
                    let size = self.writer.byte_count(row)?;
                    return Err(StreamError::row_too_long(
                        size,
                        buffer.capacity(),
                        &format!("{:?}", row),
                    ));
                }
                return Ok(false);
            }
            written += 1;
            self.pending.clear();

            if self.stop.is_cancelled() {
                return Ok(true);
            }
            match self.iter.fetch()? {
                FetchResult::Row(row) => self.pending.fill(row),
                FetchResult::EndOfData => return Ok(true),
                FetchResult::Underflow => return Ok(false),
            }
        }
    }
}
