use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use log::{debug, error, trace};

use super::Buffer;
use crate::{iter::MoreDataListener, utils::HandyMutex};

/// Snapshot of where the buffers of a pool are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub free: usize,
    pub queued: usize,

    /// Held by the writer or the reader.
    pub active: usize,
    pub capacity: usize,
}

struct PoolState {
    free: VecDeque<Buffer>,
    queued: VecDeque<Buffer>,
    writing: usize,
    reading: usize,
    capacity: usize,

    open: bool,

    // blocking free-buffer waits give up while this is set
    writer_interrupted: bool,

    // the end-of-stream buffer is owed to the reader, the next released
    // buffer becomes it
    eos_pending: bool,

    listener: Option<MoreDataListener>,
}

impl PoolState {
    fn stats(&self) -> PoolStats {
        PoolStats {
            free: self.free.len(),
            queued: self.queued.len(),
            active: self.writing + self.reading,
            capacity: self.capacity,
        }
    }

    fn check(&self) {
        let stats = self.stats();
        debug_assert_eq!(
            stats.free + stats.queued + stats.active,
            stats.capacity,
            "buffer pool invariant broken: {:?}",
            stats
        );
    }

    fn enqueue(&mut self, buffer: Buffer) -> Option<MoreDataListener> {
        self.queued.push_back(buffer);
        self.listener.take()
    }
}

/// A fixed set of buffers shared by exactly one writer and one reader.
///
/// Lifecycle of a buffer: on the free list, taken by the writer and filled,
/// on the queue, taken by the reader and drained, released back to the free
/// list. Every transition happens under the pool's one lock, and at any
/// instant `free + queued + active == capacity`.
pub struct BufferPool {
    name: String,
    state: Mutex<PoolState>,
    cond: Condvar,
}

impl BufferPool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(PoolState {
                free: VecDeque::new(),
                queued: VecDeque::new(),
                writing: 0,
                reading: 0,
                capacity: 0,
                open: false,
                writer_interrupted: false,
                eos_pending: false,
                listener: None,
            }),
            cond: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lk()
    }

    /// Seed the free list with an externally supplied set of buffers.
    pub fn open(&self, buffers: Vec<Buffer>) {
        let mut state = self.state();
        debug!(
            "{} open with buffers: {:?}",
            self.name,
            buffers.iter().map(|b| b.id()).collect::<Vec<_>>()
        );

        state.capacity += buffers.len();
        state.free.extend(buffers);
        state.open = true;
        state.writer_interrupted = false;
        state.eos_pending = false;
        state.check();
    }

    /// Release all buffers the pool holds and hand them back. Buffers still
    /// held by the writer or reader are dropped when they come back.
    pub fn close(&self) -> Vec<Buffer> {
        let mut state = self.state();
        state.open = false;
        state.eos_pending = false;
        state.listener = None;

        let mut buffers: Vec<Buffer> = state.free.drain(..).collect();
        buffers.extend(state.queued.drain(..));
        state.capacity -= buffers.len();
        state.check();

        debug!("{} closed, {} buffers returned", self.name, buffers.len());
        self.cond.notify_all();
        buffers
    }

    /// Move everything queued back to the free list, used when the stream
    /// restarts. Buffers held by the reader stay where they are.
    pub fn reset(&self) {
        let mut state = self.state();
        while let Some(mut buffer) = state.queued.pop_front() {
            buffer.clear();
            state.free.push_back(buffer);
        }
        state.writer_interrupted = false;
        state.eos_pending = false;
        state.check();
        self.cond.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.state().open
    }

    pub fn stats(&self) -> PoolStats {
        self.state().stats()
    }

    /// Writer takes a blank buffer.
    ///
    /// With `blocking` false this returns `None` at once if no buffer is
    /// free. With `blocking` true it waits, and still returns `None` if the
    /// pool is closed or the writer is interrupted meanwhile.
    pub fn acquire_free_buffer(&self, blocking: bool) -> Option<Buffer> {
        let mut state = self.state();
        loop {
            if !state.open {
                return None;
            }
            if let Some(mut buffer) = state.free.pop_front() {
                buffer.clear();
                state.writing += 1;
                state.check();
                trace!("{} writer gets blank {:?}", self.name, buffer);
                return Some(buffer);
            }
            if !blocking || state.writer_interrupted {
                trace!("{} writer gets no blank buffer", self.name);
                return None;
            }

            trace!("{} writer waits", self.name);
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Writer queues a filled buffer for the reader. A buffer with nothing
    /// written goes back to the free list; end of stream is signalled with
    /// `publish_eos`.
    pub fn publish(&self, mut buffer: Buffer) {
        buffer.flip();
        let listener = {
            let mut state = self.state();
            if state.writing == 0 {
                error!("{} publish of a buffer the writer doesn't hold", self.name);
                return;
            }
            state.writing -= 1;

            if !state.open {
                state.capacity -= 1;
                state.check();
                return;
            }

            if buffer.is_eos() {
                trace!("{} writer returns unused {:?}", self.name, buffer);
                buffer.clear();
                state.free.push_front(buffer);
                state.check();
                self.cond.notify_all();
                return;
            }

            debug!("{} writer adds {:?}", self.name, buffer);
            let listener = state.enqueue(buffer);
            state.check();
            self.cond.notify_all();
            listener
        };

        if let Some(listener) = listener {
            listener();
        }
    }

    /// Writer signals end of stream. Queues a zero-length buffer right away
    /// if one is free, otherwise the next buffer the reader releases is
    /// turned into it. Never blocks.
    pub fn publish_eos(&self) {
        let listener = {
            let mut state = self.state();
            if !state.open {
                return;
            }

            match state.free.pop_front() {
                Some(mut buffer) => {
                    buffer.clear();
                    buffer.flip();
                    debug!("{} writer sends EOS in {:?}", self.name, buffer);
                    let listener = state.enqueue(buffer);
                    state.check();
                    self.cond.notify_all();
                    listener
                }
                None => {
                    debug!("{} EOS pending until a buffer is released", self.name);
                    state.eos_pending = true;
                    None
                }
            }
        };

        if let Some(listener) = listener {
            listener();
        }
    }

    /// Reader takes the next filled buffer, in publish order.
    ///
    /// With `blocking` false this returns `None` at once if nothing is
    /// queued. With `blocking` true it waits, and returns `None` only if
    /// the pool is closed meanwhile.
    pub fn acquire_filled_buffer(&self, blocking: bool) -> Option<Buffer> {
        if blocking {
            self.take_filled(None)
        } else {
            self.take_filled(Some(Instant::now()))
        }
    }

    /// Like a blocking `acquire_filled_buffer`, but gives up with `None`
    /// once `timeout` has passed.
    pub fn acquire_filled_buffer_timeout(&self, timeout: Duration) -> Option<Buffer> {
        self.take_filled(Some(Instant::now() + timeout))
    }

    fn take_filled(&self, deadline: Option<Instant>) -> Option<Buffer> {
        let mut state = self.state();
        loop {
            if !state.open {
                return None;
            }
            if let Some(buffer) = state.queued.pop_front() {
                state.reading += 1;
                state.check();
                trace!("{} reader gets {:?}", self.name, buffer);
                return Some(buffer);
            }

            state = match deadline {
                None => {
                    trace!("{} reader waits", self.name);
                    self.cond.wait(state).unwrap()
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.cond.wait_timeout(state, deadline - now).unwrap().0
                }
            };
        }
    }

    /// Reader returns a drained buffer.
    pub fn release(&self, mut buffer: Buffer) {
        let listener = {
            let mut state = self.state();
            if state.reading == 0 {
                error!("{} release of a buffer the reader doesn't hold", self.name);
                return;
            }
            state.reading -= 1;

            if !state.open {
                state.capacity -= 1;
                state.check();
                return;
            }

            buffer.clear();
            let listener = if state.eos_pending {
                state.eos_pending = false;
                buffer.flip();
                debug!("{} released {:?} becomes EOS", self.name, buffer);
                state.enqueue(buffer)
            } else {
                trace!("{} reader frees {:?}", self.name, buffer);
                state.free.push_front(buffer);
                None
            };
            state.check();
            self.cond.notify_all();
            listener
        };

        if let Some(listener) = listener {
            listener();
        }
    }

    /// Make a writer parked in a blocking acquire give up, and keep later
    /// blocking acquires from waiting, until the pool is reset or reopened.
    pub fn interrupt_writer(&self) {
        let mut state = self.state();
        state.writer_interrupted = true;
        self.cond.notify_all();
    }

    /// Register a callback for the next time a buffer becomes available to
    /// the reader. Fires right away if one already is.
    pub fn add_listener(&self, listener: MoreDataListener) {
        let mut state = self.state();
        if !state.queued.is_empty() {
            drop(state);
            listener();
            return;
        }
        state.listener = Some(listener);
    }
}
