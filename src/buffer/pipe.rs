use std::{sync::Arc, time::Duration};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, trace, warn};

use super::Buffer;
use crate::{
    error::StreamError,
    iter::{BufferSource, MoreDataListener},
    types::{Shared, SmallResult, StreamResult},
    utils::HandyMutex,
};

type ListenerSlot = Shared<Option<MoreDataListener>>;

/// A fixed set of buffers passed from one writer to one reader and back.
///
/// The writer takes a blank buffer, fills it and queues it; the reader
/// copies it out and hands it back blank. The filled queue has one slot
/// beyond the size of the set, kept for the zero-length sentinel that ends
/// the stream.
pub struct BufferPipe;

impl BufferPipe {
    pub fn new(buffers: Vec<Buffer>) -> (PipeWriter, PipeReader) {
        let count = buffers.len();
        if count == 0 {
            warn!("pipe opened without buffers, writes will wait forever");
        }

        let (filled_tx, filled_rx) = channel::bounded(count + 1);
        let (free_tx, free_rx) = channel::bounded(count.max(1));
        for mut buffer in buffers {
            buffer.clear();
            // room for the whole set
            let _ = free_tx.try_send(buffer);
        }
        debug!("pipe opened with {} buffers", count);

        let listener: ListenerSlot = Arc::default();
        (
            PipeWriter {
                filled: Some(filled_tx),
                free: Some(free_rx),
                spare: None,
                listener: Arc::clone(&listener),
            },
            PipeReader {
                filled: Some(filled_rx),
                free: Some(free_tx),
                listener,
                eos: false,
            },
        )
    }
}

pub struct PipeWriter {
    filled: Option<Sender<Buffer>>,
    free: Option<Receiver<Buffer>>,

    // a blank buffer taken but not sent, used by the next write
    spare: Option<Buffer>,

    listener: ListenerSlot,
}

impl PipeWriter {
    fn sender(&self) -> StreamResult<&Sender<Buffer>> {
        self.filled
            .as_ref()
            .ok_or_else(|| StreamError::closed("write to a closed pipe"))
    }

    /// Copy `data` into a blank buffer and queue it, waiting while every
    /// buffer is with the reader. Fails once the reader is gone.
    pub fn write(&mut self, data: &[u8]) -> SmallResult {
        self.sender()?;
        if data.is_empty() {
            return Ok(());
        }

        match self.blank(true)? {
            Some(buffer) => self.send(buffer, data),
            None => Err(StreamError::closed("pipe reader is gone")),
        }
    }

    /// Like `write`, but returns `Ok(false)` instead of waiting when no
    /// blank buffer is available.
    pub fn try_write(&mut self, data: &[u8]) -> StreamResult<bool> {
        self.sender()?;
        if data.is_empty() {
            return Ok(true);
        }

        match self.blank(false)? {
            Some(buffer) => {
                self.send(buffer, data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Queue the sentinel and hang up. Never waits. Safe to call more than
    /// once.
    pub fn close(&mut self) {
        self.free = None;
        self.spare = None;

        if let Some(sender) = self.filled.take() {
            match sender.try_send(Buffer::sentinel()) {
                Ok(()) => {
                    debug!("pipe writer closed");
                    self.notify();
                }
                Err(TrySendError::Full(_)) => {
                    warn!("no room for the pipe sentinel, the reader sees a hang-up");
                    self.notify();
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("pipe writer closed, reader already gone")
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.filled.is_none()
    }

    fn blank(&mut self, blocking: bool) -> StreamResult<Option<Buffer>> {
        if let Some(buffer) = self.spare.take() {
            return Ok(Some(buffer));
        }

        let free = self
            .free
            .as_ref()
            .ok_or_else(|| StreamError::closed("write to a closed pipe"))?;
        let received = if blocking {
            free.recv().map_err(|_| TryRecvError::Disconnected)
        } else {
            free.try_recv()
        };

        match received {
            Ok(buffer) => Ok(Some(buffer)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(StreamError::closed("pipe reader is gone")),
        }
    }

    fn send(&mut self, mut buffer: Buffer, data: &[u8]) -> SmallResult {
        if data.len() > buffer.capacity() {
            let capacity = buffer.capacity();
            self.spare = Some(buffer);
            return Err(StreamError::internal(&format!(
                "write of {} bytes into a {} byte pipe buffer",
                data.len(),
                capacity
            )));
        }

        buffer.fill_from(data);
        trace!("pipe write {:?}", buffer);

        // doesn't wait, the queue has a slot for every buffer of the set
        self.sender()?
            .send(buffer)
            .map_err(|_| StreamError::closed("pipe reader is gone"))?;
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        let listener = self.listener.lk().take();
        if let Some(listener) = listener {
            listener();
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct PipeReader {
    filled: Option<Receiver<Buffer>>,
    free: Option<Sender<Buffer>>,
    listener: ListenerSlot,
    eos: bool,
}

impl PipeReader {
    /// Copy a filled buffer into `buf` and hand it back to the writer.
    fn drain(&self, mut filled: Buffer, buf: &mut Buffer) -> StreamResult<i64> {
        let len = filled.limit();
        let fits = len <= buf.capacity();
        if fits {
            buf.fill_from(filled.filled());
        }

        filled.clear();
        if let Some(free) = &self.free {
            // fails only once the writer is gone, the buffer is dropped then
            let _ = free.try_send(filled);
        }

        if !fits {
            return Err(StreamError::internal(&format!(
                "pipe buffer of {} bytes doesn't fit the {} byte read buffer",
                len,
                buf.capacity()
            )));
        }
        Ok(len as i64)
    }
}

impl BufferSource for PipeReader {
    fn refill(&mut self, buf: &mut Buffer, timeout: Option<Duration>) -> StreamResult<i64> {
        if self.eos {
            return Ok(0);
        }
        let receiver = self
            .filled
            .as_ref()
            .ok_or_else(|| StreamError::closed("read from a closed pipe"))?;

        let received = match timeout {
            None => receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
            Some(t) if t == Duration::from_secs(0) => receiver.try_recv().map_err(|e| match e {
                TryRecvError::Empty => RecvTimeoutError::Timeout,
                TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
            }),
            Some(t) => receiver.recv_timeout(t),
        };

        match received {
            Ok(buffer) if buffer.is_eos() => {
                debug!("pipe reader got EOS");
                self.eos = true;
                Ok(0)
            }
            Ok(buffer) => self.drain(buffer, buf),
            Err(RecvTimeoutError::Timeout) => Ok(-1),
            Err(RecvTimeoutError::Disconnected) => {
                warn!("pipe writer hung up without EOS");
                self.eos = true;
                Ok(0)
            }
        }
    }

    /// Forget the end of stream, the writer side may start a new round.
    fn restart(&mut self) -> SmallResult {
        self.eos = false;
        Ok(())
    }

    fn close(&mut self) {
        self.free = None;
        if self.filled.take().is_some() {
            debug!("pipe reader closed");
        }
    }

    fn add_listener(&mut self, listener: MoreDataListener) -> bool {
        let receiver = match &self.filled {
            Some(r) => r,
            None => return false,
        };

        *self.listener.lk() = Some(listener);
        if !receiver.is_empty() {
            let listener = self.listener.lk().take();
            if let Some(listener) = listener {
                listener();
            }
        }
        true
    }
}
