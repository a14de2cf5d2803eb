use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, error};

use super::{FetchResult, MoreDataListener, TupleIter};
use crate::{
    config::StreamConfig,
    error::StreamError,
    stream::CancelToken,
    types::{SmallResult, StreamResult},
    utils::HandyMutex,
};

/// How often a producer parked on a full queue looks at its stop token.
const SEND_POLL: Duration = Duration::from_millis(10);

/// Called on restart, before the producer runs again, to rewind whatever
/// inputs the producer reads from.
pub type RestartHook = Box<dyn FnMut() -> SmallResult + Send>;

type Producer<T> = Arc<dyn Fn(&RowSink<T>) -> SmallResult + Send + Sync>;

enum Message<T> {
    Row(T),
    Done(SmallResult),
}

#[derive(Default)]
struct Notifier {
    underflowed: AtomicBool,
    listeners: Mutex<Vec<MoreDataListener>>,
}

impl Notifier {
    fn on_underflow(&self) {
        self.underflowed.store(true, Ordering::SeqCst);
    }

    fn on_data(&self) {
        if self.underflowed.swap(false, Ordering::SeqCst) {
            self.fire();
        }
    }

    fn fire(&self) {
        let listeners = mem::take(&mut *self.listeners.lk());
        for listener in listeners {
            listener();
        }
    }
}

/// The producer's end of the queue.
pub struct RowSink<T> {
    sender: Sender<Message<T>>,
    stop: CancelToken,
    notifier: Arc<Notifier>,
}

impl<T> RowSink<T> {
    /// Queue a row, waiting while the queue is full. Fails with
    /// `Cancelled` once the iterator asks the producer to stop.
    pub fn put(&self, row: T) -> SmallResult {
        self.send(Message::Row(row))?;
        self.notifier.on_data();
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn check(&self) -> SmallResult {
        self.stop.check()
    }

    fn send(&self, mut message: Message<T>) -> SmallResult {
        loop {
            self.stop.check()?;
            match self.sender.send_timeout(message, SEND_POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(m)) => message = m,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(StreamError::closed("row queue consumer is gone"))
                }
            }
        }
    }

    fn finish(&self, result: SmallResult) {
        if let Err(e) = &result {
            debug!("producer finished with: {}", e);
        }
        if self.send(Message::Done(result)).is_ok() {
            self.notifier.on_data();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum QueueState {
    Idle,
    Running,
    Exhausted,
    Closed,
}

/// Rows computed by a producer closure running on its own thread, handed
/// over through a bounded queue.
///
/// The producer starts on the first fetch. A fetch waits up to the timeout
/// (indefinitely if none is set); running out of time reports `Underflow`
/// or a timeout error depending on `set_timeout`. Listeners registered with
/// `add_listener` fire once when data arrives after an underflow.
pub struct QueueTupleIter<T: Send + 'static> {
    name: String,
    capacity: usize,
    producer: Producer<T>,

    parent: CancelToken,
    stop: CancelToken,
    receiver: Option<Receiver<Message<T>>>,
    worker: Option<JoinHandle<()>>,

    current: Option<T>,
    state: QueueState,

    timeout: Option<Duration>,
    timeout_as_underflow: bool,

    notifier: Arc<Notifier>,
    restart_hooks: Vec<RestartHook>,
}

impl<T: Send + 'static> QueueTupleIter<T> {
    pub fn new<F>(name: &str, config: &StreamConfig, cancel: &CancelToken, producer: F) -> Self
    where
        F: Fn(&RowSink<T>) -> SmallResult + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            capacity: config.queue_capacity,
            producer: Arc::new(producer),
            parent: cancel.clone(),
            stop: cancel.child(),
            receiver: None,
            worker: None,
            current: None,
            state: QueueState::Idle,
            timeout: None,
            timeout_as_underflow: config.timeout_as_underflow,
            notifier: Arc::default(),
            restart_hooks: Vec::new(),
        }
    }

    pub fn add_restart_hook(&mut self, hook: RestartHook) {
        self.restart_hooks.push(hook);
    }

    fn start(&mut self) -> SmallResult {
        let (sender, receiver) = channel::bounded(self.capacity);
        self.stop = self.parent.child();
        let sink = RowSink {
            sender,
            stop: self.stop.clone(),
            notifier: Arc::clone(&self.notifier),
        };

        let producer = Arc::clone(&self.producer);
        let handle = thread::Builder::new()
            .name(format!("udx-{}", self.name))
            .spawn(move || {
                let result = producer(&sink);
                sink.finish(result);
            })
            .map_err(|e| {
                StreamError::internal(&format!("can't spawn producer of {}: {}", self.name, e))
            })?;

        debug!("{} producer started", self.name);
        self.receiver = Some(receiver);
        self.worker = Some(handle);
        self.state = QueueState::Running;
        Ok(())
    }

    fn stop_worker(&mut self) {
        self.stop.cancel();

        // a producer parked on a full queue fails its next send
        self.receiver = None;

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("{} producer panicked", self.name);
            }
            debug!("{} producer stopped", self.name);
        }
    }
}

impl<T: Send + 'static> TupleIter for QueueTupleIter<T> {
    type Row = T;

    fn fetch(&mut self) -> StreamResult<FetchResult<&T>> {
        match self.state {
            QueueState::Closed => return Err(StreamError::closed("fetch on a closed iterator")),
            QueueState::Exhausted => return Ok(FetchResult::EndOfData),
            QueueState::Idle => self.start()?,
            QueueState::Running => {}
        }

        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| StreamError::internal("running iterator without a queue"))?;
        let received = match self.timeout {
            None => receiver
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
            Some(t) => receiver.recv_timeout(t),
        };

        match received {
            Ok(Message::Row(row)) => Ok(FetchResult::Row(&*self.current.insert(row))),
            Ok(Message::Done(result)) => {
                self.state = QueueState::Exhausted;
                self.stop_worker();
                result?;
                Ok(FetchResult::EndOfData)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.notifier.on_underflow();
                if self.timeout_as_underflow {
                    Ok(FetchResult::Underflow)
                } else {
                    Err(StreamError::timeout(&format!(
                        "{} produced nothing within {:?}",
                        self.name, self.timeout
                    )))
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let cancelled = self.stop.is_cancelled();
                self.state = QueueState::Exhausted;
                self.stop_worker();
                if cancelled {
                    return Err(StreamError::cancelled());
                }
                Err(StreamError::internal(&format!(
                    "{} producer exited without finishing",
                    self.name
                )))
            }
        }
    }

    fn restart(&mut self) -> SmallResult {
        if self.state == QueueState::Closed {
            return Err(StreamError::closed("restart of a closed iterator"));
        }

        self.stop_worker();
        for hook in self.restart_hooks.iter_mut() {
            hook()?;
        }
        self.current = None;
        self.start()
    }

    fn close(&mut self) {
        if self.state != QueueState::Closed {
            self.stop_worker();
            self.state = QueueState::Closed;
        }
    }

    fn add_listener(&mut self, listener: MoreDataListener) -> bool {
        self.notifier.listeners.lk().push(listener);
        if let Some(receiver) = &self.receiver {
            if !receiver.is_empty() {
                self.notifier.fire();
            }
        }
        true
    }

    fn set_timeout(&mut self, timeout: Option<Duration>, as_underflow: bool) -> bool {
        self.timeout = timeout;
        self.timeout_as_underflow = as_underflow;
        true
    }
}

impl<T: Send + 'static> Drop for QueueTupleIter<T> {
    fn drop(&mut self) {
        self.close();
    }
}
