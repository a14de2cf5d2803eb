use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use small_stream::{
    types::{SmallResult, StreamResult},
    Buffer, BufferSource, FetchResult, Tuple, TupleIter,
};

pub enum Step {
    Row(Tuple),
    Underflow,
}

/// An in-memory iterator that replays a script of rows and underflows.
pub struct VecIter {
    script: Vec<Step>,
    pos: usize,
    pub fetches: Arc<AtomicUsize>,
    pub restarts: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl VecIter {
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self::scripted(rows.into_iter().map(Step::Row).collect())
    }

    pub fn scripted(script: Vec<Step>) -> Self {
        Self {
            script,
            pos: 0,
            fetches: Arc::default(),
            restarts: Arc::default(),
            closed: Arc::default(),
        }
    }

    /// `rows` with an underflow before every `every`-th row.
    pub fn with_underflows(rows: Vec<Tuple>, every: usize) -> Self {
        let mut script = vec![];
        for (i, row) in rows.into_iter().enumerate() {
            if i % every == every - 1 {
                script.push(Step::Underflow);
            }
            script.push(Step::Row(row));
        }
        Self::scripted(script)
    }
}

impl TupleIter for VecIter {
    type Row = Tuple;

    fn fetch(&mut self) -> StreamResult<FetchResult<&Tuple>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.pos >= self.script.len() {
            return Ok(FetchResult::EndOfData);
        }
        self.pos += 1;
        match &self.script[self.pos - 1] {
            Step::Row(row) => Ok(FetchResult::Row(row)),
            Step::Underflow => Ok(FetchResult::Underflow),
        }
    }

    fn restart(&mut self) -> SmallResult {
        self.pos = 0;
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub enum Refill {
    Bytes(Vec<u8>),
    NoData,
}

/// A buffer source replaying prepared refill responses, then end of data.
pub struct ScriptedSource {
    script: Vec<Refill>,
    pos: usize,
    pub refills: Arc<AtomicUsize>,
    pub restarts: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub last_timeout: Arc<std::sync::Mutex<Option<Option<Duration>>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Refill>) -> Self {
        Self {
            script,
            pos: 0,
            refills: Arc::default(),
            restarts: Arc::default(),
            closes: Arc::default(),
            last_timeout: Arc::default(),
        }
    }

    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self::new(chunks.into_iter().map(Refill::Bytes).collect())
    }
}

impl BufferSource for ScriptedSource {
    fn refill(&mut self, buf: &mut Buffer, timeout: Option<Duration>) -> StreamResult<i64> {
        self.refills.fetch_add(1, Ordering::SeqCst);
        *self.last_timeout.lock().unwrap() = Some(timeout);
        if self.pos >= self.script.len() {
            return Ok(0);
        }
        self.pos += 1;
        match &self.script[self.pos - 1] {
            Refill::Bytes(bytes) => Ok(buf.fill_from(bytes) as i64),
            Refill::NoData => Ok(-1),
        }
    }

    fn restart(&mut self) -> SmallResult {
        self.pos = 0;
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
