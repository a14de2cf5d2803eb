use std::{
    env,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use log::warn;
use once_cell::sync::Lazy;

pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
static BUFFER_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Snapshot of the `SMALL_STREAM_*` environment, taken once per process.
static ENV_CONFIG: Lazy<StreamConfig> = Lazy::new(StreamConfig::from_env);

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Capacity of the buffers a stream allocates for itself.
    pub buffer_size: usize,

    /// Number of buffers a push stream asks for when the caller doesn't
    /// supply its own.
    pub pool_buffers: usize,

    pub pipe_capacity: usize,
    pub queue_capacity: usize,

    /// Prepend the tuple marker to every tuple.
    pub debug_marker: bool,

    /// How long a non-blocking fetch may wait for the more-data signal.
    /// `None` means don't wait at all.
    pub fetch_timeout: Option<Duration>,
    pub timeout_as_underflow: bool,

    /// How long the push producer sleeps after its source underflows.
    pub underflow_backoff: Duration,

    /// How long the row iterator adapter sleeps between underflows.
    pub poll_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let mut config = ENV_CONFIG.clone();
        config.buffer_size = Self::get_buffer_size();
        config
    }
}

impl StreamConfig {
    fn from_env() -> Self {
        Self {
            buffer_size: env_or("SMALL_STREAM_BUFFER_SIZE", DEFAULT_BUFFER_SIZE),
            pool_buffers: env_or("SMALL_STREAM_POOL_BUFFERS", 4),
            pipe_capacity: env_or("SMALL_STREAM_PIPE_CAPACITY", 4),
            queue_capacity: env_or("SMALL_STREAM_QUEUE_CAPACITY", 100),
            debug_marker: env_or(
                "SMALL_STREAM_DEBUG_MARKER",
                cfg!(feature = "debug_marker"),
            ),
            fetch_timeout: env::var("SMALL_STREAM_FETCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis),
            timeout_as_underflow: env_or("SMALL_STREAM_TIMEOUT_AS_UNDERFLOW", true),
            underflow_backoff: Duration::from_millis(env_or(
                "SMALL_STREAM_UNDERFLOW_BACKOFF_MS",
                1,
            )),
            poll_interval: Duration::from_millis(env_or("SMALL_STREAM_POLL_INTERVAL_MS", 1)),
        }
    }

    /// Runtime override of the default buffer size, takes effect for
    /// configs created afterwards.
    pub fn set_buffer_size(size: usize) {
        BUFFER_SIZE.store(size, Ordering::Relaxed);
    }

    pub fn get_buffer_size() -> usize {
        match BUFFER_SIZE.load(Ordering::Relaxed) {
            0 => ENV_CONFIG.buffer_size,
            size => size,
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_debug_marker(mut self, enabled: bool) -> Self {
        self.debug_marker = enabled;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>, as_underflow: bool) -> Self {
        self.fetch_timeout = timeout;
        self.timeout_as_underflow = as_underflow;
        self
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => match v.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("ignore invalid value for {}: {}", key, v);
                default
            }
        },
        Err(_) => default,
    }
}
