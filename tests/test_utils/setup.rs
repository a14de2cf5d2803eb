use small_stream::{utils, StreamConfig};

/// # Conduct the initialization
///
/// - Setting up log configurations.
/// - Reset the default buffer size.
pub fn setup() {
    utils::init_log();
    StreamConfig::set_buffer_size(0);
}

/// A config that doesn't depend on the environment the tests run in.
pub fn test_config(buffer_size: usize) -> StreamConfig {
    let mut config = StreamConfig::default().with_buffer_size(buffer_size);
    config.debug_marker = false;
    config.fetch_timeout = None;
    config.timeout_as_underflow = true;
    config.queue_capacity = 4;
    config
}
