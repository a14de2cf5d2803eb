use std::sync::{Arc, Mutex};

use crate::error::StreamError;

pub type Shared<T> = Arc<Mutex<T>>;
pub type StreamResult<T> = Result<T, StreamError>;
pub type SmallResult = Result<(), StreamError>;
