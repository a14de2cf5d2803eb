use std::sync::{Mutex, MutexGuard};

pub use crate::log::init_log;

/// copy from https://github.com/tikv/tikv/blob/b15ea3b1cd766375cb52019e35c195ed797124df/components/tikv_util/src/lib.rs#L171-L186
///
/// A handy shortcut to replace `Mutex` lock().unwrap() pattern with `lk`.
pub trait HandyMutex<T: ?Sized> {
    fn lk(&self) -> MutexGuard<'_, T>;
}

impl<T: ?Sized> HandyMutex<T> for Mutex<T> {
    fn lk(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap()
    }
}

/// Round `value` up to the next multiple of `alignment`, which must be a
/// power of two.
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Render at most `limit` bytes as hex, for trace output.
pub fn hex_prefix(bytes: &[u8], limit: usize) -> String {
    if bytes.len() <= limit {
        hex::encode(bytes)
    } else {
        format!("{}..", hex::encode(&bytes[..limit]))
    }
}
