use crate::core::error::QgramError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

/// Binds each calling thread to a stable slot in `0..capacity`.
///
/// Slots are handed out in arrival order and never revoked. Workers call
/// [`ThreadSlotRegistry::get`] once at startup and index their per-thread
/// state with the result.
#[derive(Debug)]
pub struct ThreadSlotRegistry {
    capacity: usize,
    slots: Mutex<HashMap<ThreadId, usize>>,
}

impl ThreadSlotRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    pub fn get(&self) -> Result<usize, QgramError> {
        let id = thread::current().id();
        let mut slots = self.slots.lock();
        if let Some(&slot) = slots.get(&id) {
            return Ok(slot);
        }
        let next = slots.len();
        if next >= self.capacity {
            return Err(QgramError::SlotsExhausted {
                capacity: self.capacity,
            });
        }
        slots.insert(id, next);
        Ok(next)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of threads bound so far.
    pub fn bound(&self) -> usize {
        self.slots.lock().len()
    }
}
