//! Object pool with a reset-before-reuse contract
//!
//! Publishing one notice per log call would otherwise allocate a fresh set of
//! strings every time. Objects handed back with [`Pool::put`] are reset and
//! kept (up to the pool capacity) for the next [`Pool::get`].

use std::sync::{Mutex, PoisonError};

use lc_protocol::PublishNotice;

/// Types that can be returned to a [`Pool`]
pub trait Reset {
    /// Return to the freshly-constructed state, keeping allocations.
    fn reset(&mut self);
}

impl Reset for PublishNotice {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Bounded pool of reusable objects
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Reset + Default> Pool<T> {
    /// Create a pool retaining at most `capacity` idle objects
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take an idle object, or build a new one
    pub fn get(&self) -> T {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Reset `item` and keep it for reuse; dropped when the pool is full
    pub fn put(&self, mut item: T) {
        item.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.capacity {
            idle.push(item);
        }
    }

    /// Number of idle objects
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Maximum number of idle objects retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
