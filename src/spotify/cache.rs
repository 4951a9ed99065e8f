use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

/// Single-value cache whose entry expires after a fixed time to live.
///
/// Used for lookups that rarely change during a session (the current user
/// profile), without serving stale data forever.
pub struct TtlCache<T> {
    ttl: Duration,
    entry: Mutex<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    fn get_at(&self, now: Instant) -> Option<T> {
        let entry = self.entry.lock().ok()?;
        match entry.as_ref() {
            Some((stored_at, value)) if now.duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn put(&self, value: T) {
        self.put_at(Instant::now(), value)
    }

    fn put_at(&self, now: Instant, value: T) {
        if let Ok(mut entry) = self.entry.lock() {
            *entry = Some((now, value));
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.lock() {
            *entry = None;
        }
    }

    /// Returns the cached value, or computes and caches a fresh one.
    /// Errors are not cached.
    pub fn get_or_try_insert<E>(&self, fetch: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(value) = self.get() {
            return Ok(value);
        }
        let value = fetch()?;
        self.put(value.clone());
        Ok(value)
    }
}
