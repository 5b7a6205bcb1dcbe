//! # Result Cache
//! Single-slot, time-boxed memoization of the last successful extraction.
//!
//! Expiry is lazy: an entry older than the TTL is dropped by the first read
//! that notices it. There is no background eviction task. The TTL is absolute
//! (reads do not refresh it).

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

#[derive(Debug)]
struct CacheEntry<T> {
    payload: T,
    stored_at: Instant,
}

/// One global slot. Shared across handler tasks, hence the mutex.
#[derive(Debug)]
pub struct ResultCache<T> {
    slot: Mutex<Option<CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self::new(Duration::from_millis(ttl_ms))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `payload`, overwriting any previous entry.
    pub fn set(&self, payload: T) {
        self.set_at(payload, Instant::now());
    }

    /// Payload if still fresh; an expired entry is cleared.
    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    /// Fresh payload together with its age, read under one lock.
    pub fn get_with_age(&self) -> Option<(T, Duration)> {
        let now = Instant::now();
        let mut slot = self.lock();
        let age = now.saturating_duration_since(slot.as_ref()?.stored_at);
        if age > self.ttl {
            *slot = None;
            return None;
        }
        slot.as_ref().map(|entry| (entry.payload.clone(), age))
    }

    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    /// Time since the entry was stored. Does not check expiry.
    pub fn age(&self) -> Option<Duration> {
        self.age_at(Instant::now())
    }

    pub fn age_ms(&self) -> Option<u64> {
        self.age().map(|d| d.as_millis() as u64)
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn set_at(&self, payload: T, now: Instant) {
        *self.lock() = Some(CacheEntry {
            payload,
            stored_at: now,
        });
    }

    fn get_at(&self, now: Instant) -> Option<T> {
        let mut slot = self.lock();
        let expired = match slot.as_ref() {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.stored_at) > self.ttl,
        };
        if expired {
            *slot = None;
            return None;
        }
        slot.as_ref().map(|entry| entry.payload.clone())
    }

    fn age_at(&self, now: Instant) -> Option<Duration> {
        self.lock()
            .as_ref()
            .map(|entry| now.saturating_duration_since(entry.stored_at))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CacheEntry<T>>> {
        // A panic while holding the guard cannot leave the slot half-written.
        match self.slot.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl<T: Clone> Default for ResultCache<T> {
    fn default() -> Self {
        Self::with_ttl_ms(DEFAULT_CACHE_TTL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_has_nothing() {
        let c: ResultCache<u32> = ResultCache::default();
        assert_eq!(c.get(), None);
        assert!(!c.is_valid());
        assert_eq!(c.age(), None);
        assert_eq!(c.ttl(), Duration::from_millis(300_000));
    }

    #[test]
    fn set_then_get_within_ttl() {
        let c = ResultCache::with_ttl_ms(1_000);
        c.set("payload".to_string());
        assert_eq!(c.get().as_deref(), Some("payload"));
        assert!(c.is_valid());
        assert!(c.age().is_some());
    }

    #[test]
    fn entry_at_exactly_ttl_is_still_served() {
        let c = ResultCache::with_ttl_ms(1_000);
        let t0 = Instant::now();
        c.set_at(7u32, t0);
        assert_eq!(c.get_at(t0 + Duration::from_millis(1_000)), Some(7));
    }

    #[test]
    fn expired_entry_is_purged_on_read() {
        let c = ResultCache::with_ttl_ms(1_000);
        let t0 = Instant::now();
        c.set_at(7u32, t0);

        assert_eq!(c.get_at(t0 + Duration::from_millis(1_001)), None);
        // The slot is gone, not just hidden.
        assert_eq!(c.age_at(t0 + Duration::from_millis(1_002)), None);
    }

    #[test]
    fn set_overwrites_and_restarts_the_clock() {
        let c = ResultCache::with_ttl_ms(1_000);
        let t0 = Instant::now();
        c.set_at(1u32, t0);
        c.set_at(2u32, t0 + Duration::from_millis(900));

        assert_eq!(c.get_at(t0 + Duration::from_millis(1_500)), Some(2));
        assert_eq!(
            c.age_at(t0 + Duration::from_millis(1_500)),
            Some(Duration::from_millis(600))
        );
    }

    #[test]
    fn get_with_age_reports_both() {
        let c = ResultCache::with_ttl_ms(60_000);
        assert!(c.get_with_age().is_none());
        c.set("dual");
        let (payload, age) = c.get_with_age().expect("fresh entry");
        assert_eq!(payload, "dual");
        assert!(age < Duration::from_secs(60));
    }

    #[test]
    fn clear_empties_unconditionally() {
        let c = ResultCache::with_ttl_ms(60_000);
        c.set(5u8);
        c.clear();
        assert_eq!(c.get(), None);
        assert_eq!(c.age_ms(), None);
    }

    #[test]
    fn zero_ttl_only_serves_the_same_instant() {
        let c = ResultCache::new(Duration::ZERO);
        let t0 = Instant::now();
        c.set_at(1u8, t0);
        assert_eq!(c.get_at(t0), Some(1));
        assert_eq!(c.get_at(t0 + Duration::from_millis(1)), None);
    }
}
