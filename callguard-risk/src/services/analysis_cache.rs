//! Analysis result cache
//!
//! Bounded, TTL-based memoization of assessment results keyed by content
//! fingerprint (call id for the audio path, hashed text for the text path).
//!
//! - Expiry is lazy: an expired entry is removed by the read that finds it.
//!   There is no background sweep.
//! - When full, the single oldest-*inserted* entry is evicted (not LRU).
//! - One mutex guards the map and the insertion-order index together, so the
//!   capacity bound holds under concurrent get/put.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::AssessmentResult;

/// Default entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default maximum number of entries
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + offset
    }
}

/// Cache key for text analysis: `text:` + first 16 hex chars of SHA-256
pub fn text_fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hex = format!("{:x}", digest);
    format!("text:{}", &hex[..16])
}

struct CacheEntry {
    value: AssessmentResult,
    inserted_at: Instant,
    /// Position in the insertion-order index
    sequence: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// sequence -> key, ascending = oldest first
    insertion_order: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.insertion_order.remove(&entry.sequence);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.insertion_order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Shared assessment cache
pub struct AnalysisCache {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl AnalysisCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // Poisoning ignored: every mutation leaves the state consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value for `key` if inserted less than `ttl` ago
    pub fn get(&self, key: &str) -> Option<AssessmentResult> {
        let now = self.clock.now();
        let mut state = self.lock();

        let expired = match state.entries.get(key) {
            Some(entry) => now.duration_since(entry.inserted_at) >= self.ttl,
            None => return None,
        };

        if expired {
            state.remove(key);
            tracing::debug!(key, "Analysis cache entry expired");
            return None;
        }

        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`
    ///
    /// Replacing refreshes the insertion time. Inserting a new key into a
    /// full cache first evicts the oldest-inserted entry.
    pub fn put(&self, key: &str, value: AssessmentResult) {
        let now = self.clock.now();
        let mut state = self.lock();

        if state.remove(key).is_none() && state.entries.len() >= self.capacity {
            if let Some(evicted) = state.evict_oldest() {
                tracing::debug!(evicted = %evicted, "Analysis cache full, evicted oldest entry");
            }
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.insertion_order.insert(sequence, key.to_string());
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                sequence,
            },
        );
    }

    /// Drop one key; `true` if it was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Remove every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.insertion_order.clear();
        removed
    }

    /// Number of stored entries, expired ones included until read
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;

    fn value(level: RiskLevel) -> AssessmentResult {
        AssessmentResult {
            risk_level: level,
            ..AssessmentResult::fallback_default("cache test")
        }
    }

    fn cache_with_clock(ttl_secs: u64, capacity: usize) -> (AnalysisCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = AnalysisCache::with_clock(Duration::from_secs(ttl_secs), capacity, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_entry_retrievable_before_ttl() {
        let (cache, clock) = cache_with_clock(60, 10);
        cache.put("c1", value(RiskLevel::High));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("c1").map(|v| v.risk_level), Some(RiskLevel::High));
    }

    #[test]
    fn test_entry_absent_at_ttl() {
        let (cache, clock) = cache_with_clock(60, 10);
        cache.put("c1", value(RiskLevel::High));

        clock.advance(Duration::from_secs(60));
        assert!(cache.get("c1").is_none());
        // Lazy expiry removed it
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_full_cache_evicts_oldest_inserted() {
        let (cache, clock) = cache_with_clock(600, 3);
        cache.put("a", value(RiskLevel::Low));
        clock.advance(Duration::from_secs(1));
        cache.put("b", value(RiskLevel::Low));
        clock.advance(Duration::from_secs(1));
        cache.put("c", value(RiskLevel::Low));

        // Reading "a" does not protect it: eviction is by insertion, not access
        assert!(cache.get("a").is_some());

        cache.put("d", value(RiskLevel::Medium));

        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let (cache, _clock) = cache_with_clock(600, 2);
        cache.put("a", value(RiskLevel::Low));
        cache.put("b", value(RiskLevel::Low));
        cache.put("a", value(RiskLevel::Severe));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").map(|v| v.risk_level), Some(RiskLevel::Severe));
        assert!(cache.get("b").is_some());

        // "a" was re-inserted after "b", so "b" is now the oldest
        cache.put("c", value(RiskLevel::Low));
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn test_clear_returns_count() {
        let (cache, _clock) = cache_with_clock(600, 10);
        cache.put("a", value(RiskLevel::Low));
        cache.put("b", value(RiskLevel::Low));

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn test_invalidate_single_key() {
        let (cache, _clock) = cache_with_clock(600, 10);
        cache.put("a", value(RiskLevel::Low));
        cache.put("b", value(RiskLevel::Low));

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_text_fingerprint_stable_and_prefixed() {
        let first = text_fingerprint("I have been feeling low");
        let second = text_fingerprint("I have been feeling low");
        assert_eq!(first, second);
        assert!(first.starts_with("text:"));
        assert_eq!(first.len(), "text:".len() + 16);
        assert_ne!(first, text_fingerprint("something else"));
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let cache = Arc::new(AnalysisCache::new(Duration::from_secs(600), 8));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.put(&format!("{}-{}", t, i), value(RiskLevel::Low));
                        let _ = cache.get(&format!("{}-{}", t, i / 2));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 8);
    }
}
