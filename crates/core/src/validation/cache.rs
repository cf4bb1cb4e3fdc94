//! Rule-set cache with a fixed time-to-live.
//!
//! The cache is injected into the validation engine as a [`RuleCache`]
//! trait object. Time comes from an injected [`Clock`] so expiry can be
//! driven deterministically in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::rules::RuleSet;
use crate::types::DbId;

/// Default lifetime of a cached rule set (5 minutes).
pub const DEFAULT_RULE_CACHE_TTL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time source used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
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
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + *offset
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Cache capability for per-definition rule sets.
///
/// Fills are conditional: read [`RuleCache::generation`] before loading
/// rules from storage and hand it back to [`RuleCache::set`]. A set whose
/// generation is older than the latest invalidation is dropped, so rules
/// read before a catalog write never outlive that write's invalidation.
pub trait RuleCache: Send + Sync {
    fn get(&self, definition_id: DbId) -> Option<Arc<RuleSet>>;
    fn generation(&self) -> u64;
    /// Store `rules` unless an invalidation happened after `observed`.
    fn set(&self, definition_id: DbId, rules: Arc<RuleSet>, observed: u64);
    fn invalidate(&self, definition_id: DbId);
    fn invalidate_all(&self);
}

/// Process-local TTL cache.
pub struct TtlRuleCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<DbId, (Instant, Arc<RuleSet>)>>,
    /// Bumped under the write lock by every invalidation.
    generation: AtomicU64,
}

impl TtlRuleCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// TTL cache on the system clock.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TtlRuleCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_RULE_CACHE_TTL)
    }
}

impl RuleCache for TtlRuleCache {
    fn get(&self, definition_id: DbId) -> Option<Arc<RuleSet>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(&definition_id) {
                Some((stored_at, rules)) if now.duration_since(*stored_at) < self.ttl => {
                    return Some(Arc::clone(rules));
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it so the map does not grow with dead entries.
        // Expiry is not an invalidation and leaves the generation alone.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries
            .get(&definition_id)
            .is_some_and(|(stored_at, _)| now.duration_since(*stored_at) >= self.ttl)
        {
            entries.remove(&definition_id);
        }
        None
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn set(&self, definition_id: DbId, rules: Arc<RuleSet>, observed: u64) {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != observed {
            tracing::debug!(definition_id, "Dropping rule set read before an invalidation");
            return;
        }
        entries.insert(definition_id, (now, rules));
    }

    fn invalidate(&self, definition_id: DbId) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.remove(&definition_id);
    }

    fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(id: DbId) -> Arc<RuleSet> {
        Arc::new(RuleSet {
            definition_id: id,
            fields: Vec::new(),
        })
    }

    #[test]
    fn entry_survives_until_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlRuleCache::new(Duration::from_secs(300), clock.clone());
        cache.set(1, rules(1), cache.generation());

        clock.advance(Duration::from_secs(299));
        assert!(cache.get(1).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_single_and_all() {
        let cache = TtlRuleCache::new(DEFAULT_RULE_CACHE_TTL, Arc::new(ManualClock::new()));
        cache.set(1, rules(1), cache.generation());
        cache.set(2, rules(2), cache.generation());

        cache.invalidate(1);
        assert!(cache.get(1).is_none());
        assert!(cache.get(2).is_some());

        cache.invalidate_all();
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn fill_read_before_invalidation_is_dropped() {
        let cache = TtlRuleCache::new(DEFAULT_RULE_CACHE_TTL, Arc::new(ManualClock::new()));
        let observed = cache.generation();
        cache.invalidate(1);
        cache.set(1, rules(1), observed);
        assert!(cache.get(1).is_none());

        cache.set(1, rules(1), cache.generation());
        assert!(cache.get(1).is_some());
    }

    #[test]
    fn expiry_does_not_discard_pending_fills() {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlRuleCache::new(Duration::from_secs(10), clock.clone());
        cache.set(1, rules(1), cache.generation());
        let observed = cache.generation();
        clock.advance(Duration::from_secs(10));
        assert!(cache.get(1).is_none());

        cache.set(2, rules(2), observed);
        assert!(cache.get(2).is_some());
    }
}
