use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::num::NonZeroUsize;

use crate::config::PolicyCacheConfig;

/// Bounded cache of compiled regex predicates. A failed compile is
/// memoized as `None` so repeated failures cost nothing. Eviction is
/// bulk: once the cache is full, the oldest `eviction_fraction` of
/// entries are dropped in one pass rather than one-in-one-out, matching
/// the spec's "evicting 20% when full" policy.
pub struct RegexCache {
    inner: Mutex<LruCache<String, Option<Regex>>>,
    capacity: usize,
    eviction_fraction: f64,
}

impl RegexCache {
    pub fn new(config: PolicyCacheConfig) -> Self {
        let capacity = config.regex_capacity.max(1);
        Self {
            inner: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap())),
            capacity,
            eviction_fraction: config.regex_eviction_fraction,
        }
    }

    /// Returns `None` both for an uncompilable pattern and (by the
    /// caller's treatment) for "no predicate" — callers distinguish by
    /// not calling this for absent fields.
    pub fn get_or_compile(&self, pattern: &str) -> Option<Regex> {
        let mut cache = self.inner.lock();
        if let Some(cached) = cache.get(pattern) {
            return cached.clone();
        }
        if cache.len() >= self.capacity {
            let evict_count = ((self.capacity as f64) * self.eviction_fraction).ceil() as usize;
            for _ in 0..evict_count.max(1) {
                if cache.pop_lru().is_none() {
                    break;
                }
            }
        }
        let compiled = Regex::new(pattern).ok();
        cache.put(pattern.to_string(), compiled.clone());
        compiled
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_caches_pattern() {
        let cache = RegexCache::new(PolicyCacheConfig::default());
        let re = cache.get_or_compile(r"^foo\d+$").unwrap();
        assert!(re.is_match("foo123"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn memoizes_compile_failure_as_none() {
        let cache = RegexCache::new(PolicyCacheConfig::default());
        assert!(cache.get_or_compile("(unclosed").is_none());
        assert!(cache.get_or_compile("(unclosed").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bulk_evicts_oldest_fraction_when_full() {
        let config = PolicyCacheConfig {
            regex_capacity: 10,
            ..PolicyCacheConfig::default()
        };
        let cache = RegexCache::new(config);
        for i in 0..10 {
            cache.get_or_compile(&format!("pattern-{i}"));
        }
        assert_eq!(cache.len(), 10);
        cache.get_or_compile("pattern-10");
        assert!(cache.len() < 10);
    }
}
