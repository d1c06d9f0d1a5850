use std::time::Duration;

/// Tunables for the policy registry's TTL cache and regex LRU (C2).
#[derive(Debug, Clone, Copy)]
pub struct PolicyCacheConfig {
    pub ttl: Duration,
    pub regex_capacity: usize,
    /// Fraction of the regex LRU evicted in bulk once it is full.
    pub regex_eviction_fraction: f64,
}

impl Default for PolicyCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            regex_capacity: 500,
            regex_eviction_fraction: 0.2,
        }
    }
}
