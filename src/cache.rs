//! Parse cache.
//!
//! Memoises lowering results keyed by builder source text so repeated
//! `define_*` calls skip the parse and lowering passes entirely. The cache is
//! a process-wide LRU behind a mutex; capacity and enablement can be changed
//! at runtime and are observed on the next access. Hit rate is the primary
//! performance lever for repeated queries.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use lru::LruCache;

use crate::error::{ConfigError, QueryError, QueryResult};
use crate::lowering::{lower_source, LoweredQuery};

/// Default number of cached plans.
pub const DEFAULT_PARSE_CACHE_CAPACITY: usize = 1024;

/// Runtime-adjustable cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for ParseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_PARSE_CACHE_CAPACITY,
        }
    }
}

/// Cache effectiveness counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

struct ParseCache {
    entries: LruCache<String, Arc<LoweredQuery>>,
    config: ParseCacheConfig,
    hits: u64,
    misses: u64,
}

impl ParseCache {
    fn new() -> Self {
        let config = ParseCacheConfig::default();
        Self {
            entries: LruCache::new(
                NonZeroUsize::new(config.capacity).expect("default capacity is non-zero"),
            ),
            config,
            hits: 0,
            misses: 0,
        }
    }
}

lazy_static! {
    static ref PARSE_CACHE: Mutex<ParseCache> = Mutex::new(ParseCache::new());
}

/// Lowers `source`, consulting the cache first.
///
/// Lowering failures are not cached; a broken builder re-parses on retry.
pub fn lower_cached(source: &str) -> QueryResult<Arc<LoweredQuery>> {
    {
        let mut cache = PARSE_CACHE.lock().expect("parse cache poisoned");
        if cache.config.enabled {
            if let Some(found) = cache.entries.get(source).map(Arc::clone) {
                cache.hits += 1;
                return Ok(found);
            }
            cache.misses += 1;
        }
    }

    // Lower outside the lock; parsing arbitrary source under a global mutex
    // would serialise every caller.
    let lowered = Arc::new(lower_source(source).map_err(QueryError::from)?);

    let mut cache = PARSE_CACHE.lock().expect("parse cache poisoned");
    if cache.config.enabled {
        cache
            .entries
            .put(source.to_string(), Arc::clone(&lowered));
    }
    Ok(lowered)
}

/// Updates the cache configuration. Shrinking the capacity evicts
/// least-recently-used entries immediately.
pub fn set_parse_cache_config(config: ParseCacheConfig) -> QueryResult<()> {
    let capacity =
        NonZeroUsize::new(config.capacity).ok_or(ConfigError::InvalidCacheCapacity)?;

    let mut cache = PARSE_CACHE.lock().expect("parse cache poisoned");
    cache.config = config;
    cache.entries.resize(capacity);
    if !config.enabled {
        cache.entries.clear();
    }
    Ok(())
}

pub fn get_parse_cache_config() -> ParseCacheConfig {
    PARSE_CACHE.lock().expect("parse cache poisoned").config
}

/// Clears all cached plans and resets the counters atomically.
pub fn clear_parse_cache() {
    let mut cache = PARSE_CACHE.lock().expect("parse cache poisoned");
    cache.entries.clear();
    cache.hits = 0;
    cache.misses = 0;
}

pub fn parse_cache_stats() -> ParseCacheStats {
    let cache = PARSE_CACHE.lock().expect("parse cache poisoned");
    ParseCacheStats {
        hits: cache.hits,
        misses: cache.misses,
        len: cache.entries.len(),
        capacity: cache.entries.cap().get(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The cache is process-global, so the scenarios run in one test to keep
    // clear/hit observations race-free under the parallel test runner.
    #[test]
    fn test_cache_behaviour() {
        clear_parse_cache();

        // A repeated source yields the identical cached plan.
        let source = "from(\"cache_users\").count()";
        let first = lower_cached(source).unwrap();
        let second = lower_cached(source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = parse_cache_stats();
        assert!(stats.hits >= 1);
        assert!(stats.misses >= 1);
        assert!(stats.len >= 1);

        // Lowering failures are not cached.
        assert!(lower_cached("mystery(\"t\").count()").is_err());
        assert!(lower_cached("mystery(\"t\").count()").is_err());

        // Capacity zero is rejected without touching the live config.
        let result = set_parse_cache_config(ParseCacheConfig {
            enabled: true,
            capacity: 0,
        });
        assert!(matches!(
            result,
            Err(QueryError::Config(ConfigError::InvalidCacheCapacity))
        ));
        assert_eq!(get_parse_cache_config().capacity, DEFAULT_PARSE_CACHE_CAPACITY);

        // Shrinking evicts down to the new capacity.
        set_parse_cache_config(ParseCacheConfig {
            enabled: true,
            capacity: 1,
        })
        .unwrap();
        let _ = lower_cached("from(\"cache_a\").count()").unwrap();
        let _ = lower_cached("from(\"cache_b\").count()").unwrap();
        assert_eq!(parse_cache_stats().len, 1);

        // Disabling bypasses and empties the cache.
        set_parse_cache_config(ParseCacheConfig {
            enabled: false,
            capacity: 1,
        })
        .unwrap();
        let third = lower_cached(source).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(parse_cache_stats().len, 0);

        // Restore defaults for any test that follows.
        set_parse_cache_config(ParseCacheConfig::default()).unwrap();
        clear_parse_cache();
    }
}
