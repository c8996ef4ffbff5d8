use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;

use crate::errors::SearchError;
use crate::request::SearchQuery;

/// Default number of compiled patterns kept per cache.
pub const DEFAULT_PATTERN_CAPACITY: usize = 128;

/// Lowers a query to the single regex pattern that drives the scan.
///
/// Text queries are escaped so metacharacters match literally; the
/// case-insensitive flag becomes an inline `(?i)` prefix. Regex queries
/// pass their pattern through untouched.
pub fn resolve_pattern(query: &SearchQuery) -> Result<String, SearchError> {
    if query.is_regex {
        let regex = query
            .regex
            .as_ref()
            .ok_or_else(|| SearchError::invalid_query("regex query selected but no pattern given"))?;
        return Ok(regex.pattern.clone());
    }

    let text = query
        .text
        .as_ref()
        .ok_or_else(|| SearchError::invalid_query("text query selected but no value given"))?;
    let mut pattern = regex::escape(&text.value);
    if text.ignore_case {
        pattern.insert_str(0, "(?i)");
    }
    Ok(pattern)
}

struct CacheEntry {
    regex: Arc<Regex>,
    accesses: AtomicU64,
}

/// Bounded cache of compiled patterns, shared across searches.
///
/// Hits take the read lock and bump a per-entry access counter; misses
/// take the write lock, compile, and evict the least-used entry once the
/// cache is full. Counters never decay, so long-lived patterns win ties.
pub struct PatternCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Process-wide cache used by every search that does not bring its
    /// own.
    pub fn shared() -> Arc<PatternCache> {
        static SHARED: Lazy<Arc<PatternCache>> =
            Lazy::new(|| Arc::new(PatternCache::new(DEFAULT_PATTERN_CAPACITY)));
        Arc::clone(&SHARED)
    }

    /// Returns the compiled form of `pattern`, compiling and caching it
    /// on first use.
    pub fn get(&self, pattern: &str) -> Result<Arc<Regex>, SearchError> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(pattern) {
                entry.accesses.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.regex));
            }
        }

        let mut entries = self.entries.write();
        // A racing caller may have compiled it while we waited.
        if let Some(entry) = entries.get(pattern) {
            entry.accesses.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(&entry.regex));
        }

        let compiled = Regex::new(pattern)
            .map(Arc::new)
            .map_err(|err| SearchError::invalid_pattern(pattern, err))?;

        if entries.len() >= self.capacity {
            let evict = entries
                .iter()
                .min_by_key(|(_, entry)| entry.accesses.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            if let Some(key) = evict {
                entries.remove(&key);
            }
        }

        entries.insert(
            pattern.to_string(),
            CacheEntry {
                regex: Arc::clone(&compiled),
                accesses: AtomicU64::new(1),
            },
        );
        Ok(compiled)
    }
}
