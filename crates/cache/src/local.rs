//! In-process response cache backed by DashMap.
//! Holds serialized analytics responses keyed by request, each entry living
//! for the freshness window of its domain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use metrics::counter;
use pos_core::config::CacheConfig;
use pos_core::InsightResult;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::key::{CacheDomain, CacheKey};

struct CacheEntry {
    value: Value,
    domain: CacheDomain,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Value, domain: CacheDomain, ttl: Duration) -> Self {
        Self {
            value,
            domain,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    // A zero TTL never serves a hit.
    fn is_fresh(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Hit and miss totals since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Concurrent cache for analytics responses.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<DashMap<CacheKey, CacheEntry>>,
    counters: Arc<Counters>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(config.max_entries.min(1024))),
            counters: Arc::new(Counters::default()),
            config: config.clone(),
        }
    }

    /// Cached response for `key`, or None if expired or missing.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        match self.lookup(key) {
            Some((value, domain)) => {
                self.record_hit(domain);
                Some(value)
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    // Fresh value and its domain; drops the entry if it has expired.
    fn lookup(&self, key: &CacheKey) -> Option<(Value, CacheDomain)> {
        let entry = self.store.get(key)?;
        if !entry.is_fresh() {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some((entry.value.clone(), entry.domain))
    }

    /// Insert or replace a response.
    pub fn put(&self, key: CacheKey, domain: CacheDomain, value: Value) {
        // Over capacity: skip the insert, evict_expired makes room later.
        if self.store.len() >= self.config.max_entries && !self.store.contains_key(&key) {
            debug!(key = %key, "cache full, skipping insert");
            return;
        }
        let ttl = domain.ttl(&self.config);
        self.store.insert(key, CacheEntry::new(value, domain, ttl));
    }

    /// Returns the fresh cached response for `key` or computes, stores and
    /// returns it. Concurrent callers of the same key compute at most once;
    /// `compute` must not call back into this cache. Each call records
    /// exactly one hit or one miss.
    pub fn get_or_try_insert_with<T, F>(
        &self,
        key: CacheKey,
        domain: CacheDomain,
        compute: F,
    ) -> InsightResult<Value>
    where
        T: Serialize,
        F: FnOnce() -> InsightResult<T>,
    {
        if let Some((value, cached)) = self.lookup(&key) {
            self.record_hit(cached);
            return Ok(value);
        }

        let full = self.store.len() >= self.config.max_entries;
        let ttl = domain.ttl(&self.config);
        match self.store.entry(key) {
            Entry::Occupied(mut occupied) => {
                // Another caller filled the slot while we waited on the shard.
                if occupied.get().is_fresh() {
                    self.record_hit(occupied.get().domain);
                    return Ok(occupied.get().value.clone());
                }
                self.record_miss();
                let value = serde_json::to_value(compute()?)?;
                occupied.insert(CacheEntry::new(value.clone(), domain, ttl));
                Ok(value)
            }
            Entry::Vacant(vacant) => {
                self.record_miss();
                let value = serde_json::to_value(compute()?)?;
                if !full {
                    vacant.insert(CacheEntry::new(value.clone(), domain, ttl));
                }
                Ok(value)
            }
        }
    }

    /// Drops every entry whose key matches `pattern` (`*` is a wildcard).
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let before = self.store.len();
        self.store.retain(|key, _| !key.matches(pattern));
        let removed = before.saturating_sub(self.store.len());
        counter!("cache.invalidations").increment(removed as u64);
        debug!(pattern, removed, "cache entries invalidated");
        removed
    }

    /// Drops every entry of one domain.
    pub fn invalidate_domain(&self, domain: CacheDomain) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| entry.domain != domain);
        let removed = before.saturating_sub(self.store.len());
        counter!("cache.invalidations").increment(removed as u64);
        removed
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| entry.is_fresh());
        before.saturating_sub(self.store.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }

    fn record_hit(&self, domain: CacheDomain) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        counter!("cache.hits", "domain" => domain_label(domain)).increment(1);
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("cache.misses").increment(1);
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn domain_label(domain: CacheDomain) -> &'static str {
    match domain {
        CacheDomain::Revenue => "revenue",
        CacheDomain::Product => "product",
        CacheDomain::Traffic => "traffic",
        CacheDomain::Customer => "customer",
        CacheDomain::Inventory => "inventory",
        CacheDomain::Yearly => "yearly",
    }
}
