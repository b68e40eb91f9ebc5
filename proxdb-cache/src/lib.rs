// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ProxDB Semantic Cache
//!
//! Short-circuits planner and re-ranker work for near-duplicate queries.
//! Entries are bucketed by `(tenant, filter fingerprint)`; within a bucket
//! a hit requires the cosine similarity between the incoming and stored
//! query embeddings to reach the configured threshold **and** the entry's
//! recorded generation to equal the collection's current generation.
//! Similar queries are not equivalent queries, so the similarity gate is a
//! floor, never a substitute for generation freshness.
//!
//! ## Eviction
//!
//! Three pressures, in order of arrival: TTL expiry (checked on contact),
//! generation invalidation after a rebuild, and a bounded per-tenant LRU so
//! one tenant can never squeeze the others out of shared capacity.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use proxdb_core::{CacheConfig, Generation, TenantId};

/// Bucket key: one tenant + one normalized filter shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BucketKey {
    tenant: TenantId,
    filter_fingerprint: u64,
}

struct Entry<T> {
    embedding: Vec<f32>,
    result: T,
    generation: Generation,
    created: Instant,
    ttl: Duration,
    /// LRU tick of the last hit or store.
    touched: u64,
}

impl<T> Entry<T> {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
}

struct CacheInner<T> {
    buckets: HashMap<BucketKey, Vec<Entry<T>>>,
    per_tenant: HashMap<TenantId, usize>,
    clock: u64,
    stats: CacheStats,
}

/// Semantic query cache for one collection.
pub struct SemanticCache<T> {
    config: CacheConfig,
    inner: Mutex<CacheInner<T>>,
}

impl<T: Clone> SemanticCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                buckets: HashMap::new(),
                per_tenant: HashMap::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a near-duplicate query result.
    ///
    /// Returns the best entry whose similarity clears the threshold, whose
    /// generation matches, and whose TTL has not lapsed. Entries failing
    /// TTL or generation are dropped on contact.
    pub fn lookup(
        &self,
        tenant: TenantId,
        embedding: &[f32],
        filter_fingerprint: u64,
        current_generation: Generation,
    ) -> Option<T> {
        self.lookup_where(tenant, embedding, filter_fingerprint, current_generation, |_| true)
    }

    /// [`SemanticCache::lookup`] with a caller-side validity gate.
    ///
    /// The engine passes a liveness check here: a cached result citing a
    /// since-tombstoned id must not be served even though the generation
    /// still matches (deletes mask without republishing). Entries failing
    /// the gate are dropped on contact.
    pub fn lookup_where(
        &self,
        tenant: TenantId,
        embedding: &[f32],
        filter_fingerprint: u64,
        current_generation: Generation,
        valid: impl Fn(&T) -> bool,
    ) -> Option<T> {
        let now = Instant::now();
        let key = BucketKey {
            tenant,
            filter_fingerprint,
        };

        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        let threshold = self.config.similarity_threshold;

        let mut removed = 0usize;
        let result = match inner.buckets.get_mut(&key) {
            None => None,
            Some(bucket) => {
                // Drop dead entries on contact, then scan the survivors.
                bucket.retain(|entry| {
                    let dead = entry.expired(now) || entry.generation != current_generation;
                    if dead {
                        removed += 1;
                    }
                    !dead
                });

                // Candidates above the threshold, best similarity first.
                let mut ranked: Vec<(usize, f32)> = bucket
                    .iter()
                    .enumerate()
                    .filter_map(|(i, entry)| {
                        let similarity = cosine_similarity(embedding, &entry.embedding);
                        (similarity >= threshold).then_some((i, similarity))
                    })
                    .collect();
                ranked.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                });

                let mut winner: Option<T> = None;
                let mut invalid: Vec<usize> = Vec::new();
                for (i, similarity) in ranked {
                    if valid(&bucket[i].result) {
                        let entry = &mut bucket[i];
                        entry.touched = tick;
                        debug!(%tenant, similarity, "semantic cache hit");
                        winner = Some(entry.result.clone());
                        break;
                    }
                    invalid.push(i);
                }

                // Drop entries the validity gate rejected.
                invalid.sort_unstable_by(|a, b| b.cmp(a));
                for i in invalid {
                    bucket.remove(i);
                    removed += 1;
                }

                winner
            }
        };

        if removed > 0 {
            inner.stats.evictions += removed as u64;
            if let Some(count) = inner.per_tenant.get_mut(&tenant) {
                *count = count.saturating_sub(removed);
            }
        }

        match result {
            Some(value) => {
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a fresh result, evicting the tenant's least-recently-used
    /// entry when the per-tenant bound is reached.
    pub fn store(
        &self,
        tenant: TenantId,
        embedding: Vec<f32>,
        filter_fingerprint: u64,
        result: T,
        generation: Generation,
    ) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;

        let count = inner.per_tenant.get(&tenant).copied().unwrap_or(0);
        if count >= self.config.max_entries_per_tenant {
            self.evict_lru(&mut inner, tenant);
        }

        let key = BucketKey {
            tenant,
            filter_fingerprint,
        };
        let ttl = self.config.default_ttl;
        inner.buckets.entry(key).or_default().push(Entry {
            embedding,
            result,
            generation,
            created: Instant::now(),
            ttl,
            touched: tick,
        });
        *inner.per_tenant.entry(tenant).or_insert(0) += 1;
    }

    /// Drop every entry recorded against a generation older than
    /// `new_generation`. Called by the index manager after a publish.
    pub fn invalidate_generation(&self, new_generation: Generation) {
        let mut inner = self.inner.lock();
        let mut removed_total = 0u64;
        let mut removed_by_tenant: HashMap<TenantId, usize> = HashMap::new();

        for (key, bucket) in inner.buckets.iter_mut() {
            let before = bucket.len();
            bucket.retain(|entry| entry.generation >= new_generation);
            let removed = before - bucket.len();
            if removed > 0 {
                removed_total += removed as u64;
                *removed_by_tenant.entry(key.tenant).or_insert(0) += removed;
            }
        }
        for (tenant, removed) in removed_by_tenant {
            if let Some(count) = inner.per_tenant.get_mut(&tenant) {
                *count = count.saturating_sub(removed);
            }
        }
        inner.buckets.retain(|_, bucket| !bucket.is_empty());
        inner.stats.invalidations += removed_total;
        if removed_total > 0 {
            debug!(removed = removed_total, new_generation, "cache invalidated");
        }
    }

    fn evict_lru(&self, inner: &mut CacheInner<T>, tenant: TenantId) {
        let mut victim: Option<(BucketKey, usize, u64)> = None;
        for (key, bucket) in inner.buckets.iter() {
            if key.tenant != tenant {
                continue;
            }
            for (i, entry) in bucket.iter().enumerate() {
                if victim.map(|(_, _, t)| entry.touched < t).unwrap_or(true) {
                    victim = Some((*key, i, entry.touched));
                }
            }
        }
        if let Some((key, i, _)) = victim {
            if let Some(bucket) = inner.buckets.get_mut(&key) {
                bucket.remove(i);
                if bucket.is_empty() {
                    inner.buckets.remove(&key);
                }
            }
            if let Some(count) = inner.per_tenant.get_mut(&tenant) {
                *count = count.saturating_sub(1);
            }
            inner.stats.evictions += 1;
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.buckets.values().map(|b| b.len()).sum(),
            ..inner.stats
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.buckets.clear();
        inner.per_tenant.clear();
    }
}

/// Cosine similarity; zero-norm inputs compare as dissimilar.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let norm = norm_a.sqrt() * norm_b.sqrt();
    if norm == 0.0 {
        0.0
    } else {
        dot / norm
    }
}
