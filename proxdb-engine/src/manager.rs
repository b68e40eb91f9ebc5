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

//! Index manager.
//!
//! Owns the active generation for one collection: picks the serving
//! strategy, folds new store versions in incrementally, and rebuilds in
//! the background with double buffering — the prior generation serves
//! every query until the replacement is complete and published with one
//! atomic pointer swap.
//!
//! ## Failure semantics
//!
//! A failed rebuild changes nothing: the prior generation keeps serving,
//! the failure is counted, and the next attempt waits out an exponential
//! backoff. Past `max_rebuild_failures` the collection is flagged degraded;
//! queries keep flowing and carry `stale: true` until a rebuild succeeds.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{info, warn};

use proxdb_core::{
    CollectionConfig, EngineError, Generation, IndexVariant, ManagerConfig, Result, Version,
};
use proxdb_index::{AnnIndex, IndexEntry};
use proxdb_store::{StoreStats, VectorStore};

use crate::generation::IndexGeneration;

/// Hook invoked with the new generation number after every successful
/// publish. The engine wires cache invalidation through it.
pub type PublishHook = Box<dyn Fn(Generation) + Send + Sync>;

#[derive(Default)]
struct RebuildState {
    consecutive_failures: u32,
    /// Earliest instant the next automatic attempt may run.
    not_before: Option<Instant>,
    /// Explicitly requested (admin trigger or corruption fallback).
    requested: bool,
}

pub struct IndexManager {
    store: Arc<VectorStore>,
    config: CollectionConfig,
    manager_config: ManagerConfig,
    current: ArcSwap<IndexGeneration>,
    next_generation: AtomicU64,
    /// Maintenance cursor into the store's version order.
    cursor: Mutex<Version>,
    /// Inserts buffered for batch incorporation (IVF) at the next rebuild.
    pending: Mutex<Vec<IndexEntry>>,
    rebuild: Mutex<RebuildState>,
    degraded: AtomicBool,
    publish_hook: Mutex<Option<PublishHook>>,
}

impl IndexManager {
    /// Build the initial generation from whatever the store already holds.
    pub fn new(
        store: Arc<VectorStore>,
        config: CollectionConfig,
        manager_config: ManagerConfig,
    ) -> Self {
        let stats = store.stats();
        let variant = Self::strategy_for(&config, &stats);
        let entries: Vec<IndexEntry> = store
            .live_records()
            .iter()
            .map(IndexEntry::from)
            .collect();
        let index = AnnIndex::build(variant, &config, &entries);
        let covered = store.last_version();

        Self {
            store,
            config,
            manager_config,
            current: ArcSwap::from_pointee(IndexGeneration::new(1, index, covered)),
            next_generation: AtomicU64::new(2),
            cursor: Mutex::new(covered),
            pending: Mutex::new(Vec::new()),
            rebuild: Mutex::new(RebuildState::default()),
            degraded: AtomicBool::new(false),
            publish_hook: Mutex::new(None),
        }
    }

    pub fn set_publish_hook(&self, hook: PublishHook) {
        *self.publish_hook.lock() = Some(hook);
    }

    /// The generation currently serving queries.
    pub fn active(&self) -> Arc<IndexGeneration> {
        self.current.load_full()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Staleness: versions the store has accepted but the active
    /// generation has not folded in or been rebuilt over.
    pub fn staleness(&self) -> u64 {
        self.store
            .last_version()
            .saturating_sub(self.active().covered())
    }

    /// Pick the serving variant for the observed store shape: Flat below
    /// the small-collection threshold (exact recall is cheap there), the
    /// configured variant above it.
    pub fn choose_strategy(&self, stats: &StoreStats) -> IndexVariant {
        Self::strategy_for(&self.config, stats)
    }

    fn strategy_for(config: &CollectionConfig, stats: &StoreStats) -> IndexVariant {
        if stats.live_records < config.flat_threshold {
            IndexVariant::Flat
        } else {
            config.index_variant
        }
    }

    /// Fold newly arrived store versions into the active generation.
    ///
    /// Incremental variants (HNSW, Flat) absorb inserts directly; IVF
    /// inserts are buffered for the next rebuild, since centroid training
    /// is batch-oriented. Returns `true` when a rebuild was performed.
    pub fn maintain(&self) -> Result<bool> {
        let generation = self.active();
        let mut cursor = self.cursor.lock();
        let mut scan = self.store.scan_since(*cursor);

        loop {
            let batch = scan.next_batch(512);
            if batch.is_empty() {
                break;
            }
            for item in &batch {
                if item.record.deleted {
                    // Tombstones are masked by the live set; nothing to
                    // fold into the index.
                    continue;
                }
                let entry = IndexEntry::from(&item.record);
                if generation.supports_incremental() {
                    generation.insert(&entry);
                } else {
                    self.pending.lock().push(entry);
                }
            }
            *cursor = scan.position();
            generation.set_covered(*cursor);
        }
        drop(cursor);

        if self.should_rebuild(&generation) {
            self.rebuild_now()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn should_rebuild(&self, generation: &IndexGeneration) -> bool {
        if generation.is_poisoned() || self.rebuild.lock().requested {
            return true;
        }
        if self.pending.lock().len() >= self.manager_config.rebuild_buffer_limit {
            return true;
        }
        if generation.drift_ratio() > self.config.ivf_drift_threshold {
            return true;
        }
        // The store has outgrown (or shrunk under) the strategy the active
        // generation was built with.
        let stats = self.store.stats();
        self.choose_strategy(&stats) != generation.variant()
    }

    /// Request a rebuild at the next maintenance pass (corruption
    /// fallback path).
    pub fn request_rebuild(&self) {
        self.rebuild.lock().requested = true;
    }

    /// Build a new generation from the full live record set and publish it.
    ///
    /// Runs on the caller's thread — the engine invokes it from the
    /// background maintenance loop or the administrative trigger. Queries
    /// keep being served from the prior generation for the whole build;
    /// publication is a single atomic swap.
    pub fn rebuild_now(&self) -> Result<Generation> {
        {
            let state = self.rebuild.lock();
            if let Some(not_before) = state.not_before {
                if Instant::now() < not_before && !state.requested {
                    // Still backing off a previous failure.
                    return Ok(self.active().number());
                }
            }
        }

        match self.try_rebuild() {
            Ok(number) => {
                let mut state = self.rebuild.lock();
                state.consecutive_failures = 0;
                state.not_before = None;
                state.requested = false;
                drop(state);
                self.degraded.store(false, Ordering::Release);
                Ok(number)
            }
            Err(err) => {
                let mut state = self.rebuild.lock();
                state.consecutive_failures += 1;
                let failures = state.consecutive_failures;
                let backoff = self
                    .manager_config
                    .rebuild_backoff
                    .saturating_mul(1u32 << failures.min(16).saturating_sub(1))
                    .min(self.manager_config.rebuild_backoff_max);
                state.not_before = Some(Instant::now() + backoff);
                drop(state);

                if failures >= self.manager_config.max_rebuild_failures {
                    self.degraded.store(true, Ordering::Release);
                }
                warn!(failures, ?backoff, error = %err, "rebuild failed; prior generation keeps serving");
                Err(err)
            }
        }
    }

    fn try_rebuild(&self) -> Result<Generation> {
        let started = Instant::now();
        let records = self.store.live_records();
        let covered = self.store.last_version();
        let stats = self.store.stats();
        let variant = self.choose_strategy(&stats);

        let entries: Vec<IndexEntry> = records.iter().map(IndexEntry::from).collect();

        if let Some(limit) = self.config.max_index_bytes {
            // Rough pre-check; the serving path degrades to Flat over the
            // full set rather than refusing to serve.
            let estimated = entries.len() * self.config.dimension * std::mem::size_of::<f32>();
            if estimated > limit && variant != IndexVariant::Flat {
                warn!(estimated, limit, "index memory limit; falling back to flat");
                return self.publish(AnnIndex::build(IndexVariant::Flat, &self.config, &entries), covered, started);
            }
        }

        let index = AnnIndex::build(variant, &self.config, &entries);
        if index.len() != entries.len() {
            // Structural check: a build that lost records must not serve.
            return Err(EngineError::Internal(format!(
                "rebuild produced {} of {} records",
                index.len(),
                entries.len()
            )));
        }

        self.publish(index, covered, started)
    }

    fn publish(&self, index: AnnIndex, covered: Version, started: Instant) -> Result<Generation> {
        let number = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let variant = index.variant();
        let generation = Arc::new(IndexGeneration::new(number, index, covered));

        self.current.store(generation);
        *self.cursor.lock() = covered;
        self.pending.lock().clear();

        info!(
            generation = number,
            ?variant,
            covered,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation published"
        );

        if let Some(hook) = self.publish_hook.lock().as_ref() {
            hook(number);
        }
        Ok(number)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxdb_core::{DistanceMetric, Payload, TenantId};
    use proxdb_index::SearchContext;
    use tempfile::TempDir;

    fn config(variant: IndexVariant, flat_threshold: usize) -> CollectionConfig {
        let mut c = CollectionConfig::new(2, DistanceMetric::L2).with_variant(variant);
        c.flat_threshold = flat_threshold;
        c
    }

    fn insert_n(store: &VectorStore, n: usize) {
        for i in 0..n {
            store
                .insert(TenantId(1), vec![i as f32, 0.0], Payload::new())
                .unwrap();
        }
    }

    #[test]
    fn test_initial_generation_covers_existing_records() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 10);

        let manager = IndexManager::new(store.clone(), config(IndexVariant::Hnsw, 4), ManagerConfig::default());
        let generation = manager.active();
        assert_eq!(generation.number(), 1);
        assert_eq!(generation.len(), 10);
        assert_eq!(generation.covered(), store.last_version());
        assert_eq!(manager.staleness(), 0);
    }

    #[test]
    fn test_choose_strategy_honors_flat_threshold() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        let manager = IndexManager::new(store, config(IndexVariant::Hnsw, 100), ManagerConfig::default());

        let small = StoreStats {
            live_records: 10,
            ..StoreStats::default()
        };
        let large = StoreStats {
            live_records: 1_000,
            ..StoreStats::default()
        };
        assert_eq!(manager.choose_strategy(&small), IndexVariant::Flat);
        assert_eq!(manager.choose_strategy(&large), IndexVariant::Hnsw);
    }

    #[test]
    fn test_maintain_folds_incremental_inserts() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 5);

        // flat_threshold 0 keeps the configured HNSW variant active.
        let manager = IndexManager::new(store.clone(), config(IndexVariant::Hnsw, 0), ManagerConfig::default());
        insert_n(&store, 3);
        assert_eq!(manager.staleness(), 3);

        manager.maintain().unwrap();
        assert_eq!(manager.active().len(), 8);
        assert_eq!(manager.staleness(), 0);
    }

    #[test]
    fn test_ivf_inserts_buffer_until_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 20);

        let manager = IndexManager::new(store.clone(), config(IndexVariant::Ivf, 0), ManagerConfig::default());
        assert_eq!(manager.active().variant(), IndexVariant::Ivf);

        insert_n(&store, 4);
        let rebuilt = manager.maintain().unwrap();
        if !rebuilt {
            assert_eq!(manager.pending_len(), 4);
        }
        // Generation still answers; buffered records arrive at rebuild.
        manager.rebuild_now().unwrap();
        assert_eq!(manager.active().len(), 24);
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn test_rebuild_publishes_new_generation_and_hook_fires() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 6);

        let manager = IndexManager::new(store.clone(), config(IndexVariant::Flat, 0), ManagerConfig::default());
        let published = Arc::new(AtomicU64::new(0));
        let seen = published.clone();
        manager.set_publish_hook(Box::new(move |generation| {
            seen.store(generation, Ordering::SeqCst);
        }));

        let before = manager.active().number();
        let after = manager.rebuild_now().unwrap();
        assert!(after > before);
        assert_eq!(published.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_rebuild_compacts_tombstones() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 10);
        let manager = IndexManager::new(store.clone(), config(IndexVariant::Flat, 0), ManagerConfig::default());
        assert_eq!(manager.active().len(), 10);

        for id in store.live_snapshot().iter().take(4).collect::<Vec<_>>() {
            store.delete(id).unwrap();
        }
        manager.rebuild_now().unwrap();
        // Physically compacted, not just masked.
        assert_eq!(manager.active().len(), 6);
    }

    #[test]
    fn test_old_generation_serves_until_swap() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        insert_n(&store, 5);
        let manager = IndexManager::new(store.clone(), config(IndexVariant::Flat, 0), ManagerConfig::default());

        let held = manager.active();
        store.delete(store.live_snapshot().iter().next().unwrap()).unwrap();
        manager.rebuild_now().unwrap();

        // The held (pre-rebuild) generation is intact and searchable.
        assert_eq!(held.len(), 5);
        let live = store.live_snapshot();
        let ctx = SearchContext::new(&live);
        assert!(held.search(&[0.0, 0.0], 3, &ctx).is_ok());
        // The active generation moved on.
        assert_eq!(manager.active().len(), 4);
        assert!(manager.active().number() > held.number());
    }
}
