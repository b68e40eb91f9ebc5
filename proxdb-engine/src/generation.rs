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

//! Published index generations.
//!
//! A generation is a fully-built snapshot of one index structure plus the
//! store version it covers. Generations are exposed through an atomically
//! swapped `Arc`: readers load the pointer once and keep the whole query on
//! that snapshot, so an in-flight search never mixes pre- and post-rebuild
//! state. Rebuilds never mutate a published generation's structure; the
//! only in-place change is incremental insert folding (HNSW/Flat), which
//! runs under the generation's write lock and is invisible mid-update to
//! readers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use proxdb_core::{Generation, Result, Version};
use proxdb_index::{AnnIndex, IndexEntry, Neighbor, SearchContext};

pub struct IndexGeneration {
    number: Generation,
    index: RwLock<AnnIndex>,
    /// Highest store version folded into this generation.
    covered: AtomicU64,
    /// Set when a structural integrity check fails; queries against a
    /// poisoned generation fail hard and a fallback rebuild is scheduled.
    poisoned: AtomicBool,
}

impl IndexGeneration {
    pub fn new(number: Generation, index: AnnIndex, covered: Version) -> Self {
        Self {
            number,
            index: RwLock::new(index),
            covered: AtomicU64::new(covered),
            poisoned: AtomicBool::new(false),
        }
    }

    pub fn number(&self) -> Generation {
        self.number
    }

    pub fn covered(&self) -> Version {
        self.covered.load(Ordering::Acquire)
    }

    pub fn set_covered(&self, version: Version) {
        self.covered.store(version, Ordering::Release);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub fn mark_poisoned(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub fn search(&self, query: &[f32], k: usize, ctx: &SearchContext<'_>) -> Result<Vec<Neighbor>> {
        self.index.read().search(query, k, ctx)
    }

    /// Run a closure against the index under the read lock. Used by the
    /// planner, which needs more than a single search call.
    pub fn with_index<R>(&self, f: impl FnOnce(&AnnIndex) -> R) -> R {
        f(&self.index.read())
    }

    /// Fold one record into the generation (incremental variants only).
    pub fn insert(&self, entry: &IndexEntry) {
        self.index.write().insert(entry);
    }

    pub fn supports_incremental(&self) -> bool {
        self.index.read().supports_incremental()
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_estimate(&self) -> usize {
        self.index.read().memory_estimate()
    }

    pub fn drift_ratio(&self) -> f32 {
        self.index.read().drift_ratio()
    }

    pub fn variant(&self) -> proxdb_core::IndexVariant {
        self.index.read().variant()
    }
}
