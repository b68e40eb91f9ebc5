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

//! Collection and engine configuration.
//!
//! Every tunable recognized by the engine lives here, with documented
//! defaults. The index variant set is closed and fixed at collection
//! creation time; switching variants later means a rebuild under the new
//! configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Distance metric for a collection.
///
/// Fixed per collection; a collection never mixes metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance (no square root on the hot path).
    L2,
    /// Cosine distance, computed as a normalized inner product.
    Cosine,
    /// Raw inner product; larger is closer, stored as negated distance.
    InnerProduct,
}

/// Which ANN structure serves a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexVariant {
    /// Brute-force exact scan. O(N·D) per query, recall 1.0.
    Flat,
    /// Inverted-file clustering. Batch-trained, throughput-oriented.
    Ivf,
    /// Hierarchical navigable small world graph. Latency-oriented,
    /// incremental inserts, no native deletion.
    Hnsw,
}

/// IVF training and probing parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IvfParams {
    /// Number of k-means centroids.
    pub nlist: usize,
    /// Number of nearest clusters visited per query. Lower trades recall
    /// for speed.
    pub nprobe: usize,
    /// Lloyd iteration cap during training.
    pub max_train_iters: usize,
    /// Training sample cap; k-means runs over at most this many vectors.
    pub train_sample: usize,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 64,
            nprobe: 8,
            max_train_iters: 20,
            train_sample: 16_384,
        }
    }
}

/// HNSW graph construction and search parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max out-degree per node per layer (layer 0 allows 2·m).
    pub m: usize,
    /// Candidate frontier size during insertion.
    pub ef_construction: usize,
    /// Candidate frontier size during search. Must be >= k for good recall.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 128,
            ef_search: 64,
        }
    }
}

/// Full per-collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Embedding dimension D. Fixed for the lifetime of the collection.
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub index_variant: IndexVariant,
    pub ivf: IvfParams,
    pub hnsw: HnswParams,
    /// Candidate over-fetch multiplier applied by the planner to
    /// compensate for approximate-recall loss and post-retrieval filtering.
    pub overfetch_factor: f32,
    /// Below this live-record count the manager always serves Flat,
    /// regardless of the configured variant.
    pub flat_threshold: usize,
    /// Estimated filter selectivity below which the planner switches to
    /// filter-then-search (exact scoring over the matching subset).
    pub selectivity_threshold: f32,
    /// Mean intra-cluster drift ratio above which IVF schedules retraining.
    pub ivf_drift_threshold: f32,
    /// Minimum cosine similarity for a semantic cache hit.
    pub cache_similarity_threshold: f32,
    /// Cache entry time-to-live.
    pub cache_ttl: Duration,
    /// Soft cap on index memory; exceeded builds fall back to Flat over a
    /// subset rather than failing the serving path.
    pub max_index_bytes: Option<usize>,
}

impl CollectionConfig {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            index_variant: IndexVariant::Flat,
            ivf: IvfParams::default(),
            hnsw: HnswParams::default(),
            overfetch_factor: 3.0,
            flat_threshold: 1_000,
            selectivity_threshold: 0.1,
            ivf_drift_threshold: 1.5,
            cache_similarity_threshold: 0.95,
            cache_ttl: Duration::from_secs(300),
            max_index_bytes: None,
        }
    }

    pub fn with_variant(mut self, variant: IndexVariant) -> Self {
        self.index_variant = variant;
        self
    }

    /// Reject configurations the engine cannot serve.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(EngineError::InvalidConfig("dimension must be > 0".into()));
        }
        if self.ivf.nlist == 0 || self.ivf.nprobe == 0 {
            return Err(EngineError::InvalidConfig(
                "ivf nlist and nprobe must be > 0".into(),
            ));
        }
        if self.ivf.nprobe > self.ivf.nlist {
            return Err(EngineError::InvalidConfig(format!(
                "ivf nprobe ({}) cannot exceed nlist ({})",
                self.ivf.nprobe, self.ivf.nlist
            )));
        }
        if self.hnsw.m < 2 {
            return Err(EngineError::InvalidConfig("hnsw m must be >= 2".into()));
        }
        if self.overfetch_factor < 1.0 {
            return Err(EngineError::InvalidConfig(
                "overfetch_factor must be >= 1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache_similarity_threshold) {
            return Err(EngineError::InvalidConfig(
                "cache_similarity_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Index manager policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How often `maintain()` polls the store for new versions.
    pub maintain_interval: Duration,
    /// Base delay for rebuild retry backoff; doubles per consecutive failure.
    pub rebuild_backoff: Duration,
    /// Backoff ceiling.
    pub rebuild_backoff_max: Duration,
    /// Consecutive failures after which the collection is flagged degraded.
    pub max_rebuild_failures: u32,
    /// Buffered (IVF) insert count that triggers a background rebuild.
    pub rebuild_buffer_limit: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            maintain_interval: Duration::from_millis(200),
            rebuild_backoff: Duration::from_millis(500),
            rebuild_backoff_max: Duration::from_secs(30),
            max_rebuild_failures: 3,
            rebuild_buffer_limit: 4_096,
        }
    }
}

/// Semantic cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// LRU capacity per tenant; one tenant can never exhaust shared capacity.
    pub max_entries_per_tenant: usize,
    pub default_ttl: Duration,
    pub similarity_threshold: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries_per_tenant: 256,
            default_ttl: Duration::from_secs(300),
            similarity_threshold: 0.95,
        }
    }
}
