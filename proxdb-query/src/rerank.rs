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

//! Optional second-pass re-ranking.
//!
//! A re-ranker rescores the planner's over-fetched candidate set with a
//! costlier relevance function. It must be deterministic for an identical
//! candidate set and model version, is clamped to `max_candidates` to cap
//! worst-case latency, and has no side effects beyond scoring.

use proxdb_core::{DistanceMetric, Payload, VectorId};
use proxdb_index::metric_distance;

/// A candidate handed to the re-ranker: identity plus the full-precision
/// embedding and payload fetched from the store.
pub struct RerankCandidate<'a> {
    pub id: VectorId,
    pub embedding: &'a [f32],
    pub payload: &'a Payload,
}

/// External relevance-model collaborator.
///
/// Higher returned score ranks earlier. Implementations must be pure: the
/// engine may call `rescore` any number of times for the same inputs.
pub trait Reranker: Send + Sync {
    /// Identifies the scoring model; results are only comparable within
    /// one version.
    fn model_version(&self) -> &str;

    /// Upper bound on the candidate set passed to `rescore`.
    fn max_candidates(&self) -> usize {
        128
    }

    /// One score per candidate, parallel to the input slice.
    fn rescore(&self, query: &[f32], candidates: &[RerankCandidate<'_>]) -> Vec<f32>;
}

/// Exact rescoring against full-precision embeddings.
///
/// Useful when the serving index quantizes or approximates distances: the
/// second pass re-scores the shortlist with the true metric, pulling
/// embeddings back from the store.
pub struct ExactReranker {
    metric: DistanceMetric,
}

impl ExactReranker {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl Reranker for ExactReranker {
    fn model_version(&self) -> &str {
        "exact-rescore/1"
    }

    fn rescore(&self, query: &[f32], candidates: &[RerankCandidate<'_>]) -> Vec<f32> {
        candidates
            .iter()
            .map(|c| -metric_distance(self.metric, query, c.embedding))
            .collect()
    }
}
