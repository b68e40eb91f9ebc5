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

//! IVF (Inverted File) index.
//!
//! Partitions the vector space into `nlist` clusters via k-means over a
//! training sample; each vector is assigned to its nearest centroid. A
//! query ranks centroids and visits only the `nprobe` nearest inverted
//! lists, cutting the scan to roughly `(N / nlist) · nprobe` vectors.
//! Lower `nprobe` trades recall for speed; probing every list degenerates
//! to an exact scan.
//!
//! Training is batch-oriented. Incremental inserts assign to the nearest
//! existing centroid without moving it, so cluster quality decays as the
//! data distribution drifts; [`IvfIndex::drift_ratio`] tracks the decay and
//! the index manager retrains past the configured threshold.
//!
//! Centroid assignment and routing always use squared L2 regardless of the
//! collection metric; within-list scoring uses the collection metric.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use proxdb_core::{DistanceMetric, IvfParams, Result, TenantId, VectorId};

use crate::distance::{l2_squared, metric_distance};
use crate::types::{IndexEntry, Neighbor, SearchContext};

/// Seed for k-means++ initialization. Fixed so that rebuilding the same
/// record set reproduces the same generation.
const TRAIN_SEED: u64 = 0x1df5_ca7e;

pub struct IvfIndex {
    metric: DistanceMetric,
    dimension: usize,
    params: IvfParams,
    centroids: Vec<Vec<f32>>,
    /// Inverted lists: centroid index -> slots.
    lists: Vec<Vec<u32>>,
    vectors: Vec<f32>,
    ids: Vec<VectorId>,
    tenants: Vec<TenantId>,
    slots: HashMap<VectorId, u32>,
    /// Mean assignment distance measured right after training.
    trained_spread: f32,
    /// Running assignment-distance accumulator (train set + inserts).
    drift_sum: f64,
    drift_count: u64,
}

impl IvfIndex {
    /// Train centroids over (a sample of) `entries` and assign all of them.
    pub fn build(
        dimension: usize,
        metric: DistanceMetric,
        params: IvfParams,
        entries: &[IndexEntry],
    ) -> Self {
        let nlist = params.nlist.min(entries.len()).max(1);
        let mut index = Self {
            metric,
            dimension,
            params,
            centroids: Vec::new(),
            lists: vec![Vec::new(); nlist],
            vectors: Vec::with_capacity(entries.len() * dimension),
            ids: Vec::with_capacity(entries.len()),
            tenants: Vec::with_capacity(entries.len()),
            slots: HashMap::with_capacity(entries.len()),
            trained_spread: 0.0,
            drift_sum: 0.0,
            drift_count: 0,
        };

        if entries.is_empty() {
            // A single zero centroid keeps insert/search total on an empty
            // build; the first rebuild after data arrives retrains.
            index.centroids = vec![vec![0.0; dimension]];
            index.lists = vec![Vec::new()];
            return index;
        }

        let sample_len = entries.len().min(index.params.train_sample);
        let sample: Vec<&[f32]> = entries[..sample_len]
            .iter()
            .map(|e| e.embedding.as_slice())
            .collect();

        index.centroids = Self::train_centroids(
            &sample,
            nlist,
            dimension,
            index.params.max_train_iters,
        );

        for entry in entries {
            index.insert(entry);
        }

        index.trained_spread = if index.drift_count > 0 {
            (index.drift_sum / index.drift_count as f64) as f32
        } else {
            0.0
        };

        debug!(
            nlist,
            vectors = entries.len(),
            spread = index.trained_spread,
            "ivf trained"
        );
        index
    }

    /// k-means++ seeding followed by bounded Lloyd iterations.
    fn train_centroids(
        sample: &[&[f32]],
        nlist: usize,
        dimension: usize,
        max_iters: usize,
    ) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(TRAIN_SEED ^ sample.len() as u64);
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(nlist);

        // k-means++: first centroid uniform, the rest proportional to the
        // squared distance from the nearest chosen centroid.
        let first = rng.gen_range(0..sample.len());
        centroids.push(sample[first].to_vec());
        while centroids.len() < nlist {
            let weights: Vec<f32> = sample
                .par_iter()
                .map(|point| {
                    centroids
                        .iter()
                        .map(|c| l2_squared(point, c))
                        .fold(f32::INFINITY, f32::min)
                })
                .collect();
            let total: f32 = weights.iter().sum();
            if total <= 0.0 {
                // Degenerate sample: duplicate points. Fill arbitrarily.
                let idx = centroids.len() % sample.len();
                centroids.push(sample[idx].to_vec());
                continue;
            }
            let target = rng.gen_range(0.0..1.0) * total;
            let mut cumulative = 0.0;
            let mut chosen = sample.len() - 1;
            for (i, w) in weights.iter().enumerate() {
                cumulative += w;
                if cumulative >= target {
                    chosen = i;
                    break;
                }
            }
            centroids.push(sample[chosen].to_vec());
        }

        let mut assignments = vec![0usize; sample.len()];
        for _ in 0..max_iters {
            let next: Vec<usize> = sample
                .par_iter()
                .map(|point| Self::nearest_centroid_of(&centroids, point))
                .collect();
            if next == assignments {
                break;
            }
            assignments = next;

            let mut sums = vec![vec![0.0f32; dimension]; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for (point, &cluster) in sample.iter().zip(assignments.iter()) {
                counts[cluster] += 1;
                for (acc, &v) in sums[cluster].iter_mut().zip(point.iter()) {
                    *acc += v;
                }
            }
            for (cluster, centroid) in centroids.iter_mut().enumerate() {
                if counts[cluster] > 0 {
                    let n = counts[cluster] as f32;
                    for (c, s) in centroid.iter_mut().zip(sums[cluster].iter()) {
                        *c = s / n;
                    }
                }
            }
        }

        centroids
    }

    fn nearest_centroid_of(centroids: &[Vec<f32>], point: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, c) in centroids.iter().enumerate() {
            let d = l2_squared(point, c);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Assign to the nearest centroid without retraining.
    pub fn insert(&mut self, entry: &IndexEntry) {
        debug_assert_eq!(entry.embedding.len(), self.dimension);
        if self.slots.contains_key(&entry.id) {
            return;
        }
        let cluster = Self::nearest_centroid_of(&self.centroids, &entry.embedding);
        let slot = self.ids.len() as u32;

        self.vectors.extend_from_slice(&entry.embedding);
        self.ids.push(entry.id);
        self.tenants.push(entry.tenant);
        self.slots.insert(entry.id, slot);
        self.lists[cluster].push(slot);

        self.drift_sum += l2_squared(&entry.embedding, &self.centroids[cluster]) as f64;
        self.drift_count += 1;
    }

    #[inline]
    fn vector_at(&self, slot: usize) -> &[f32] {
        let start = slot * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Probe the `nprobe` nearest lists (from construction parameters).
    pub fn search(&self, query: &[f32], k: usize, ctx: &SearchContext<'_>) -> Result<Vec<Neighbor>> {
        self.search_with_nprobe(query, k, self.params.nprobe, ctx)
    }

    /// Probe an explicit number of lists. Monotone: a larger `nprobe` can
    /// only add candidates, never lose them.
    pub fn search_with_nprobe(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
        ctx: &SearchContext<'_>,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        // Rank centroids by routing distance.
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, l2_squared(query, c)))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut candidates: Vec<Neighbor> = Vec::new();
        for &(cluster, _) in ranked.iter().take(nprobe.max(1)) {
            // Safe checkpoint: between clusters, after finishing the
            // current one.
            ctx.checkpoint()?;
            for &slot in &self.lists[cluster] {
                let slot = slot as usize;
                let id = self.ids[slot];
                if !ctx.admits(id, self.tenants[slot]) {
                    continue;
                }
                candidates.push(Neighbor {
                    id,
                    distance: metric_distance(self.metric, query, self.vector_at(slot)),
                });
            }
        }

        Neighbor::sort_candidates(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Ratio of the current mean assignment distance to the mean measured
    /// at training time. Grows past 1.0 as inserts drift away from the
    /// trained centroids.
    pub fn drift_ratio(&self) -> f32 {
        if self.trained_spread <= 0.0 || self.drift_count == 0 {
            return 1.0;
        }
        ((self.drift_sum / self.drift_count as f64) as f32) / self.trained_spread
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    pub fn memory_estimate(&self) -> usize {
        let vector_bytes = self.vectors.len() * std::mem::size_of::<f32>();
        let centroid_bytes = self.centroids.len() * self.dimension * std::mem::size_of::<f32>();
        let list_bytes: usize = self
            .lists
            .iter()
            .map(|l| l.len() * std::mem::size_of::<u32>())
            .sum();
        let id_bytes = self.ids.len()
            * (std::mem::size_of::<VectorId>() + std::mem::size_of::<TenantId>() + 16);
        vector_bytes + centroid_bytes + list_bytes + id_bytes
    }
}
