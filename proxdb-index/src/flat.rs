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

//! Flat (exact) index.
//!
//! Vectors live in one contiguous `Vec<f32>` with dense slot ids, so a
//! scan walks memory linearly. Exact by construction: recall against a
//! brute-force reference is 1.0, which is why the manager serves Flat below
//! the small-collection threshold and why tests use it as the oracle for
//! the approximate variants.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashMap;

use proxdb_core::{DistanceMetric, Result, TenantId, VectorId};

use crate::distance::metric_distance;
use crate::types::{IndexEntry, Neighbor, SearchContext};

/// Slots checked between deadline checkpoints.
const CHECKPOINT_INTERVAL: usize = 1024;

/// Max-heap entry so the heap root is the worst of the current top-k.
struct HeapItem {
    distance: f32,
    id: VectorId,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            // Ties: larger id is "worse", so equal-distance results pop in
            // ascending-id order.
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Brute-force exact index.
pub struct FlatIndex {
    metric: DistanceMetric,
    dimension: usize,
    vectors: Vec<f32>,
    ids: Vec<VectorId>,
    tenants: Vec<TenantId>,
    slots: HashMap<VectorId, u32>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            metric,
            dimension,
            vectors: Vec::new(),
            ids: Vec::new(),
            tenants: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn build(dimension: usize, metric: DistanceMetric, entries: &[IndexEntry]) -> Self {
        let mut index = Self::new(dimension, metric);
        index.vectors.reserve(entries.len() * dimension);
        index.ids.reserve(entries.len());
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    pub fn insert(&mut self, entry: &IndexEntry) {
        debug_assert_eq!(entry.embedding.len(), self.dimension);
        if self.slots.contains_key(&entry.id) {
            return;
        }
        let slot = self.ids.len() as u32;
        self.vectors.extend_from_slice(&entry.embedding);
        self.ids.push(entry.id);
        self.tenants.push(entry.tenant);
        self.slots.insert(entry.id, slot);
    }

    #[inline]
    fn vector_at(&self, slot: usize) -> &[f32] {
        let start = slot * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Exact top-k over every admitted slot.
    pub fn search(&self, query: &[f32], k: usize, ctx: &SearchContext<'_>) -> Result<Vec<Neighbor>> {
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(k + 1);
        for slot in 0..self.ids.len() {
            if slot % CHECKPOINT_INTERVAL == 0 {
                ctx.checkpoint()?;
            }
            let id = self.ids[slot];
            if !ctx.admits(id, self.tenants[slot]) {
                continue;
            }
            let distance = metric_distance(self.metric, query, self.vector_at(slot));
            if heap.len() < k {
                heap.push(HeapItem { distance, id });
            } else if let Some(worst) = heap.peek() {
                if distance < worst.distance
                    || (distance == worst.distance && id < worst.id)
                {
                    heap.pop();
                    heap.push(HeapItem { distance, id });
                }
            }
        }

        let mut results: Vec<Neighbor> = heap
            .into_iter()
            .map(|item| Neighbor {
                id: item.id,
                distance: item.distance,
            })
            .collect();
        Neighbor::sort_candidates(&mut results);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn memory_estimate(&self) -> usize {
        self.vectors.len() * std::mem::size_of::<f32>()
            + self.ids.len()
                * (std::mem::size_of::<VectorId>()
                    + std::mem::size_of::<TenantId>()
                    + std::mem::size_of::<u32>()
                    + 16)
    }
}
