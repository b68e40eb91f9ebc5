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

//! HNSW (Hierarchical Navigable Small World) index.
//!
//! Multi-layer proximity graph after Malkov & Yashunin (2016). Every
//! inserted node draws a layer from an exponentially decaying distribution
//! and is greedily linked to its nearest neighbors per layer, up to
//! out-degree `m` (`2·m` on the base layer). Search descends greedily from
//! the top layer, then runs a best-first frontier of size `ef_search` on
//! the base layer.
//!
//! There is no native deletion: tombstoned nodes stay in the graph as
//! routing waypoints and are masked from results through the live-set
//! snapshot in [`SearchContext`]. A rebuild is the only point where they
//! leave the graph.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use proxdb_core::{DistanceMetric, HnswParams, Result, TenantId, VectorId};

use crate::distance::metric_distance;
use crate::types::{IndexEntry, Neighbor, SearchContext};

/// Hard cap on the layer a node can draw.
const MAX_LAYER: usize = 16;

/// Inline neighbor capacity; spills to the heap only past 2·m for m > 16.
const INLINE_NEIGHBORS: usize = 32;

/// Node expansions between deadline checkpoints on the query path.
const CHECKPOINT_INTERVAL: usize = 32;

struct Node {
    id: VectorId,
    tenant: TenantId,
    layer: usize,
    /// Adjacency per layer, `neighbors[0]` is the base layer.
    neighbors: Vec<SmallVec<[u32; INLINE_NEIGHBORS]>>,
}

/// Frontier entry ordered by distance, slot as tie-break.
#[derive(PartialEq)]
struct DistSlot {
    distance: f32,
    slot: u32,
}

impl Eq for DistSlot {}

impl PartialOrd for DistSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

pub struct HnswIndex {
    metric: DistanceMetric,
    dimension: usize,
    params: HnswParams,
    nodes: Vec<Node>,
    vectors: Vec<f32>,
    slots: HashMap<VectorId, u32>,
    entry: Option<u32>,
    max_layer: usize,
    /// Inverse of ln(m); scales the exponential layer distribution.
    level_norm: f64,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dimension: usize, metric: DistanceMetric, params: HnswParams) -> Self {
        let m = params.m.max(2);
        Self {
            metric,
            dimension,
            params,
            nodes: Vec::new(),
            vectors: Vec::new(),
            slots: HashMap::new(),
            entry: None,
            max_layer: 0,
            level_norm: 1.0 / (m as f64).ln(),
            rng: StdRng::seed_from_u64(0x9e37_79b9),
        }
    }

    pub fn build(
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
        entries: &[IndexEntry],
    ) -> Self {
        let mut index = Self::new(dimension, metric, params);
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    fn max_degree(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    fn sample_layer(&mut self) -> usize {
        let mut u: f64 = self.rng.gen_range(0.0..1.0);
        if u <= 0.0 {
            u = f64::MIN_POSITIVE;
        }
        ((-u.ln() * self.level_norm).floor() as usize).min(MAX_LAYER)
    }

    #[inline]
    fn vector_at(&self, slot: u32) -> &[f32] {
        let start = slot as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    fn distance_to(&self, query: &[f32], slot: u32) -> f32 {
        metric_distance(self.metric, query, self.vector_at(slot))
    }

    /// Single-step greedy descent on one layer: follow improving edges
    /// until a local minimum.
    fn greedy_step(&self, query: &[f32], mut current: u32, layer: usize) -> u32 {
        let mut current_dist = self.distance_to(query, current);
        loop {
            let mut improved = false;
            for &nbr in &self.nodes[current as usize].neighbors[layer] {
                let d = self.distance_to(query, nbr);
                if d < current_dist {
                    current = nbr;
                    current_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first frontier search on one layer. Returns up to `ef`
    /// closest slots, ascending by distance.
    ///
    /// `ctx` is `None` during construction (no deadline applies while the
    /// manager builds) and `Some` on the query path.
    fn search_layer(
        &self,
        query: &[f32],
        entry: u32,
        ef: usize,
        layer: usize,
        ctx: Option<&SearchContext<'_>>,
    ) -> Result<Vec<DistSlot>> {
        let entry_dist = self.distance_to(query, entry);
        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);

        // Min-heap of frontier candidates, max-heap of current results.
        let mut frontier: BinaryHeap<Reverse<DistSlot>> = BinaryHeap::new();
        let mut results: BinaryHeap<DistSlot> = BinaryHeap::new();
        frontier.push(Reverse(DistSlot {
            distance: entry_dist,
            slot: entry,
        }));
        results.push(DistSlot {
            distance: entry_dist,
            slot: entry,
        });

        let mut expansions = 0usize;
        while let Some(Reverse(candidate)) = frontier.pop() {
            if results.len() >= ef {
                let worst = results.peek().map(|r| r.distance).unwrap_or(f32::MAX);
                if candidate.distance > worst {
                    break;
                }
            }

            if let Some(ctx) = ctx {
                expansions += 1;
                if expansions % CHECKPOINT_INTERVAL == 0 {
                    ctx.checkpoint()?;
                }
            }

            for &nbr in &self.nodes[candidate.slot as usize].neighbors[layer] {
                if !visited.insert(nbr) {
                    continue;
                }
                let d = self.distance_to(query, nbr);
                let admit = results.len() < ef
                    || results.peek().map(|r| d < r.distance).unwrap_or(true);
                if admit {
                    frontier.push(Reverse(DistSlot {
                        distance: d,
                        slot: nbr,
                    }));
                    results.push(DistSlot {
                        distance: d,
                        slot: nbr,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<DistSlot> = results.into_vec();
        out.sort();
        Ok(out)
    }

    /// Insert one entry, linking it into every layer up to its drawn level.
    pub fn insert(&mut self, entry: &IndexEntry) {
        debug_assert_eq!(entry.embedding.len(), self.dimension);
        if self.slots.contains_key(&entry.id) {
            return;
        }

        let level = self.sample_layer();
        let slot = self.nodes.len() as u32;
        self.vectors.extend_from_slice(&entry.embedding);
        self.nodes.push(Node {
            id: entry.id,
            tenant: entry.tenant,
            layer: level,
            neighbors: vec![SmallVec::new(); level + 1],
        });
        self.slots.insert(entry.id, slot);

        let Some(mut ep) = self.entry else {
            self.entry = Some(slot);
            self.max_layer = level;
            return;
        };

        let query = entry.embedding.as_slice();

        // Descend through layers above the new node's level.
        for layer in ((level + 1)..=self.max_layer).rev() {
            ep = self.greedy_step(query, ep, layer);
        }

        // Link into every layer from min(level, max_layer) down to 0.
        for layer in (0..=level.min(self.max_layer)).rev() {
            let candidates = self
                .search_layer(query, ep, self.params.ef_construction, layer, None)
                .expect("construction search carries no deadline");
            let degree = self.max_degree(layer);

            let chosen: Vec<u32> = candidates
                .iter()
                .take(degree)
                .map(|c| c.slot)
                .collect();

            for &nbr in &chosen {
                self.nodes[slot as usize].neighbors[layer].push(nbr);
                self.nodes[nbr as usize].neighbors[layer].push(slot);
                self.prune(nbr, layer);
            }

            if let Some(best) = candidates.first() {
                ep = best.slot;
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry = Some(slot);
        }
    }

    /// Trim a node's adjacency back to the degree cap, keeping the closest.
    fn prune(&mut self, slot: u32, layer: usize) {
        let degree = self.max_degree(layer);
        if self.nodes[slot as usize].neighbors[layer].len() <= degree {
            return;
        }
        let base = self.vector_at(slot).to_vec();
        let mut ranked: Vec<DistSlot> = self.nodes[slot as usize].neighbors[layer]
            .iter()
            .map(|&nbr| DistSlot {
                distance: metric_distance(self.metric, &base, self.vector_at(nbr)),
                slot: nbr,
            })
            .collect();
        ranked.sort();
        ranked.truncate(degree);
        self.nodes[slot as usize].neighbors[layer] =
            ranked.into_iter().map(|c| c.slot).collect();
    }

    /// Search with the constructed `ef_search`.
    pub fn search(&self, query: &[f32], k: usize, ctx: &SearchContext<'_>) -> Result<Vec<Neighbor>> {
        self.search_with_ef(query, k, self.params.ef_search, ctx)
    }

    /// Search with an explicit frontier width. Monotone: widening `ef`
    /// visits a superset of nodes for a fixed graph.
    pub fn search_with_ef(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        ctx: &SearchContext<'_>,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(mut ep) = self.entry else {
            return Ok(Vec::new());
        };

        for layer in (1..=self.max_layer).rev() {
            ep = self.greedy_step(query, ep, layer);
        }

        let ef = ef.max(k);
        let candidates = self.search_layer(query, ep, ef, 0, Some(ctx))?;

        // Tombstoned and out-of-scope nodes served as routing waypoints
        // above; they are masked here, before anything becomes a result.
        let mut results: Vec<Neighbor> = candidates
            .into_iter()
            .filter_map(|c| {
                let node = &self.nodes[c.slot as usize];
                ctx.admits(node.id, node.tenant).then_some(Neighbor {
                    id: node.id,
                    distance: c.distance,
                })
            })
            .collect();
        Neighbor::sort_candidates(&mut results);
        results.truncate(k);
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn memory_estimate(&self) -> usize {
        let vector_bytes = self.vectors.len() * std::mem::size_of::<f32>();
        let adjacency_bytes: usize = self
            .nodes
            .iter()
            .map(|n| {
                n.neighbors
                    .iter()
                    .map(|l| l.len() * std::mem::size_of::<u32>() + 24)
                    .sum::<usize>()
            })
            .sum();
        let node_bytes = self.nodes.len()
            * (std::mem::size_of::<VectorId>() + std::mem::size_of::<TenantId>() + 16);
        vector_bytes + adjacency_bytes + node_bytes
    }
}
