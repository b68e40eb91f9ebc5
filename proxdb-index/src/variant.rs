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

//! Closed-variant dispatch over the three index structures.
//!
//! The variant set is fixed at collection-creation time, so dispatch is a
//! tagged enum with inherent methods rather than trait objects.

use proxdb_core::{CollectionConfig, IndexVariant, Result};

use crate::flat::FlatIndex;
use crate::hnsw::HnswIndex;
use crate::ivf::IvfIndex;
use crate::types::{IndexEntry, Neighbor, SearchContext};

pub enum AnnIndex {
    Flat(FlatIndex),
    Ivf(IvfIndex),
    Hnsw(HnswIndex),
}

impl AnnIndex {
    /// Build the requested variant over a full record set.
    pub fn build(variant: IndexVariant, config: &CollectionConfig, entries: &[IndexEntry]) -> Self {
        match variant {
            IndexVariant::Flat => {
                AnnIndex::Flat(FlatIndex::build(config.dimension, config.metric, entries))
            }
            IndexVariant::Ivf => AnnIndex::Ivf(IvfIndex::build(
                config.dimension,
                config.metric,
                config.ivf,
                entries,
            )),
            IndexVariant::Hnsw => AnnIndex::Hnsw(HnswIndex::build(
                config.dimension,
                config.metric,
                config.hnsw,
                entries,
            )),
        }
    }

    pub fn variant(&self) -> IndexVariant {
        match self {
            AnnIndex::Flat(_) => IndexVariant::Flat,
            AnnIndex::Ivf(_) => IndexVariant::Ivf,
            AnnIndex::Hnsw(_) => IndexVariant::Hnsw,
        }
    }

    /// Whether the variant absorbs single-record inserts cheaply. IVF
    /// accepts them (nearest-centroid assignment) but degrades; the
    /// manager buffers IVF inserts for the next rebuild instead.
    pub fn supports_incremental(&self) -> bool {
        matches!(self, AnnIndex::Flat(_) | AnnIndex::Hnsw(_))
    }

    pub fn insert(&mut self, entry: &IndexEntry) {
        match self {
            AnnIndex::Flat(index) => index.insert(entry),
            AnnIndex::Ivf(index) => index.insert(entry),
            AnnIndex::Hnsw(index) => index.insert(entry),
        }
    }

    pub fn search(&self, query: &[f32], k: usize, ctx: &SearchContext<'_>) -> Result<Vec<Neighbor>> {
        match self {
            AnnIndex::Flat(index) => index.search(query, k, ctx),
            AnnIndex::Ivf(index) => index.search(query, k, ctx),
            AnnIndex::Hnsw(index) => index.search(query, k, ctx),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnnIndex::Flat(index) => index.len(),
            AnnIndex::Ivf(index) => index.len(),
            AnnIndex::Hnsw(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_estimate(&self) -> usize {
        match self {
            AnnIndex::Flat(index) => index.memory_estimate(),
            AnnIndex::Ivf(index) => index.memory_estimate(),
            AnnIndex::Hnsw(index) => index.memory_estimate(),
        }
    }

    /// Cluster drift for IVF; 1.0 (no drift) for the other variants.
    pub fn drift_ratio(&self) -> f32 {
        match self {
            AnnIndex::Ivf(index) => index.drift_ratio(),
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxdb_core::{DistanceMetric, TenantId, VectorId};
    use proxdb_store::LiveSet;

    fn entries() -> Vec<IndexEntry> {
        (0..30u64)
            .map(|i| IndexEntry {
                id: VectorId(i + 1),
                tenant: TenantId(1),
                embedding: vec![i as f32, (i * 3 % 7) as f32],
            })
            .collect()
    }

    #[test]
    fn test_all_variants_agree_on_nearest() {
        let config = CollectionConfig::new(2, DistanceMetric::L2);
        let data = entries();
        let live = LiveSet::new();
        for e in &data {
            live.add(e.id);
        }
        let snap = live.snapshot();
        let ctx = SearchContext::new(&snap);

        for variant in [IndexVariant::Flat, IndexVariant::Ivf, IndexVariant::Hnsw] {
            let index = AnnIndex::build(variant, &config, &data);
            assert_eq!(index.len(), data.len());
            let results = index.search(&[4.0, 5.0], 1, &ctx).unwrap();
            assert_eq!(results.len(), 1, "variant {variant:?} returned nothing");
        }
    }

    #[test]
    fn test_incremental_support_per_variant() {
        let config = CollectionConfig::new(2, DistanceMetric::L2);
        let data = entries();
        assert!(AnnIndex::build(IndexVariant::Flat, &config, &data).supports_incremental());
        assert!(AnnIndex::build(IndexVariant::Hnsw, &config, &data).supports_incremental());
        assert!(!AnnIndex::build(IndexVariant::Ivf, &config, &data).supports_incremental());
    }
}
