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

//! Query planner.
//!
//! Decides *how* to satisfy a query before touching the index:
//!
//! 1. Restrict the candidate space to the requesting tenant's live ids.
//! 2. With a filter present, estimate its selectivity against the tenant's
//!    payloads. A restrictive filter flips the plan to filter-then-search:
//!    exact scoring over the matching subset, which cannot under-return
//!    top-K the way post-filtering an approximate candidate list can.
//! 3. Otherwise run the index search, over-fetching `k · overfetch_factor`
//!    to absorb approximate-recall loss and post-retrieval filtering.
//!
//! The planner returns an over-fetched candidate list; fusion and the
//! re-ranker run above it and the engine truncates to the final top-K.

use std::collections::HashSet;
use std::time::Instant;

use tracing::debug;

use proxdb_core::{CollectionConfig, DistanceMetric, EngineError, Result, TenantId, VectorId};
use proxdb_index::{metric_distance, AnnIndex, Neighbor, SearchContext};
use proxdb_store::VectorStore;

use crate::filter::FilterPredicate;

/// Records scored between deadline checkpoints on the exact path.
const CHECKPOINT_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub overfetch_factor: f32,
    pub selectivity_threshold: f32,
}

impl PlannerConfig {
    pub fn from_collection(config: &CollectionConfig) -> Self {
        Self {
            overfetch_factor: config.overfetch_factor,
            selectivity_threshold: config.selectivity_threshold,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: 3.0,
            selectivity_threshold: 0.1,
        }
    }
}

/// A planned similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub embedding: Vec<f32>,
    pub k: usize,
    pub tenant: TenantId,
    pub filter: Option<FilterPredicate>,
    pub lexical_terms: Vec<String>,
    pub deadline: Option<Instant>,
}

impl VectorQuery {
    pub fn new(tenant: TenantId, embedding: Vec<f32>, k: usize) -> Self {
        Self {
            embedding,
            k,
            tenant,
            filter: None,
            lexical_terms: Vec::new(),
            deadline: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_lexical_terms(mut self, terms: Vec<String>) -> Self {
        self.lexical_terms = terms;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

pub struct QueryPlanner {
    config: PlannerConfig,
}

impl QueryPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Validate the query and produce the over-fetched candidate list.
    pub fn candidates(
        &self,
        store: &VectorStore,
        index: &AnnIndex,
        metric: DistanceMetric,
        query: &VectorQuery,
    ) -> Result<Vec<Neighbor>> {
        if query.embedding.len() != store.dimension() {
            return Err(EngineError::QueryDimensionMismatch {
                expected: store.dimension(),
                actual: query.embedding.len(),
            });
        }
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }
        if query.k == 0 {
            return Ok(Vec::new());
        }

        let live = store.live_snapshot();
        let mut ctx = SearchContext::new(&live).with_tenant(query.tenant);
        if let Some(deadline) = query.deadline {
            ctx = ctx.with_deadline(deadline);
        }

        let overfetch = ((query.k as f32 * self.config.overfetch_factor).ceil() as usize)
            .max(query.k);

        let Some(filter) = query.filter.as_ref().filter(|f| !f.is_empty()) else {
            return index.search(&query.embedding, overfetch, &ctx);
        };

        // Estimate selectivity over the tenant's live payloads. The same
        // pass yields the matching ids, so a selective filter has already
        // paid for its subset.
        let tenant_records = store.live_records();
        let mut total = 0usize;
        let mut matching: Vec<VectorId> = Vec::new();
        for record in tenant_records.iter().filter(|r| r.tenant == query.tenant) {
            total += 1;
            if filter.matches(&record.payload) {
                matching.push(record.id);
            }
        }
        if total == 0 {
            return Ok(Vec::new());
        }

        let selectivity = matching.len() as f32 / total as f32;
        if selectivity <= self.config.selectivity_threshold {
            debug!(selectivity, matched = matching.len(), "filter-then-search");
            let allowed: HashSet<VectorId> = matching.into_iter().collect();
            return self.exact_over_subset(store, metric, &query.embedding, overfetch, &ctx, &allowed);
        }

        debug!(selectivity, "search-then-filter");
        let raw = index.search(&query.embedding, overfetch, &ctx)?;
        let mut filtered = Vec::with_capacity(raw.len());
        for neighbor in raw {
            let keep = store
                .get(neighbor.id)
                .map(|rec| filter.matches(&rec.payload))
                .unwrap_or(false);
            if keep {
                filtered.push(neighbor);
            }
        }
        Ok(filtered)
    }

    /// Exact distance scoring over a pre-approved id subset.
    fn exact_over_subset(
        &self,
        store: &VectorStore,
        metric: DistanceMetric,
        embedding: &[f32],
        limit: usize,
        ctx: &SearchContext<'_>,
        allowed: &HashSet<VectorId>,
    ) -> Result<Vec<Neighbor>> {
        let mut scored: Vec<Neighbor> = Vec::with_capacity(allowed.len());
        for (i, &id) in allowed.iter().enumerate() {
            if i % CHECKPOINT_INTERVAL == 0 {
                ctx.checkpoint()?;
            }
            let Some(record) = store.get(id) else {
                continue;
            };
            if !ctx.admits(record.id, record.tenant) {
                continue;
            }
            scored.push(Neighbor {
                id,
                distance: metric_distance(metric, embedding, &record.embedding),
            });
        }
        Neighbor::sort_candidates(&mut scored);
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use proxdb_core::{DistanceMetric, IndexVariant, Payload};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(n: usize) -> (TempDir, Arc<VectorStore>, AnnIndex, CollectionConfig) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(VectorStore::open(dir.path(), 2).unwrap());
        let config = CollectionConfig::new(2, DistanceMetric::L2);

        for i in 0..n {
            let mut payload = Payload::new();
            payload.insert(
                "parity".into(),
                if i % 2 == 0 { "even" } else { "odd" }.into(),
            );
            payload.insert("rank".into(), (i as i64).into());
            store
                .insert(TenantId(1), vec![i as f32, 0.0], payload)
                .unwrap();
        }

        let entries: Vec<proxdb_index::IndexEntry> = store
            .live_records()
            .iter()
            .map(proxdb_index::IndexEntry::from)
            .collect();
        let index = AnnIndex::build(IndexVariant::Flat, &config, &entries);
        (dir, store, index, config)
    }

    #[test]
    fn test_dimension_mismatch_rejected_before_work() {
        let (_dir, store, index, config) = setup(4);
        let planner = QueryPlanner::new(PlannerConfig::from_collection(&config));
        let query = VectorQuery::new(TenantId(1), vec![0.0; 3], 2);
        assert!(matches!(
            planner.candidates(&store, &index, config.metric, &query),
            Err(EngineError::QueryDimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_empty_collection_returns_empty() {
        let (_dir, store, index, config) = setup(0);
        let planner = QueryPlanner::new(PlannerConfig::default());
        let query = VectorQuery::new(TenantId(1), vec![0.0, 0.0], 5);
        let out = planner
            .candidates(&store, &index, config.metric, &query)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_overfetch_expands_candidate_list() {
        let (_dir, store, index, config) = setup(30);
        let planner = QueryPlanner::new(PlannerConfig {
            overfetch_factor: 3.0,
            selectivity_threshold: 0.1,
        });
        let query = VectorQuery::new(TenantId(1), vec![0.0, 0.0], 4);
        let out = planner
            .candidates(&store, &index, config.metric, &query)
            .unwrap();
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn test_restrictive_filter_takes_exact_path() {
        let (_dir, store, index, config) = setup(50);
        let planner = QueryPlanner::new(PlannerConfig {
            overfetch_factor: 2.0,
            selectivity_threshold: 0.1,
        });
        // Matches exactly one record out of 50: selectivity 0.02.
        let filter = FilterPredicate::new().and("rank", FilterOp::Eq, 37i64);
        let query = VectorQuery::new(TenantId(1), vec![0.0, 0.0], 5).with_filter(filter);

        let out = planner
            .candidates(&store, &index, config.metric, &query)
            .unwrap();
        assert_eq!(out.len(), 1);
        // The single match is far from the query yet still returned —
        // post-filtering an over-fetched list would have dropped it.
        let rec = store.get(out[0].id).unwrap();
        assert_eq!(rec.payload.get("rank"), Some(&37i64.into()));
    }

    #[test]
    fn test_broad_filter_takes_index_path() {
        let (_dir, store, index, config) = setup(50);
        let planner = QueryPlanner::new(PlannerConfig {
            overfetch_factor: 2.0,
            selectivity_threshold: 0.1,
        });
        let filter = FilterPredicate::new().and("parity", FilterOp::Eq, "even");
        let query = VectorQuery::new(TenantId(1), vec![0.0, 0.0], 5).with_filter(filter);

        let out = planner
            .candidates(&store, &index, config.metric, &query)
            .unwrap();
        assert!(!out.is_empty());
        for n in &out {
            let rec = store.get(n.id).unwrap();
            assert_eq!(rec.payload.get("parity"), Some(&"even".into()));
        }
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let (_dir, store, index, config) = setup(5);
        let planner = QueryPlanner::new(PlannerConfig::default());
        let filter = FilterPredicate::new().and("flag", FilterOp::Gt, true);
        let query = VectorQuery::new(TenantId(1), vec![0.0, 0.0], 2).with_filter(filter);
        assert!(matches!(
            planner.candidates(&store, &index, config.metric, &query),
            Err(EngineError::InvalidFilter(_))
        ));
    }
}
