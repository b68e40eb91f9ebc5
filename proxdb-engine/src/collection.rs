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

//! A collection: one store, one index manager, one semantic cache, and the
//! query pipeline over them.
//!
//! The search path is: validate → semantic cache probe → planner
//! (tenant-scoped, filter-aware, over-fetched) → optional hybrid fusion
//! with lexical candidates → optional re-ranking → truncate to top-K →
//! cache fill. The cache intercepts before planner work and is populated
//! after it; everything between is deterministic for a fixed generation.

use std::sync::Arc;
use std::time::Instant;

use tracing::error;

use proxdb_cache::SemanticCache;
use proxdb_core::{
    CollectionConfig, EngineError, Payload, Result, TenantId, VectorId,
};
use proxdb_index::Neighbor;
use proxdb_query::{
    fuse, FusionConfig, LexicalProvider, PlannerConfig, QueryPlanner, RerankCandidate, Reranker,
    VectorQuery,
};
use proxdb_store::VectorStore;

use crate::api::{CollectionStats, Hit, InsertAck, SearchRequest, SearchResponse};
use crate::manager::IndexManager;

/// External collaborators wired into a collection at creation time.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub lexical: Option<Arc<dyn LexicalProvider>>,
    pub reranker: Option<Arc<dyn Reranker>>,
}

pub struct Collection {
    name: String,
    config: CollectionConfig,
    store: Arc<VectorStore>,
    manager: Arc<IndexManager>,
    cache: Arc<SemanticCache<Vec<Hit>>>,
    planner: QueryPlanner,
    fusion: FusionConfig,
    collaborators: Collaborators,
}

impl Collection {
    pub fn new(
        name: String,
        config: CollectionConfig,
        store: Arc<VectorStore>,
        manager: Arc<IndexManager>,
        collaborators: Collaborators,
    ) -> Arc<Self> {
        let cache = Arc::new(SemanticCache::new(proxdb_core::CacheConfig {
            similarity_threshold: config.cache_similarity_threshold,
            default_ttl: config.cache_ttl,
            ..proxdb_core::CacheConfig::default()
        }));

        // Every successful publish sweeps cache entries recorded against
        // older generations.
        let cache_for_hook = Arc::clone(&cache);
        manager.set_publish_hook(Box::new(move |generation| {
            cache_for_hook.invalidate_generation(generation);
        }));

        Arc::new(Self {
            planner: QueryPlanner::new(PlannerConfig::from_collection(&config)),
            name,
            config,
            store,
            manager,
            cache,
            fusion: FusionConfig::default(),
            collaborators,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn insert(&self, tenant: TenantId, embedding: Vec<f32>, payload: Payload) -> Result<InsertAck> {
        let (id, version) = self.store.insert(tenant, embedding, payload)?;
        Ok(InsertAck { id, version })
    }

    pub fn delete(&self, id: VectorId) -> Result<bool> {
        self.store.delete(id)
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        // Validation happens before any cache or index work.
        if request.embedding.len() != self.config.dimension {
            return Err(EngineError::QueryDimensionMismatch {
                expected: self.config.dimension,
                actual: request.embedding.len(),
            });
        }
        if let Some(filter) = &request.filter {
            filter.validate()?;
        }

        let generation = self.manager.active();
        if generation.is_poisoned() {
            // Fail the query rather than serve unverified results; the
            // store is the source of truth for the fallback rebuild.
            self.manager.request_rebuild();
            error!(collection = %self.name, "poisoned generation; fallback rebuild scheduled");
            return Err(EngineError::Corruption(format!(
                "index generation {} failed verification",
                generation.number()
            )));
        }

        let stale = self.manager.is_degraded();
        let fingerprint = self.request_fingerprint(request);

        // A delete masks without republishing, so generation match alone
        // cannot prove a cached result is still tombstone-clean; the
        // liveness gate drops entries citing dead ids on contact.
        let live = self.store.live_snapshot();
        if let Some(hits) = self.cache.lookup_where(
            request.tenant,
            &request.embedding,
            fingerprint,
            generation.number(),
            |hits| hits.iter().all(|hit| live.is_live(hit.id)),
        ) {
            return Ok(SearchResponse {
                hits,
                stale,
                cache_hit: true,
                generation: generation.number(),
            });
        }

        let deadline = request.timeout.map(|t| Instant::now() + t);
        let mut query = VectorQuery::new(request.tenant, request.embedding.clone(), request.k)
            .with_lexical_terms(request.lexical_terms.clone());
        if let Some(filter) = request.filter.clone() {
            query = query.with_filter(filter);
        }
        if let Some(deadline) = deadline {
            query = query.with_deadline(deadline);
        }

        let candidates = generation.with_index(|index| {
            self.planner
                .candidates(&self.store, index, self.config.metric, &query)
        })?;

        let mut hits = self.rank(request, &candidates)?;
        hits.truncate(request.k);

        self.cache.store(
            request.tenant,
            request.embedding.clone(),
            fingerprint,
            hits.clone(),
            generation.number(),
        );

        Ok(SearchResponse {
            hits,
            stale,
            cache_hit: false,
            generation: generation.number(),
        })
    }

    /// Fuse, re-rank, and materialize payloads.
    fn rank(&self, request: &SearchRequest, candidates: &[Neighbor]) -> Result<Vec<Hit>> {
        // Hybrid fusion only when the lexical collaborator supplies a
        // ranked list; ids present in a single source score from that
        // source alone.
        let mut hits: Vec<Hit> = if !request.lexical_terms.is_empty() {
            if let Some(lexical) = &self.collaborators.lexical {
                let limit = candidates.len().max(request.k);
                let lexical_hits =
                    lexical.search(request.tenant, &request.lexical_terms, limit);
                fuse(candidates, &lexical_hits, &self.fusion)
                    .into_iter()
                    .map(|fused| Hit {
                        id: fused.id,
                        score: fused.score,
                        distance: fused.distance,
                        payload: Payload::new(),
                    })
                    .collect()
            } else {
                self.vector_only_hits(candidates)
            }
        } else {
            self.vector_only_hits(candidates)
        };

        if let Some(reranker) = &self.collaborators.reranker {
            hits.truncate(reranker.max_candidates());
            let records: Vec<_> = hits
                .iter()
                .filter_map(|hit| self.store.get(hit.id))
                .collect();
            let rerank_candidates: Vec<RerankCandidate<'_>> = records
                .iter()
                .map(|rec| RerankCandidate {
                    id: rec.id,
                    embedding: &rec.embedding,
                    payload: &rec.payload,
                })
                .collect();
            let scores = reranker.rescore(&request.embedding, &rerank_candidates);
            for (hit, score) in hits.iter_mut().zip(scores) {
                hit.score = score;
            }
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        // Materialize payloads for the survivors only.
        for hit in hits.iter_mut().take(request.k) {
            if let Some(record) = self.store.get(hit.id) {
                hit.payload = record.payload;
            }
        }
        Ok(hits)
    }

    fn vector_only_hits(&self, candidates: &[Neighbor]) -> Vec<Hit> {
        candidates
            .iter()
            .map(|n| Hit {
                id: n.id,
                score: -n.distance,
                distance: Some(n.distance),
                payload: Payload::new(),
            })
            .collect()
    }

    /// Cache bucket fingerprint: normalized filter shape plus lexical
    /// terms. The query embedding is compared by similarity, not hashed.
    fn request_fingerprint(&self, request: &SearchRequest) -> u64 {
        let filter_fp = request
            .filter
            .as_ref()
            .map(|f| f.fingerprint())
            .unwrap_or(0);
        if request.lexical_terms.is_empty() {
            return filter_fp;
        }
        let mut terms = request.lexical_terms.clone();
        terms.sort_unstable();
        filter_fp ^ twox_hash::xxh3::hash64(terms.join("\u{2}").as_bytes())
    }

    pub fn maintain(&self) -> Result<bool> {
        self.manager.maintain()
    }

    pub fn rebuild(&self) -> Result<proxdb_core::Generation> {
        self.manager.request_rebuild();
        self.manager.rebuild_now()
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn stats(&self) -> CollectionStats {
        let store = self.store.stats();
        let generation = self.manager.active();
        let cache = self.cache.stats();
        CollectionStats {
            total_records: store.total_records,
            live_records: store.live_records,
            tombstones: store.tombstones,
            last_version: store.last_version,
            generation: generation.number(),
            index_variant: generation.variant(),
            index_len: generation.len(),
            index_memory_bytes: generation.memory_estimate(),
            staleness: self.manager.staleness(),
            degraded: self.manager.is_degraded(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cache_entries: cache.entries,
        }
    }
}
