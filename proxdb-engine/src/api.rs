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

//! Request and response types of the engine facade.
//!
//! These are the shapes an HTTP or RPC adapter (an external collaborator)
//! maps onto the wire. Every search response carries `{stale, cache_hit,
//! generation}` so callers can reason about freshness without the engine
//! ever blocking on index maintenance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use proxdb_core::{Generation, Payload, TenantId, VectorId, Version};
use proxdb_query::FilterPredicate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub tenant: TenantId,
    pub embedding: Vec<f32>,
    pub k: usize,
    #[serde(default)]
    pub filter: Option<FilterPredicate>,
    #[serde(default)]
    pub lexical_terms: Vec<String>,
    /// Query deadline, relative to arrival. `None` means no deadline.
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(tenant: TenantId, embedding: Vec<f32>, k: usize) -> Self {
        Self {
            tenant,
            embedding,
            k,
            filter: None,
            lexical_terms: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterPredicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_lexical_terms<S: Into<String>>(mut self, terms: Vec<S>) -> Self {
        self.lexical_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One ranked result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: VectorId,
    /// Ranking score: higher is better. Negated distance for pure vector
    /// queries, fused score under hybrid fusion, model score after
    /// re-ranking.
    pub score: f32,
    /// Metric distance where the vector source produced the hit.
    pub distance: Option<f32>,
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    /// Served from a degraded or behind-schedule generation.
    pub stale: bool,
    /// Satisfied by the semantic cache without touching the index.
    pub cache_hit: bool,
    /// Generation that produced (or originally produced) the result.
    pub generation: Generation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InsertAck {
    pub id: VectorId,
    pub version: Version,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total_records: usize,
    pub live_records: usize,
    pub tombstones: usize,
    pub last_version: Version,
    pub generation: Generation,
    pub index_variant: proxdb_core::IndexVariant,
    pub index_len: usize,
    pub index_memory_bytes: usize,
    pub staleness: u64,
    pub degraded: bool,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_entries: usize,
}
