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

//! Shared types for the index variants.

use std::collections::HashSet;
use std::time::Instant;

use proxdb_core::{EngineError, Result, TenantId, VectorId, VectorRecord};
use proxdb_store::LiveSnapshot;

/// What an index stores per vector: identity, tenant scope, and the
/// embedding itself. Payloads stay in the store.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: VectorId,
    pub tenant: TenantId,
    pub embedding: Vec<f32>,
}

impl From<&VectorRecord> for IndexEntry {
    fn from(rec: &VectorRecord) -> Self {
        Self {
            id: rec.id,
            tenant: rec.tenant,
            embedding: rec.embedding.clone(),
        }
    }
}

/// A ranked candidate: lower distance is closer under every metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: f32,
}

impl Neighbor {
    /// Deterministic ordering: distance ascending, then id ascending.
    pub fn sort_candidates(neighbors: &mut [Neighbor]) {
        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Per-query candidate gate, applied by every variant *during* candidate
/// collection.
///
/// A candidate enters the result set only if it is live (not tombstoned),
/// belongs to the query's tenant, and — when the planner pre-computed a
/// filtered id set — is a member of that set.
#[derive(Clone)]
pub struct SearchContext<'a> {
    pub tenant: Option<TenantId>,
    pub live: &'a LiveSnapshot,
    /// Pre-approved ids from filter-then-search; `None` means no filter
    /// restriction at the index level.
    pub allowed: Option<&'a HashSet<VectorId>>,
    pub deadline: Option<Instant>,
}

impl<'a> SearchContext<'a> {
    pub fn new(live: &'a LiveSnapshot) -> Self {
        Self {
            tenant: None,
            live,
            allowed: None,
            deadline: None,
        }
    }

    pub fn with_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn with_allowed(mut self, allowed: &'a HashSet<VectorId>) -> Self {
        self.allowed = Some(allowed);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether a candidate may enter the result set.
    #[inline]
    pub fn admits(&self, id: VectorId, tenant: TenantId) -> bool {
        if !self.live.is_live(id) {
            return false;
        }
        if let Some(scope) = self.tenant {
            if scope != tenant {
                return false;
            }
        }
        if let Some(allowed) = self.allowed {
            if !allowed.contains(&id) {
                return false;
            }
        }
        true
    }

    /// Deadline checkpoint. Called between slot chunks, clusters, and node
    /// expansions — never mid-distance-computation.
    #[inline]
    pub fn checkpoint(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::Timeout),
            _ => Ok(()),
        }
    }
}
