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

//! Lexical collaborator interface.
//!
//! The engine consumes ranked term-match candidates from an external
//! keyword index; it does not own one. [`Bm25Index`] is the in-memory
//! reference implementation the integration tests wire in.

use std::collections::HashMap;

use parking_lot::RwLock;

use proxdb_core::{TenantId, VectorId};

/// A ranked lexical candidate. Higher score ranks earlier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub id: VectorId,
    pub score: f32,
}

/// External keyword-index collaborator.
///
/// Implementations must scope results to the given tenant; the fusion
/// stage trusts its inputs to be tenant-clean.
pub trait LexicalProvider: Send + Sync {
    fn search(&self, tenant: TenantId, terms: &[String], limit: usize) -> Vec<LexicalHit>;
}

// ============================================================================
// Reference BM25 implementation (tests and examples)
// ============================================================================

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

#[derive(Default)]
struct TenantIndex {
    /// term -> (doc, term frequency)
    postings: HashMap<String, Vec<(VectorId, u32)>>,
    doc_lengths: HashMap<VectorId, u32>,
    total_len: u64,
}

/// Minimal in-memory BM25 index, scoped per tenant.
#[derive(Default)]
pub struct Bm25Index {
    tenants: RwLock<HashMap<TenantId, TenantIndex>>,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    pub fn add_document(&self, tenant: TenantId, id: VectorId, text: &str) {
        let terms = Self::tokenize(text);
        let mut counts: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            *counts.entry(term.clone()).or_insert(0) += 1;
        }

        let mut tenants = self.tenants.write();
        let index = tenants.entry(tenant).or_default();
        index.doc_lengths.insert(id, terms.len() as u32);
        index.total_len += terms.len() as u64;
        for (term, tf) in counts {
            index.postings.entry(term).or_default().push((id, tf));
        }
    }
}

impl LexicalProvider for Bm25Index {
    fn search(&self, tenant: TenantId, terms: &[String], limit: usize) -> Vec<LexicalHit> {
        let tenants = self.tenants.read();
        let Some(index) = tenants.get(&tenant) else {
            return Vec::new();
        };
        let n_docs = index.doc_lengths.len() as f32;
        if n_docs == 0.0 {
            return Vec::new();
        }
        let avg_len = index.total_len as f32 / n_docs;

        let mut scores: HashMap<VectorId, f32> = HashMap::new();
        for term in terms {
            let term = term.to_lowercase();
            let Some(postings) = index.postings.get(&term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = ((n_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
            for &(id, tf) in postings {
                let len = *index.doc_lengths.get(&id).unwrap_or(&1) as f32;
                let tf = tf as f32;
                let norm = tf * (BM25_K1 + 1.0)
                    / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len));
                *scores.entry(id).or_insert(0.0) += idf * norm;
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .map(|(id, score)| LexicalHit { id, score })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_match_ranks_by_relevance() {
        let index = Bm25Index::new();
        let t = TenantId(1);
        index.add_document(t, VectorId(1), "rust vector search engine");
        index.add_document(t, VectorId(2), "vector vector vector index");
        index.add_document(t, VectorId(3), "unrelated cooking recipe");

        let hits = index.search(t, &["vector".to_string()], 10);
        assert_eq!(hits.len(), 2);
        // Doc 2 has higher term frequency.
        assert_eq!(hits[0].id, VectorId(2));
        assert!(hits.iter().all(|h| h.id != VectorId(3)));
    }

    #[test]
    fn test_results_are_tenant_scoped() {
        let index = Bm25Index::new();
        index.add_document(TenantId(1), VectorId(1), "shared term");
        index.add_document(TenantId(2), VectorId(2), "shared term");

        let hits = index.search(TenantId(1), &["shared".to_string()], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, VectorId(1));
    }

    #[test]
    fn test_unknown_tenant_is_empty() {
        let index = Bm25Index::new();
        assert!(index.search(TenantId(9), &["x".to_string()], 5).is_empty());
    }
}
