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

//! Weighted reciprocal-rank fusion.
//!
//! `score(id) = Σ weight_source / (rank_in_source + rrf_k)` summed over the
//! sources in which the id appears; ids present in only one source score
//! from that source alone. Ranks are 1-based. The constant damps the gap
//! between adjacent top ranks; 60 is the robust default from the IR
//! literature and is deliberately a tunable, not a hardcode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use proxdb_core::VectorId;
use proxdb_index::Neighbor;

use crate::lexical::LexicalHit;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FusionConfig {
    pub rrf_k: f32,
    pub vector_weight: f32,
    pub lexical_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            vector_weight: 1.0,
            lexical_weight: 1.0,
        }
    }
}

/// A candidate after fusion. `distance` is carried from the vector source
/// when present; lexical-only candidates have none.
#[derive(Debug, Clone, Copy)]
pub struct FusedHit {
    pub id: VectorId,
    pub score: f32,
    pub distance: Option<f32>,
}

/// Fuse a ranked vector candidate list with a ranked lexical list.
///
/// Both inputs must already be tenant- and tombstone-clean; fusion adds no
/// filtering. Output ordering is deterministic: fused score descending,
/// then distance ascending (lexical-only hits sort after any hit with a
/// distance at equal score), then id ascending.
pub fn fuse(vector: &[Neighbor], lexical: &[LexicalHit], config: &FusionConfig) -> Vec<FusedHit> {
    struct Acc {
        score: f32,
        distance: Option<f32>,
    }

    let mut accum: HashMap<VectorId, Acc> = HashMap::with_capacity(vector.len() + lexical.len());

    for (rank, n) in vector.iter().enumerate() {
        let rrf = config.vector_weight / (rank as f32 + 1.0 + config.rrf_k);
        accum.insert(
            n.id,
            Acc {
                score: rrf,
                distance: Some(n.distance),
            },
        );
    }

    for (rank, hit) in lexical.iter().enumerate() {
        let rrf = config.lexical_weight / (rank as f32 + 1.0 + config.rrf_k);
        accum
            .entry(hit.id)
            .and_modify(|acc| acc.score += rrf)
            .or_insert(Acc {
                score: rrf,
                distance: None,
            });
    }

    let mut fused: Vec<FusedHit> = accum
        .into_iter()
        .map(|(id, acc)| FusedHit {
            id,
            score: acc.score,
            distance: acc.distance,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let da = a.distance.unwrap_or(f32::MAX);
                let db = b.distance.unwrap_or(f32::MAX);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(id: u64, distance: f32) -> Neighbor {
        Neighbor {
            id: VectorId(id),
            distance,
        }
    }

    fn lex(id: u64, score: f32) -> LexicalHit {
        LexicalHit {
            id: VectorId(id),
            score,
        }
    }

    #[test]
    fn test_id_in_both_sources_outranks_single_source() {
        let vector = vec![neighbor(1, 0.1), neighbor(2, 0.2), neighbor(3, 0.3)];
        let lexical = vec![lex(2, 9.0), lex(4, 5.0)];

        let fused = fuse(&vector, &lexical, &FusionConfig::default());

        // id 2 appears in both lists (rank 2 vector, rank 1 lexical) and
        // must beat id 1 (rank 1 vector only).
        assert_eq!(fused[0].id, VectorId(2));
        assert_eq!(fused[1].id, VectorId(1));
    }

    #[test]
    fn test_single_source_ids_score_from_that_source_alone() {
        let vector = vec![neighbor(1, 0.5)];
        let lexical = vec![lex(9, 3.0)];
        let config = FusionConfig::default();

        let fused = fuse(&vector, &lexical, &config);
        let expected = 1.0 / (1.0 + config.rrf_k);
        for hit in &fused {
            assert!((hit.score - expected).abs() < 1e-6);
        }
        // Equal score: the hit carrying a distance sorts first.
        assert_eq!(fused[0].id, VectorId(1));
        assert_eq!(fused[1].id, VectorId(9));
    }

    #[test]
    fn test_vector_only_fusion_preserves_rank_order() {
        let vector = vec![neighbor(5, 0.1), neighbor(3, 0.2), neighbor(8, 0.4)];
        let fused = fuse(&vector, &[], &FusionConfig::default());
        let ids: Vec<VectorId> = fused.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![VectorId(5), VectorId(3), VectorId(8)]);
    }

    #[test]
    fn test_weights_shift_the_balance() {
        let vector = vec![neighbor(1, 0.1)];
        let lexical = vec![lex(2, 1.0)];
        let config = FusionConfig {
            rrf_k: 60.0,
            vector_weight: 0.1,
            lexical_weight: 10.0,
        };
        let fused = fuse(&vector, &lexical, &config);
        assert_eq!(fused[0].id, VectorId(2));
    }
}
