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

//! ProxDB Query Layer
//!
//! The planner restricts the candidate space to the requesting tenant's
//! live ids, decides between filter-then-search and search-then-filter
//! from an estimated filter selectivity, over-fetches from the active
//! index generation, fuses with externally supplied lexical candidates via
//! weighted reciprocal-rank fusion, and hands the candidate set to an
//! optional re-ranker. Final ordering is deterministic: fused score
//! descending, then distance ascending, then id ascending.

pub mod filter;
pub mod fusion;
pub mod lexical;
pub mod planner;
pub mod rerank;

pub use filter::{FieldCondition, FilterOp, FilterPredicate};
pub use fusion::{fuse, FusedHit, FusionConfig};
pub use lexical::{Bm25Index, LexicalHit, LexicalProvider};
pub use planner::{PlannerConfig, QueryPlanner, VectorQuery};
pub use rerank::{ExactReranker, RerankCandidate, Reranker};
