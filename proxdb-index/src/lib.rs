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

//! ProxDB Index Structures
//!
//! Three interchangeable ANN engines behind one closed-variant interface:
//!
//! - **Flat**: brute force, exact, O(N·D) per query. The baseline every
//!   approximate variant is measured against.
//! - **IVF**: k-means-clustered inverted lists. Batch-trained; a query
//!   probes only the `nprobe` nearest lists.
//! - **HNSW**: layered proximity graph. High recall at low latency,
//!   expensive inserts, no native deletion.
//!
//! All variants consult the shared [`SearchContext`] during candidate
//! collection: tombstoned ids are masked through the store's live-set
//! snapshot and the tenant scope is applied before a candidate can enter
//! the result set, never as an afterthought on the final list. Deadlines
//! are honored at safe checkpoints (after the current slot chunk, cluster,
//! or node expansion).

pub mod distance;
pub mod flat;
pub mod hnsw;
pub mod ivf;
pub mod types;
pub mod variant;

pub use distance::metric_distance;
pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use ivf::IvfIndex;
pub use types::{IndexEntry, Neighbor, SearchContext};
pub use variant::AnnIndex;
