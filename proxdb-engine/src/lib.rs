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

//! ProxDB Engine
//!
//! Ties the workspace together: durable vector store, interchangeable ANN
//! generations behind an atomically swapped pointer, background index
//! maintenance with double-buffered rebuilds, hybrid query execution, and
//! a semantic cache — with tenant isolation enforced at every stage.
//!
//! ```no_run
//! use proxdb_core::{CollectionConfig, DistanceMetric, ManagerConfig, Payload, TenantId};
//! use proxdb_engine::{Engine, SearchRequest};
//!
//! # fn main() -> proxdb_core::Result<()> {
//! let engine = Engine::open("/var/lib/proxdb", ManagerConfig::default())?;
//! engine.create_collection("docs", CollectionConfig::new(4, DistanceMetric::L2))?;
//!
//! let tenant = TenantId(1);
//! engine.insert("docs", tenant, vec![0.1, 0.2, 0.3, 0.4], Payload::new())?;
//!
//! let response = engine.search("docs", &SearchRequest::new(tenant, vec![0.1, 0.2, 0.3, 0.4], 5))?;
//! assert!(!response.cache_hit);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod collection;
pub mod engine;
pub mod generation;
pub mod manager;

pub use api::{CollectionStats, Hit, InsertAck, SearchRequest, SearchResponse};
pub use collection::{Collaborators, Collection};
pub use engine::Engine;
pub use generation::IndexGeneration;
pub use manager::IndexManager;
