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

//! ProxDB Core
//!
//! Shared identifiers, record types, collection configuration, and the
//! error taxonomy used by every other ProxDB crate. This crate is a pure
//! leaf: it depends on nothing else in the workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CacheConfig, CollectionConfig, DistanceMetric, HnswParams, IndexVariant, IvfParams,
    ManagerConfig,
};
pub use error::{EngineError, Result};
pub use types::{FieldValue, Generation, Payload, TenantId, VectorId, VectorRecord, Version};
