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

//! Record and identifier types shared across the engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-collection version counter. Strictly increasing; every insert and
/// tombstone consumes one version.
pub type Version = u64;

/// Identifier of a published index generation. Bumped on every publish.
pub type Generation = u64;

/// Identifier of a vector record, assigned by the store at insert time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct VectorId(pub u64);

impl std::fmt::Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied, already-authorized tenant scope.
///
/// The engine never interprets the value; it only partitions by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct TenantId(pub u64);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tenant/{}", self.0)
    }
}

/// A single payload metadata value.
///
/// Payloads are opaque to the store; filter evaluation in the query planner
/// is the only component that looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Payload metadata carried alongside an embedding.
pub type Payload = HashMap<String, FieldValue>;

/// A versioned vector record.
///
/// Records are append-only: a delete tombstones the record in place rather
/// than removing it, and compaction happens only during index rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub tenant: TenantId,
    pub embedding: Vec<f32>,
    pub payload: Payload,
    pub version: Version,
    /// Tombstone flag. Set once, never cleared.
    pub deleted: bool,
}

impl VectorRecord {
    /// Dimension of the stored embedding.
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}
