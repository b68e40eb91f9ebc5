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

//! Metadata filter predicates.
//!
//! A predicate is a conjunction of field conditions evaluated against a
//! record's payload. A condition on a missing field fails the record.
//! Predicates are validated before any search work starts and carry a
//! normalized fingerprint used by the semantic cache to bucket entries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use proxdb_core::{EngineError, FieldValue, Payload, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on text values.
    Contains,
}

impl FilterOp {
    fn is_ordering(self) -> bool {
        matches!(self, FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte)
    }

    fn tag(self) -> u8 {
        match self {
            FilterOp::Eq => 0,
            FilterOp::Ne => 1,
            FilterOp::Gt => 2,
            FilterOp::Gte => 3,
            FilterOp::Lt => 4,
            FilterOp::Lte => 5,
            FilterOp::Contains => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

/// Conjunction of field conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub conditions: Vec<FieldCondition>,
}

impl FilterPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: &str, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Reject malformed predicates before any search work begins.
    pub fn validate(&self) -> Result<()> {
        for cond in &self.conditions {
            if cond.field.is_empty() {
                return Err(EngineError::InvalidFilter("empty field name".into()));
            }
            if cond.op.is_ordering()
                && matches!(cond.value, FieldValue::Null | FieldValue::Bool(_))
            {
                return Err(EngineError::InvalidFilter(format!(
                    "ordering comparison on non-orderable value for field '{}'",
                    cond.field
                )));
            }
            if cond.op == FilterOp::Contains && !matches!(cond.value, FieldValue::Text(_)) {
                return Err(EngineError::InvalidFilter(format!(
                    "contains requires a text value for field '{}'",
                    cond.field
                )));
            }
        }
        Ok(())
    }

    /// Evaluate against a payload. Missing fields fail the conjunction.
    pub fn matches(&self, payload: &Payload) -> bool {
        self.conditions.iter().all(|cond| {
            payload
                .get(&cond.field)
                .map(|value| match_condition(value, cond.op, &cond.value))
                .unwrap_or(false)
        })
    }

    /// Order-insensitive fingerprint over normalized conditions.
    ///
    /// Two predicates listing the same conditions in different order hash
    /// identically, so the cache buckets them together.
    pub fn fingerprint(&self) -> u64 {
        let mut parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("{}\u{1}{}\u{1}{:?}", c.field, c.op.tag(), c.value))
            .collect();
        parts.sort_unstable();
        twox_hash::xxh3::hash64(parts.join("\u{2}").as_bytes())
    }
}

fn match_condition(value: &FieldValue, op: FilterOp, target: &FieldValue) -> bool {
    match op {
        FilterOp::Eq => values_equal(value, target),
        FilterOp::Ne => !values_equal(value, target),
        FilterOp::Gt => compare(value, target) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare(value, target),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => compare(value, target) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare(value, target),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Contains => match (value, target) {
            (FieldValue::Text(hay), FieldValue::Text(needle)) => hay.contains(needle.as_str()),
            _ => false,
        },
    }
}

fn values_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        // Int/Float comparisons coerce, matching the ordering rules below.
        (FieldValue::Int(x), FieldValue::Float(y)) | (FieldValue::Float(y), FieldValue::Int(x)) => {
            (*x as f64 - y).abs() == 0.0
        }
        _ => a == b,
    }
}

fn compare(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Int(x), FieldValue::Int(y)) => Some(x.cmp(y)),
        (FieldValue::Float(x), FieldValue::Float(y)) => x.partial_cmp(y),
        (FieldValue::Int(x), FieldValue::Float(y)) => (*x as f64).partial_cmp(y),
        (FieldValue::Float(x), FieldValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
