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

//! Error types for ProxDB.
//!
//! The taxonomy follows the serving-path contract: validation errors are
//! rejected before any work begins, resource exhaustion degrades gracefully,
//! staleness is metadata rather than an error, timeouts are retryable, and
//! corruption fails the query instead of returning unverified results.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // --- Validation: caller must fix the input before retrying ---
    #[error("dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query dimension mismatch: collection expects {expected}, got {actual}")]
    QueryDimensionMismatch { expected: usize, actual: usize },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // --- Resource exhaustion: degrade, never crash the serving path ---
    #[error("cache full: {0}")]
    CacheFull(String),

    #[error("index memory limit: estimated {estimated} bytes exceeds limit {limit}")]
    IndexMemoryLimit { estimated: usize, limit: usize },

    // --- Serving-path conditions ---
    #[error("deadline exceeded")]
    Timeout,

    #[error("corruption detected: {0}")]
    Corruption(String),

    // --- Infrastructure ---
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the caller may retry the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Timeout)
    }

    /// Whether the error is an input-validation rejection.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::DimensionMismatch { .. }
                | EngineError::QueryDimensionMismatch { .. }
                | EngineError::UnknownCollection(_)
                | EngineError::InvalidFilter(_)
                | EngineError::InvalidConfig(_)
        )
    }
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let e = EngineError::DimensionMismatch {
            expected: 128,
            actual: 64,
        };
        assert!(e.is_validation());
        assert!(!e.is_retryable());

        assert!(EngineError::Timeout.is_retryable());
        assert!(!EngineError::Corruption("bad frame".into()).is_validation());
    }

    #[test]
    fn test_display_carries_detail() {
        let e = EngineError::QueryDimensionMismatch {
            expected: 4,
            actual: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains('4') && msg.contains('3'));
    }
}
