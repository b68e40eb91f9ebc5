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

//! ProxDB Vector Store
//!
//! Durable, versioned, append-only record storage. The store is the source
//! of truth for the whole engine: index generations are always rebuildable
//! from it, and it never grows a back-reference to the components above it.
//!
//! ## Durability
//!
//! Every accepted insert and first-time delete is framed, appended to the
//! collection's record log, and flushed before the call returns. Recovery
//! replays the log, tolerating a truncated tail (a crash mid-append loses
//! only the unacknowledged entry) but failing hard on checksum mismatch.
//!
//! ## Deletion
//!
//! Deletes tombstone in place. Physical removal happens only when an index
//! rebuild compacts the live set; the store itself keeps tombstoned records
//! so that `scan_since` can replay masking to index builders.

pub mod live;
pub mod store;
pub mod wal;

pub use live::{LiveSet, LiveSnapshot};
pub use store::{ScanCursor, ScanItem, StoreStats, VectorStore};
pub use wal::{RecordLog, WalEntry};
