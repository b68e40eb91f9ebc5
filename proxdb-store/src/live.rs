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

//! Copy-on-write live-id set.
//!
//! Single writer (the store's delete/insert path), many readers. Readers
//! take an immutable snapshot via an atomic load and filter candidates
//! against it for the whole query, so no search ever observes a
//! half-applied delete. Writers clone, mutate, and swap; deletes are rare
//! relative to searches, so the clone cost sits on the cold path.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use proxdb_core::VectorId;

/// Immutable point-in-time view of the live ids.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    ids: Arc<HashSet<VectorId>>,
}

impl LiveSnapshot {
    pub fn empty() -> Self {
        Self {
            ids: Arc::new(HashSet::new()),
        }
    }

    #[inline]
    pub fn is_live(&self, id: VectorId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.ids.iter().copied()
    }
}

/// The writable side of the live set.
pub struct LiveSet {
    current: ArcSwap<HashSet<VectorId>>,
    /// Serializes writers; readers never touch this lock.
    writer: Mutex<()>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(HashSet::new()),
            writer: Mutex::new(()),
        }
    }

    /// Snapshot for the read path. O(1), lock-free.
    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            ids: self.current.load_full(),
        }
    }

    /// Mark an id live.
    pub fn add(&self, id: VectorId) {
        let _guard = self.writer.lock();
        let mut next: HashSet<VectorId> = (**self.current.load()).clone();
        next.insert(id);
        self.current.store(Arc::new(next));
    }

    /// Remove an id. Returns `false` if it was not live.
    pub fn remove(&self, id: VectorId) -> bool {
        let _guard = self.writer.lock();
        if !self.current.load().contains(&id) {
            return false;
        }
        let mut next: HashSet<VectorId> = (**self.current.load()).clone();
        next.remove(&id);
        self.current.store(Arc::new(next));
        true
    }

    /// Replace the whole set (used during recovery).
    pub fn reset(&self, ids: HashSet<VectorId>) {
        let _guard = self.writer.lock();
        self.current.store(Arc::new(ids));
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for LiveSet {
    fn default() -> Self {
        Self::new()
    }
}
