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

//! The versioned vector store.
//!
//! One store per collection. Inserts are durable before they are
//! acknowledged; the per-collection version counter strictly increases and
//! covers both inserts and tombstones, so `scan_since` gives index builders
//! a total order to consume.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use proxdb_core::{
    EngineError, Payload, Result, TenantId, VectorId, VectorRecord, Version,
};

use crate::live::{LiveSet, LiveSnapshot};
use crate::wal::{RecordLog, WalEntry};

/// Entry yielded by a scan: the record as of that version.
#[derive(Debug, Clone)]
pub struct ScanItem {
    pub version: Version,
    pub record: VectorRecord,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total_records: usize,
    pub live_records: usize,
    pub tombstones: usize,
    pub last_version: Version,
}

#[derive(Debug, Clone, Copy)]
enum LogOp {
    Insert(VectorId),
    Tombstone(VectorId),
}

struct StoreInner {
    /// Latest state per id.
    records: HashMap<VectorId, VectorRecord>,
    /// Total version order over inserts and tombstones.
    log: BTreeMap<Version, LogOp>,
    next_version: Version,
    next_id: u64,
}

/// Durable, versioned record storage for one collection.
pub struct VectorStore {
    dimension: usize,
    inner: RwLock<StoreInner>,
    live: LiveSet,
    /// Serializes the append → flush → apply sequence on the write path.
    wal: Mutex<RecordLog>,
}

impl VectorStore {
    /// Open (or create) the store backing directory, replaying the record
    /// log into memory.
    pub fn open(dir: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let wal_path = dir.join("records.wal");

        let entries = RecordLog::replay(&wal_path)?;
        let mut inner = StoreInner {
            records: HashMap::new(),
            log: BTreeMap::new(),
            next_version: 1,
            next_id: 1,
        };
        let mut live = HashSet::new();

        for entry in entries {
            match entry {
                WalEntry::Insert {
                    id,
                    tenant,
                    version,
                    embedding,
                    payload,
                } => {
                    inner.records.insert(
                        id,
                        VectorRecord {
                            id,
                            tenant,
                            embedding,
                            payload,
                            version,
                            deleted: false,
                        },
                    );
                    inner.log.insert(version, LogOp::Insert(id));
                    inner.next_version = inner.next_version.max(version + 1);
                    inner.next_id = inner.next_id.max(id.0 + 1);
                    live.insert(id);
                }
                WalEntry::Tombstone { id, version } => {
                    if let Some(rec) = inner.records.get_mut(&id) {
                        rec.deleted = true;
                    }
                    inner.log.insert(version, LogOp::Tombstone(id));
                    inner.next_version = inner.next_version.max(version + 1);
                    live.remove(&id);
                }
            }
        }

        let recovered = inner.records.len();
        if recovered > 0 {
            info!(records = recovered, live = live.len(), "store recovered");
        }

        let live_set = LiveSet::new();
        live_set.reset(live);

        Ok(Self {
            dimension,
            inner: RwLock::new(inner),
            live: live_set,
            wal: Mutex::new(RecordLog::open(&wal_path)?),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert a record. Durable before the `(id, version)` ack is returned.
    pub fn insert(
        &self,
        tenant: TenantId,
        embedding: Vec<f32>,
        payload: Payload,
    ) -> Result<(VectorId, Version)> {
        if embedding.len() != self.dimension {
            return Err(EngineError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut wal = self.wal.lock();
        let (id, version) = {
            let inner = self.inner.read();
            (VectorId(inner.next_id), inner.next_version)
        };

        wal.append(&WalEntry::Insert {
            id,
            tenant,
            version,
            embedding: embedding.clone(),
            payload: payload.clone(),
        })?;

        {
            let mut inner = self.inner.write();
            inner.records.insert(
                id,
                VectorRecord {
                    id,
                    tenant,
                    embedding,
                    payload,
                    version,
                    deleted: false,
                },
            );
            inner.log.insert(version, LogOp::Insert(id));
            inner.next_version = version + 1;
            inner.next_id = id.0 + 1;
        }
        self.live.add(id);

        debug!(%id, version, "record inserted");
        Ok((id, version))
    }

    /// Tombstone a record. Idempotent: a repeated delete is a no-op and
    /// returns `false` without touching the log.
    pub fn delete(&self, id: VectorId) -> Result<bool> {
        let mut wal = self.wal.lock();
        let version = {
            let inner = self.inner.read();
            match inner.records.get(&id) {
                Some(rec) if !rec.deleted => inner.next_version,
                _ => return Ok(false),
            }
        };

        wal.append(&WalEntry::Tombstone { id, version })?;

        {
            let mut inner = self.inner.write();
            if let Some(rec) = inner.records.get_mut(&id) {
                rec.deleted = true;
            }
            inner.log.insert(version, LogOp::Tombstone(id));
            inner.next_version = version + 1;
        }
        self.live.remove(id);

        debug!(%id, version, "record tombstoned");
        Ok(true)
    }

    /// Fetch the latest state of a record.
    pub fn get(&self, id: VectorId) -> Option<VectorRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Snapshot of the live ids, safe to hold for a whole query.
    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.live.snapshot()
    }

    /// All live records, cloned. Used by full rebuilds.
    pub fn live_records(&self) -> Vec<VectorRecord> {
        let inner = self.inner.read();
        inner
            .records
            .values()
            .filter(|r| !r.deleted)
            .cloned()
            .collect()
    }

    /// Cursor over every entry with version strictly greater than `since`,
    /// in version order. Tombstones surface as records with `deleted: true`
    /// so builders can both add and mask.
    pub fn scan_since(self: &Arc<Self>, since: Version) -> ScanCursor {
        ScanCursor {
            store: Arc::clone(self),
            position: since,
        }
    }

    pub fn last_version(&self) -> Version {
        self.inner.read().next_version.saturating_sub(1)
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let tombstones = inner.records.values().filter(|r| r.deleted).count();
        StoreStats {
            total_records: inner.records.len(),
            live_records: inner.records.len() - tombstones,
            tombstones,
            last_version: inner.next_version.saturating_sub(1),
        }
    }

    fn batch_after(&self, position: Version, limit: usize) -> Vec<ScanItem> {
        let inner = self.inner.read();
        inner
            .log
            .range(position + 1..)
            .take(limit)
            .filter_map(|(&version, op)| {
                let id = match op {
                    LogOp::Insert(id) | LogOp::Tombstone(id) => *id,
                };
                inner.records.get(&id).map(|rec| {
                    let mut record = rec.clone();
                    // An insert entry reflects the record as inserted; the
                    // tombstone entry is where the mask appears.
                    record.deleted = matches!(op, LogOp::Tombstone(_));
                    record.version = version;
                    ScanItem { version, record }
                })
            })
            .collect()
    }
}

/// Restartable cursor over the store's version order.
///
/// The cursor is finite: it ends at the last version that existed when the
/// batch was taken, and `position()` can seed a new cursor later.
pub struct ScanCursor {
    store: Arc<VectorStore>,
    position: Version,
}

impl ScanCursor {
    /// Pull up to `limit` entries after the current position, advancing it.
    pub fn next_batch(&mut self, limit: usize) -> Vec<ScanItem> {
        let batch = self.store.batch_after(self.position, limit);
        if let Some(last) = batch.last() {
            self.position = last.version;
        }
        batch
    }

    /// Current position; feed back into `scan_since` to restart.
    pub fn position(&self) -> Version {
        self.position
    }
}

impl Iterator for ScanCursor {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        self.next_batch(1).pop()
    }
}
