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

//! Append-only record log.
//!
//! File layout:
//!
//! ```text
//! [header: magic "PXRL" | format version u32]
//! [frame]*
//!
//! frame := [body_len: u32][xxh3(body): u64][body: bincode(WalEntry)]
//! ```
//!
//! A truncated final frame is treated as an unacknowledged write and
//! discarded during replay. A checksum mismatch inside the readable region
//! is corruption and fails the open.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use proxdb_core::{EngineError, Payload, Result, TenantId, VectorId, Version};

const MAGIC: [u8; 4] = *b"PXRL";
const FORMAT_VERSION: u32 = 1;

/// A single durable log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalEntry {
    Insert {
        id: VectorId,
        tenant: TenantId,
        version: Version,
        embedding: Vec<f32>,
        payload: Payload,
    },
    Tombstone {
        id: VectorId,
        version: Version,
    },
}

impl WalEntry {
    pub fn version(&self) -> Version {
        match self {
            WalEntry::Insert { version, .. } | WalEntry::Tombstone { version, .. } => *version,
        }
    }
}

/// Writer handle over the collection's record log.
pub struct RecordLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RecordLog {
    /// Open the log for appending, creating it (with a header) if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let fresh = !path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);

        if fresh {
            writer.write_all(&MAGIC)?;
            writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }

        Ok(Self { path, writer })
    }

    /// Append one entry and flush it to disk before returning.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        let body = bincode::serialize(entry)?;
        let checksum = twox_hash::xxh3::hash64(&body);

        self.writer.write_u32::<LittleEndian>(body.len() as u32)?;
        self.writer.write_u64::<LittleEndian>(checksum)?;
        self.writer.write_all(&body)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Replay every durable entry, in append order.
    ///
    /// Stops silently at a truncated tail; returns `Corruption` on a
    /// checksum mismatch inside the readable region.
    pub fn replay(path: impl AsRef<Path>) -> Result<Vec<WalEntry>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| {
            EngineError::Corruption(format!("record log {} shorter than header", path.display()))
        })?;
        if magic != MAGIC {
            return Err(EngineError::Corruption(format!(
                "record log {} has invalid magic bytes",
                path.display()
            )));
        }
        let format = reader.read_u32::<LittleEndian>().map_err(|_| {
            EngineError::Corruption(format!("record log {} shorter than header", path.display()))
        })?;
        if format != FORMAT_VERSION {
            return Err(EngineError::Corruption(format!(
                "record log format {} unsupported (expected {})",
                format, FORMAT_VERSION
            )));
        }

        let mut entries = Vec::new();
        loop {
            let body_len = match reader.read_u32::<LittleEndian>() {
                Ok(len) => len as usize,
                Err(_) => break, // truncated tail
            };
            let expected = match reader.read_u64::<LittleEndian>() {
                Ok(sum) => sum,
                Err(_) => break,
            };
            let mut body = vec![0u8; body_len];
            if reader.read_exact(&mut body).is_err() {
                break;
            }
            let actual = twox_hash::xxh3::hash64(&body);
            if actual != expected {
                return Err(EngineError::Corruption(format!(
                    "record log {} checksum mismatch at entry {}",
                    path.display(),
                    entries.len()
                )));
            }
            entries.push(bincode::deserialize(&body)?);
        }

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
