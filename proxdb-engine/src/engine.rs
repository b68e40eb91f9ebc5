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

//! The engine facade.
//!
//! Holds every collection, runs one background maintenance thread across
//! them, and exposes the operations an external front end maps onto its
//! wire protocol: insert, delete, search, administrative rebuild, stats.
//! Queries run on caller threads; only maintenance and rebuilds run on the
//! background worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use proxdb_core::{
    CollectionConfig, EngineError, ManagerConfig, Payload, Result, TenantId, VectorId,
};
use proxdb_query::{LexicalProvider, Reranker};
use proxdb_store::VectorStore;

use crate::api::{CollectionStats, InsertAck, SearchRequest, SearchResponse};
use crate::collection::{Collaborators, Collection};
use crate::manager::IndexManager;

pub struct Engine {
    base_dir: PathBuf,
    manager_config: ManagerConfig,
    collections: Arc<DashMap<String, Arc<Collection>>>,
    collaborators: RwLock<Collaborators>,
    shutdown: Sender<()>,
    maintenance: Option<JoinHandle<()>>,
}

impl Engine {
    /// Open an engine rooted at `base_dir`. Each collection stores its
    /// record log under `<base_dir>/<collection>/`.
    pub fn open(base_dir: impl Into<PathBuf>, manager_config: ManagerConfig) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;

        let collections: Arc<DashMap<String, Arc<Collection>>> = Arc::new(DashMap::new());
        let (shutdown, shutdown_rx) = bounded::<()>(1);

        let interval = manager_config.maintain_interval;
        let worker_collections = Arc::clone(&collections);
        let maintenance = std::thread::Builder::new()
            .name("proxdb-maintenance".into())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                }
                for entry in worker_collections.iter() {
                    if let Err(err) = entry.value().maintain() {
                        // Absorbed: failures surface to queries only as
                        // staleness metadata.
                        warn!(collection = %entry.key(), error = %err, "maintenance pass failed");
                    }
                }
            })?;

        Ok(Self {
            base_dir,
            manager_config,
            collections,
            collaborators: RwLock::new(Collaborators::default()),
            shutdown,
            maintenance: Some(maintenance),
        })
    }

    /// Register the external lexical collaborator. Applies to collections
    /// created afterwards.
    pub fn set_lexical_provider(&self, provider: Arc<dyn LexicalProvider>) {
        self.collaborators.write().lexical = Some(provider);
    }

    /// Register the external re-ranking collaborator. Applies to
    /// collections created afterwards.
    pub fn set_reranker(&self, reranker: Arc<dyn Reranker>) {
        self.collaborators.write().reranker = Some(reranker);
    }

    pub fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<Arc<Collection>> {
        config.validate()?;
        if self.collections.contains_key(name) {
            return Err(EngineError::InvalidConfig(format!(
                "collection '{name}' already exists"
            )));
        }

        let store = Arc::new(VectorStore::open(
            self.base_dir.join(name),
            config.dimension,
        )?);
        let manager = Arc::new(IndexManager::new(
            Arc::clone(&store),
            config.clone(),
            self.manager_config.clone(),
        ));
        let collection = Collection::new(
            name.to_string(),
            config,
            store,
            manager,
            self.collaborators.read().clone(),
        );

        self.collections.insert(name.to_string(), Arc::clone(&collection));
        info!(collection = name, "collection created");
        Ok(collection)
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| EngineError::UnknownCollection(name.to_string()))
    }

    pub fn insert(
        &self,
        collection: &str,
        tenant: TenantId,
        embedding: Vec<f32>,
        payload: Payload,
    ) -> Result<InsertAck> {
        self.collection(collection)?.insert(tenant, embedding, payload)
    }

    pub fn insert_batch(
        &self,
        collection: &str,
        tenant: TenantId,
        batch: Vec<(Vec<f32>, Payload)>,
    ) -> Result<Vec<InsertAck>> {
        let collection = self.collection(collection)?;
        batch
            .into_iter()
            .map(|(embedding, payload)| collection.insert(tenant, embedding, payload))
            .collect()
    }

    pub fn delete(&self, collection: &str, id: VectorId) -> Result<bool> {
        self.collection(collection)?.delete(id)
    }

    pub fn search(&self, collection: &str, request: &SearchRequest) -> Result<SearchResponse> {
        self.collection(collection)?.search(request)
    }

    /// Administrative immediate rebuild. Normal rebuilds are automatic.
    pub fn trigger_rebuild(&self, collection: &str) -> Result<proxdb_core::Generation> {
        self.collection(collection)?.rebuild()
    }

    /// Run one maintenance pass for a collection on the caller's thread.
    /// The background worker does this continuously; tests and embedders
    /// that disabled it call this directly.
    pub fn maintain(&self, collection: &str) -> Result<bool> {
        self.collection(collection)?.maintain()
    }

    pub fn stats(&self, collection: &str) -> Result<CollectionStats> {
        Ok(self.collection(collection)?.stats())
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.iter().map(|e| e.key().clone()).collect()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.maintenance.take() {
            let _ = handle.join();
        }
    }
}

/// Convenience for embedders that poll maintenance themselves: a very
/// long interval effectively parks the background worker.
pub fn manual_maintenance_config() -> ManagerConfig {
    ManagerConfig {
        maintain_interval: Duration::from_secs(3600),
        ..ManagerConfig::default()
    }
}
