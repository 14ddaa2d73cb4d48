// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Storage engine abstraction.
//!
//! A [`StorageEngine`] durably persists the queue's entire ordered item
//! sequence at one durable location. The binding contract is atomicity:
//! every mutation is all-or-nothing from an external observer's
//! viewpoint, and a failed write leaves the previous durable state
//! intact. How a backend achieves that (temp-write-then-rename, engine
//! transactions, a compacted append log) is its own business.
//!
//! `append` and `remove_head` are performance hooks: the default bodies
//! rewrite the full sequence via [`save`](StorageEngine::save), and
//! append-friendly backends override them with cheaper equivalents.

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    Result,
    config::{Backend, QueueConfig},
    kv::KvEngine,
    record_log::RecordLogEngine,
    snapshot::SnapshotEngine,
    sqlite::SqliteEngine,
};

/// Atomic durable persistence of a full ordered item sequence.
#[async_trait]
pub trait StorageEngine<T: Send + Sync>: Send + Sync {
    /// Establish a parseable durable baseline at the location.
    ///
    /// Called once when a queue is opened against a location that holds
    /// no items, so that the location is always recoverable afterwards.
    async fn initialize(&self) -> Result<()> {
        self.save(&[]).await
    }

    /// Read the current durable state.
    ///
    /// A durable location that does not exist yet yields an empty
    /// sequence; the caller is responsible for establishing it. An
    /// unreadable medium fails with a storage error, unparseable bytes
    /// with [`Error::Corrupt`](crate::Error::Corrupt).
    async fn load(&self) -> Result<Vec<T>>;

    /// Atomically replace the entire durable representation.
    ///
    /// On failure the previous durable state remains intact.
    async fn save(&self, items: &[T]) -> Result<()>;

    /// Persist the append of `item`; `items` is the full sequence
    /// including it.
    async fn append(&self, _item: &T, items: &[T]) -> Result<()> {
        self.save(items).await
    }

    /// Persist the removal of the head; `items` is the remaining
    /// sequence.
    async fn remove_head(&self, items: &[T]) -> Result<()> {
        self.save(items).await
    }
}

/// Construct the configured backend for `config.path`.
pub(crate) async fn create_engine<T>(config: &QueueConfig) -> Result<Box<dyn StorageEngine<T>>>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let engine: Box<dyn StorageEngine<T>> = match config.backend {
        Backend::Kv => Box::new(KvEngine::open(config.path.clone(), config.codec).await?),
        Backend::SnapshotFile => Box::new(SnapshotEngine::new(config.path.clone(), config.codec)),
        Backend::RecordLog => Box::new(RecordLogEngine::new(config.path.clone(), config.codec)),
        Backend::Sqlite => Box::new(SqliteEngine::open(config.path.clone(), config.codec).await?),
    };
    Ok(engine)
}
