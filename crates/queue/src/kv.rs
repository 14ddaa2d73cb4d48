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

//! Key-value engine backed by an embedded redb database.
//!
//! The queue is laid out as two tables: `meta` holds the `head` and
//! `tail` item ids, `items` maps each id to one encoded item. Append and
//! remove-head touch a constant number of entries inside a single write
//! transaction, so cost does not grow with queue length. This is the
//! default backend.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use redb::{Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError};
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tokio::task;
use tracing::debug;

use crate::{
    Result,
    codec::Codec,
    engine::StorageEngine,
    error::{CodecSnafu, CorruptSnafu, JoinSnafu, KvSnafu},
};

const ITEMS: TableDefinition<u64, &[u8]> = TableDefinition::new("items");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const HEAD_KEY: &str = "head";
const TAIL_KEY: &str = "tail";

/// Outcome of the raw (undecoded) load pass.
enum RawLoad {
    Rows(Vec<Vec<u8>>),
    MissingItem(u64),
}

/// Queue storage in an embedded key-value database.
pub struct KvEngine {
    db:    Arc<Database>,
    path:  PathBuf,
    codec: Codec,
}

impl KvEngine {
    /// Open or create the database file at `path`.
    pub async fn open(path: PathBuf, codec: Codec) -> Result<Self> {
        let db_path = path.clone();
        let opened = task::spawn_blocking(move || Database::create(db_path))
            .await
            .context(JoinSnafu)?;

        let db = match opened {
            Ok(db) => db,
            Err(DatabaseError::Storage(StorageError::Corrupted(reason))) => {
                return CorruptSnafu { path, reason }.fail();
            }
            Err(err) => return Err(redb::Error::from(err)).context(KvSnafu { path }),
        };

        Ok(Self {
            db: Arc::new(db),
            path,
            codec,
        })
    }
}

#[async_trait]
impl<T> StorageEngine<T> for KvEngine
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Vec<T>> {
        let db = Arc::clone(&self.db);
        let raw = task::spawn_blocking(move || -> std::result::Result<RawLoad, redb::Error> {
            let txn = db.begin_read()?;

            let items = match txn.open_table(ITEMS) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(RawLoad::Rows(Vec::new())),
                Err(err) => return Err(err.into()),
            };
            let meta = match txn.open_table(META) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(RawLoad::Rows(Vec::new())),
                Err(err) => return Err(err.into()),
            };

            let head = meta.get(HEAD_KEY)?.map(|guard| guard.value());
            let tail = meta.get(TAIL_KEY)?.map(|guard| guard.value());
            let (Some(head), Some(tail)) = (head, tail) else {
                return Ok(RawLoad::Rows(Vec::new()));
            };

            let mut rows = Vec::with_capacity((tail - head + 1) as usize);
            for id in head..=tail {
                match items.get(id)? {
                    Some(guard) => rows.push(guard.value().to_vec()),
                    None => return Ok(RawLoad::MissingItem(id)),
                }
            }
            Ok(RawLoad::Rows(rows))
        })
        .await
        .context(JoinSnafu)?
        .context(KvSnafu { path: &self.path })?;

        let rows = match raw {
            RawLoad::Rows(rows) => rows,
            RawLoad::MissingItem(id) => {
                return CorruptSnafu {
                    path:   &self.path,
                    reason: format!("item {id} missing between head and tail pointers"),
                }
                .fail();
            }
        };

        rows.iter()
            .map(|row| self.codec.decode_item(row))
            .collect::<std::result::Result<Vec<T>, _>>()
            .context(CodecSnafu)
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        let payloads = items
            .iter()
            .map(|item| self.codec.encode_item(item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context(CodecSnafu)?;

        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> std::result::Result<(), redb::Error> {
            let txn = db.begin_write()?;
            txn.delete_table(ITEMS)?;
            txn.delete_table(META)?;
            {
                let mut items_table = txn.open_table(ITEMS)?;
                let mut meta = txn.open_table(META)?;
                for (idx, payload) in payloads.iter().enumerate() {
                    items_table.insert(idx as u64 + 1, payload.as_slice())?;
                }
                if !payloads.is_empty() {
                    meta.insert(HEAD_KEY, 1u64)?;
                    meta.insert(TAIL_KEY, payloads.len() as u64)?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
        .context(JoinSnafu)?
        .context(KvSnafu { path: &self.path })?;

        debug!(len = items.len(), path = ?self.path, "rewrote key-value queue");
        Ok(())
    }

    async fn append(&self, item: &T, _items: &[T]) -> Result<()> {
        let payload = self.codec.encode_item(item).context(CodecSnafu)?;

        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> std::result::Result<(), redb::Error> {
            let txn = db.begin_write()?;
            {
                let mut meta = txn.open_table(META)?;
                let tail = meta.get(TAIL_KEY)?.map(|guard| guard.value());
                let id = tail.map_or(1, |tail| tail + 1);

                let mut items_table = txn.open_table(ITEMS)?;
                items_table.insert(id, payload.as_slice())?;
                meta.insert(TAIL_KEY, id)?;
                if tail.is_none() {
                    meta.insert(HEAD_KEY, id)?;
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
        .context(JoinSnafu)?
        .context(KvSnafu { path: &self.path })?;

        debug!(path = ?self.path, "appended item to key-value queue");
        Ok(())
    }

    async fn remove_head(&self, _items: &[T]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let removed = task::spawn_blocking(move || -> std::result::Result<bool, redb::Error> {
            let txn = db.begin_write()?;
            {
                let mut meta = txn.open_table(META)?;
                let head = meta.get(HEAD_KEY)?.map(|guard| guard.value());
                let tail = meta.get(TAIL_KEY)?.map(|guard| guard.value());
                let (Some(head), Some(tail)) = (head, tail) else {
                    return Ok(false);
                };

                let mut items_table = txn.open_table(ITEMS)?;
                items_table.remove(head)?;
                if head < tail {
                    meta.insert(HEAD_KEY, head + 1)?;
                } else {
                    // was the last item
                    meta.remove(HEAD_KEY)?;
                    meta.remove(TAIL_KEY)?;
                }
            }
            txn.commit()?;
            Ok(true)
        })
        .await
        .context(JoinSnafu)?
        .context(KvSnafu { path: &self.path })?;

        if !removed {
            return CorruptSnafu {
                path:   &self.path,
                reason: "head/tail pointers missing for a non-empty queue".to_string(),
            }
            .fail();
        }

        debug!(path = ?self.path, "removed head from key-value queue");
        Ok(())
    }
}
