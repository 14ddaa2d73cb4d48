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

//! Relational engine: one row per item in a SQLite table, ordered by
//! rowid.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::debug;

use crate::{
    Result,
    codec::Codec,
    engine::StorageEngine,
    error::{CodecSnafu, DatabaseSnafu},
};

/// Queue storage in a SQLite table.
///
/// Insertion order is carried by rowid; every mutation is one statement
/// or one transaction.
pub struct SqliteEngine {
    pool:  SqlitePool,
    path:  PathBuf,
    codec: Codec,
}

impl SqliteEngine {
    /// Open or create the database at `path` and ensure the schema.
    pub async fn open(path: PathBuf, codec: Codec) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context(DatabaseSnafu { path: &path })?;

        sqlx::query("CREATE TABLE IF NOT EXISTS queue (item BLOB NOT NULL)")
            .execute(&pool)
            .await
            .context(DatabaseSnafu { path: &path })?;

        Ok(Self { pool, path, codec })
    }
}

#[async_trait]
impl<T> StorageEngine<T> for SqliteEngine
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Vec<T>> {
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as("SELECT item FROM queue ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        rows.iter()
            .map(|(row,)| self.codec.decode_item(row))
            .collect::<std::result::Result<Vec<T>, _>>()
            .context(CodecSnafu)
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        let payloads = items
            .iter()
            .map(|item| self.codec.encode_item(item))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context(CodecSnafu)?;

        let mut txn = self
            .pool
            .begin()
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        sqlx::query("DELETE FROM queue")
            .execute(&mut *txn)
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        for payload in payloads {
            sqlx::query("INSERT INTO queue (item) VALUES (?)")
                .bind(payload)
                .execute(&mut *txn)
                .await
                .context(DatabaseSnafu { path: &self.path })?;
        }

        txn.commit()
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        debug!(len = items.len(), path = ?self.path, "rewrote queue table");
        Ok(())
    }

    async fn append(&self, item: &T, _items: &[T]) -> Result<()> {
        let payload = self.codec.encode_item(item).context(CodecSnafu)?;

        sqlx::query("INSERT INTO queue (item) VALUES (?)")
            .bind(payload)
            .execute(&self.pool)
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        debug!(path = ?self.path, "appended row to queue table");
        Ok(())
    }

    async fn remove_head(&self, _items: &[T]) -> Result<()> {
        sqlx::query("DELETE FROM queue WHERE rowid = (SELECT MIN(rowid) FROM queue)")
            .execute(&self.pool)
            .await
            .context(DatabaseSnafu { path: &self.path })?;

        debug!(path = ?self.path, "removed head row from queue table");
        Ok(())
    }
}
