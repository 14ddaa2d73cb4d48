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

//! Snapshot-file engine: the whole sequence encoded as one value.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    Result,
    codec::Codec,
    engine::StorageEngine,
    error::{CodecSnafu, CorruptSnafu, IoSnafu},
    file::{read_if_exists, write_atomic},
};

/// Stores the queue as a single encoded snapshot of the full sequence.
///
/// Every mutation rewrites the whole file via temp-write-then-rename, so
/// cost grows with queue length. Simple and fast at low volume.
pub struct SnapshotEngine {
    path:  PathBuf,
    codec: Codec,
}

impl SnapshotEngine {
    pub fn new(path: PathBuf, codec: Codec) -> Self {
        Self { path, codec }
    }
}

#[async_trait]
impl<T> StorageEngine<T> for SnapshotEngine
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load(&self) -> Result<Vec<T>> {
        let Some(bytes) = read_if_exists(&self.path)
            .await
            .context(IoSnafu { path: &self.path })?
        else {
            return Ok(Vec::new());
        };

        match self.codec.decode_seq(&bytes) {
            Ok(items) => Ok(items),
            Err(err) => CorruptSnafu {
                path:   &self.path,
                reason: err.to_string(),
            }
            .fail(),
        }
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        let bytes = self.codec.encode_seq(items).context(CodecSnafu)?;
        write_atomic(&self.path, &bytes)
            .await
            .context(IoSnafu { path: &self.path })?;
        debug!(len = items.len(), path = ?self.path, "wrote queue snapshot");
        Ok(())
    }
}
