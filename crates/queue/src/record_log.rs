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

#![allow(clippy::cast_possible_truncation)]

//! Record-log engine: an append-friendly log of checksummed records.
//!
//! Each item is stored as one record with the following binary layout:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┬─────────────────┐
//! │  Length (4B)    │   Payload (variable) │   CRC32 (4B)    │
//! │  little-endian  │   encoded item       │   little-endian │
//! └─────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! Appending an item is an O(1) fsync'd write to the end of the log;
//! removing the head compacts the log through an atomic rewrite. On load,
//! an incomplete trailing record is a torn crash write and is discarded;
//! a checksum mismatch on a complete record is corruption and fails the
//! load.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, warn};

use crate::{
    Result,
    codec::Codec,
    crc::{calculate_record_crc, verify_record_crc},
    engine::StorageEngine,
    error::{CodecSnafu, CorruptSnafu, IoSnafu},
    file::{read_if_exists, write_atomic},
};

/// Size of the length prefix in bytes.
const RECORD_LEN_SIZE: usize = 4;

/// Size of the CRC32 suffix in bytes.
const RECORD_CRC_SIZE: usize = 4;

/// Stores the queue as a sequence of single-item records.
///
/// `put` appends one record; `get` rewrites the remaining records. The
/// inverse trade-off of [`SnapshotEngine`](crate::snapshot::SnapshotEngine).
pub struct RecordLogEngine {
    path:  PathBuf,
    codec: Codec,
}

impl RecordLogEngine {
    pub fn new(path: PathBuf, codec: Codec) -> Self {
        Self { path, codec }
    }

    fn encode_record(payload: &[u8]) -> Vec<u8> {
        let length = payload.len() as u32;
        let crc = calculate_record_crc(length, payload);

        let mut frame =
            Vec::with_capacity(RECORD_LEN_SIZE + payload.len() + RECORD_CRC_SIZE);
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame
    }

    fn encode_log<T: Serialize>(&self, items: &[T]) -> Result<Vec<u8>> {
        let mut log = Vec::new();
        for item in items {
            let payload = self.codec.encode_item(item).context(CodecSnafu)?;
            log.extend_from_slice(&Self::encode_record(&payload));
        }
        Ok(log)
    }

    /// Drop torn bytes left behind by a crashed append.
    async fn truncate_torn_tail(&self, valid_len: u64) -> Result<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .context(IoSnafu { path: &self.path })?;
        file.set_len(valid_len)
            .await
            .context(IoSnafu { path: &self.path })?;
        file.sync_all()
            .await
            .context(IoSnafu { path: &self.path })?;
        Ok(())
    }
}

#[async_trait]
impl<T> StorageEngine<T> for RecordLogEngine
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

        let mut items = Vec::new();
        let mut pos = 0usize;

        while pos < bytes.len() {
            if bytes.len() - pos < RECORD_LEN_SIZE + RECORD_CRC_SIZE {
                break;
            }

            let mut length_buf = [0u8; RECORD_LEN_SIZE];
            length_buf.copy_from_slice(&bytes[pos..pos + RECORD_LEN_SIZE]);
            let length = u32::from_le_bytes(length_buf) as usize;

            let total = RECORD_LEN_SIZE + length + RECORD_CRC_SIZE;
            if pos + total > bytes.len() {
                break;
            }

            let payload = &bytes[pos + RECORD_LEN_SIZE..pos + RECORD_LEN_SIZE + length];
            let mut crc_buf = [0u8; RECORD_CRC_SIZE];
            crc_buf.copy_from_slice(&bytes[pos + total - RECORD_CRC_SIZE..pos + total]);
            let stored_crc = u32::from_le_bytes(crc_buf);

            if !verify_record_crc(length as u32, payload, stored_crc) {
                return CorruptSnafu {
                    path:   &self.path,
                    reason: format!("record crc mismatch at offset {pos}"),
                }
                .fail();
            }

            items.push(self.codec.decode_item(payload).context(CodecSnafu)?);
            pos += total;
        }

        if pos < bytes.len() {
            warn!(
                offset = pos,
                file_len = bytes.len(),
                path = ?self.path,
                "discarding torn record at end of log"
            );
            self.truncate_torn_tail(pos as u64).await?;
        }

        Ok(items)
    }

    async fn save(&self, items: &[T]) -> Result<()> {
        let log = self.encode_log(items)?;
        write_atomic(&self.path, &log)
            .await
            .context(IoSnafu { path: &self.path })?;
        debug!(len = items.len(), path = ?self.path, "rewrote record log");
        Ok(())
    }

    async fn append(&self, item: &T, _items: &[T]) -> Result<()> {
        let payload = self.codec.encode_item(item).context(CodecSnafu)?;
        let frame = Self::encode_record(&payload);

        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .await
            .context(IoSnafu { path: &self.path })?;
        let start_len = file
            .metadata()
            .await
            .context(IoSnafu { path: &self.path })?
            .len();

        let write = async {
            file.write_all(&frame).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(err) = write {
            // Partial frames at the tail would orphan later appends, so
            // roll the file back before surfacing the failure.
            if let Err(truncate_err) = file.set_len(start_len).await {
                warn!(
                    error = %truncate_err,
                    path = ?self.path,
                    "failed to truncate partial append"
                );
            }
            return Err(err).context(IoSnafu { path: &self.path });
        }

        debug!(bytes = frame.len(), path = ?self.path, "appended record");
        Ok(())
    }
}
