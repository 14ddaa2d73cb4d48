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

use std::path::PathBuf;

use crate::codec::Codec;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Durable location of the queue. A file path owned by the queue for
    /// its lifetime; one writer process per path.
    pub path:     PathBuf,
    /// Storage backend persisting the item sequence at `path`.
    pub backend:  Backend,
    /// Serialization format for items. Must not change for an existing
    /// durable location.
    pub codec:    Codec,
    /// Maximum number of items held at once. `0` means unbounded; a
    /// bounded queue makes `put` wait for a free slot.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path:     PathBuf::from("./queue.dat"),
            backend:  Backend::default(),
            codec:    Codec::default(),
            capacity: 0,
        }
    }
}

/// Storage backend selection.
///
/// All backends satisfy the same atomic-replace contract; they differ in
/// how much work each operation does (full rewrite vs. O(1) append) and
/// in the shape of the durable file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Embedded key-value store (redb). Head/tail pointers plus one entry
    /// per item; every operation is a single transaction. The default.
    #[default]
    Kv,
    /// The whole sequence encoded as one snapshot file, replaced via
    /// temp-write-then-rename on every operation.
    SnapshotFile,
    /// Append-friendly log of checksummed records, compacted on removal.
    RecordLog,
    /// SQLite table ordered by rowid, one row per item.
    Sqlite,
}
