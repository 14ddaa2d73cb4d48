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

//! Disk-backed, crash-tolerant async FIFO queue.
//!
//! A [`Queue`] is a drop-in persistent replacement for an in-memory
//! async queue: items survive process restarts, `get` waits while the
//! queue is empty, and every mutation is durably committed before it
//! becomes observable. Storage is pluggable via [`Backend`]; item
//! serialization via [`Codec`].
//!
//! ```ignore
//! let queue: Queue<String> = QueueBuilder::new("jobs.redb")
//!     .backend(Backend::Kv)
//!     .open()
//!     .await?;
//!
//! queue.put("first".to_string()).await?;
//! assert_eq!(queue.get().await?, "first");
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod kv;
pub mod queue;
pub mod record_log;
pub mod snapshot;
pub mod sqlite;

mod crc;
mod file;

pub use builder::QueueBuilder;
pub use codec::{Codec, CodecError};
pub use config::{Backend, QueueConfig};
pub use engine::StorageEngine;
pub use error::{Error, Result};
pub use kv::KvEngine;
pub use queue::Queue;
pub use record_log::RecordLogEngine;
pub use snapshot::SnapshotEngine;
pub use sqlite::SqliteEngine;
