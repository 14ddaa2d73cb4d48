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

use snafu::Snafu;

use crate::codec::CodecError;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The filesystem medium could not be opened, read, or written.
    #[snafu(display("storage unavailable: {}", path.display()))]
    Io {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The SQLite medium could not be opened or queried.
    #[snafu(display("storage unavailable: {}", path.display()))]
    Database {
        path:   PathBuf,
        source: sqlx::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// The key-value store could not be opened or written.
    #[snafu(display("storage unavailable: {}", path.display()))]
    Kv {
        path:   PathBuf,
        source: redb::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Durable bytes exist but do not parse as an item sequence.
    ///
    /// Fatal when opening a queue. Callers that accept data loss may
    /// delete the durable location and open a fresh queue.
    #[snafu(display("queue data is corrupt: {reason}: {}", path.display()))]
    Corrupt {
        path:   PathBuf,
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// An item could not be encoded or decoded by the configured codec.
    #[snafu(display("item codec failed"))]
    Codec {
        source: CodecError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// A blocking storage task did not run to completion.
    #[snafu(display("background storage task failed"))]
    Join {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// `task_done` was called without a matching item having been put.
    #[snafu(display("task_done() called more times than items were enqueued"))]
    UnbalancedTaskDone {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}
