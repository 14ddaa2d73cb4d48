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

//! Queue core and lifecycle management.
//!
//! The [`Queue`] owns the authoritative in-memory mirror of the durable
//! item sequence. Every mutation passes through one async mutex held
//! across the durable write, so the mirror and the disk state are
//! identical whenever no operation is in flight: a mutation either
//! commits to both or rolls the mirror back before surfacing its error.
//!
//! ## Usage
//!
//! ```ignore
//! // Open or create a queue at a durable location
//! let queue: Queue<String> = QueueBuilder::new("/path/to/queue.redb")
//!     .open()
//!     .await?;
//!
//! // Producer side
//! queue.put("job".to_string()).await?;
//!
//! // Consumer side; waits while the queue is empty
//! let job = queue.get().await?;
//! queue.task_done()?;
//! ```

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use serde::{Serialize, de::DeserializeOwned};
use snafu::OptionExt;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

use crate::{
    Result,
    config::QueueConfig,
    engine::{StorageEngine, create_engine},
    error::UnbalancedTaskDoneSnafu,
};

/// A disk-backed, crash-tolerant async FIFO queue.
///
/// Items put into the queue survive process restarts: every mutation is
/// durably committed before it becomes observable. The queue is shared by
/// reference (`Arc<Queue<T>>`) between any number of producer and
/// consumer tasks within one process; one writer process per durable
/// location.
pub struct Queue<T>
where
    T: Send + Sync,
{
    config:     QueueConfig,
    engine:     Box<dyn StorageEngine<T>>,
    /// In-memory mirror of the durable item sequence. The single
    /// critical section for all mutations.
    items:      Mutex<VecDeque<T>>,
    /// Advisory length snapshot, maintained inside the critical section.
    len:        AtomicUsize,
    /// High-water mark of the queue length.
    peak:       AtomicUsize,
    /// Items put but not yet acknowledged via [`task_done`](Self::task_done).
    unfinished: AtomicUsize,
    item_added: Notify,
    slot_freed: Notify,
    all_done:   Notify,
}

impl<T> Queue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open the queue described by `config`.
    ///
    /// Existing durable contents become the initial queue; a fresh
    /// location gets an empty, parseable baseline persisted immediately.
    ///
    /// # Errors
    ///
    /// Fails if the durable location cannot be opened, read, or
    /// established, or if existing bytes do not parse as an item
    /// sequence.
    pub async fn open(config: QueueConfig) -> Result<Self> {
        let engine = create_engine(&config).await?;
        Self::open_with_engine(config, engine).await
    }

    /// Open the queue with a caller-provided storage engine.
    ///
    /// The `backend` field of `config` is ignored; everything else
    /// applies. This is the seam for plugging in custom backends.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`open`](Self::open).
    pub async fn open_with_engine(
        config: QueueConfig,
        engine: Box<dyn StorageEngine<T>>,
    ) -> Result<Self> {
        let restored = engine.load().await?;
        if restored.is_empty() {
            // Establish the baseline right away so the location is
            // always recoverable, even before the first put.
            engine.initialize().await?;
            debug!(path = ?config.path, "initialized empty queue");
        } else {
            info!(
                path = ?config.path,
                count = restored.len(),
                "restored queue from existing data"
            );
        }

        let len = restored.len();
        Ok(Self {
            config,
            engine,
            items: Mutex::new(restored.into()),
            len: AtomicUsize::new(len),
            peak: AtomicUsize::new(len),
            unfinished: AtomicUsize::new(0),
            item_added: Notify::new(),
            slot_freed: Notify::new(),
            all_done: Notify::new(),
        })
    }

    /// Put an item into the queue.
    ///
    /// The item is durably committed before this returns. On a bounded
    /// queue this waits until a slot is free.
    ///
    /// # Errors
    ///
    /// Fails if the item cannot be encoded or the durable write fails;
    /// in both cases the queue (in memory and on disk) is left exactly
    /// as it was.
    pub async fn put(&self, item: T) -> Result<()> {
        loop {
            let slot = self.slot_freed.notified();
            {
                let mut items = self.items.lock().await;
                if self.config.capacity == 0 || items.len() < self.config.capacity {
                    items.push_back(item);
                    let sequence: &[T] = items.make_contiguous();
                    match self.engine.append(&sequence[sequence.len() - 1], sequence).await {
                        Ok(()) => {
                            self.len.store(items.len(), Ordering::Relaxed);
                            self.peak.fetch_max(items.len(), Ordering::Relaxed);
                            self.unfinished.fetch_add(1, Ordering::SeqCst);
                            drop(items);
                            self.item_added.notify_waiters();
                            return Ok(());
                        }
                        Err(err) => {
                            // The mirror must never advance past what is
                            // durable.
                            items.pop_back();
                            return Err(err);
                        }
                    }
                }
            }
            slot.await;
        }
    }

    /// Remove and return the head item, waiting while the queue is
    /// empty.
    ///
    /// All waiters are woken on each put and re-check the queue; exactly
    /// one consumes each item. Cancelling a waiting `get` (dropping the
    /// future) leaves the queue untouched.
    ///
    /// # Errors
    ///
    /// Fails if the durable write recording the removal fails; the item
    /// is restored to the head and remains owned by the queue.
    pub async fn get(&self) -> Result<T> {
        loop {
            let available = self.item_added.notified();
            if let Some(item) = self.take_head().await? {
                return Ok(item);
            }
            available.await;
        }
    }

    /// Remove and return the head item if one is immediately available.
    ///
    /// Returns `Ok(None)` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get`](Self::get).
    pub async fn try_get(&self) -> Result<Option<T>> {
        self.take_head().await
    }

    async fn take_head(&self) -> Result<Option<T>> {
        let mut items = self.items.lock().await;
        let Some(item) = items.pop_front() else {
            return Ok(None);
        };

        let remaining = items.make_contiguous();
        match self.engine.remove_head(remaining).await {
            Ok(()) => {
                self.len.store(items.len(), Ordering::Relaxed);
                drop(items);
                self.slot_freed.notify_waiters();
                Ok(Some(item))
            }
            Err(err) => {
                // Removal is not observable unless durably committed.
                items.push_front(item);
                Err(err)
            }
        }
    }

    /// Block until every item that was put has been marked done.
    ///
    /// The unfinished count goes up on every successful put and down on
    /// every [`task_done`](Self::task_done); `join` resumes when it
    /// reaches zero.
    pub async fn join(&self) {
        loop {
            let done = self.all_done.notified();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            done.await;
        }
    }

    /// Indicate that a formerly fetched item has been fully processed.
    ///
    /// # Errors
    ///
    /// Fails if called more times than items were put.
    pub fn task_done(&self) -> Result<()> {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            })
            .ok()
            .context(UnbalancedTaskDoneSnafu)?;
        if previous == 1 {
            self.all_done.notify_waiters();
        }
        Ok(())
    }

    /// Current number of items. Advisory: may be stale immediately in
    /// the presence of concurrent mutators.
    #[must_use]
    pub fn len(&self) -> usize { self.len.load(Ordering::Relaxed) }

    /// Whether the queue currently holds no items. Advisory, like
    /// [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Whether the queue currently holds `capacity` items. Always false
    /// for an unbounded queue. Advisory, like [`len`](Self::len).
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.config.capacity != 0 && self.len() >= self.config.capacity
    }

    /// Maximum number of items, `0` meaning unbounded.
    #[must_use]
    pub fn capacity(&self) -> usize { self.config.capacity }

    /// Highest number of items the queue has held since it was opened.
    #[must_use]
    pub fn peak_len(&self) -> usize { self.peak.load(Ordering::Relaxed) }

    /// Get the queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }
}
