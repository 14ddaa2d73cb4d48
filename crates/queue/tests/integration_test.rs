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

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use diskqueue::{
    Backend, Queue, QueueBuilder, QueueConfig, Result, SnapshotEngine, StorageEngine,
    error::IoSnafu,
};
use snafu::ResultExt;
use tempfile::TempDir;
use test_case::test_case;
use tokio::time::{sleep, timeout};

fn queue_path(temp_dir: &TempDir, backend: Backend) -> std::path::PathBuf {
    let name = match backend {
        Backend::Kv => "queue.redb",
        Backend::SnapshotFile => "queue.dat",
        Backend::RecordLog => "queue.log",
        Backend::Sqlite => "queue.sqlite",
    };
    temp_dir.path().join(name)
}

async fn open_queue(temp_dir: &TempDir, backend: Backend) -> Queue<String> {
    QueueBuilder::new(queue_path(temp_dir, backend))
        .backend(backend)
        .open()
        .await
        .unwrap()
}

#[test_case(Backend::Kv ; "kv")]
#[test_case(Backend::SnapshotFile ; "snapshot file")]
#[test_case(Backend::RecordLog ; "record log")]
#[test_case(Backend::Sqlite ; "sqlite")]
#[tokio::test]
async fn test_fifo_order(backend: Backend) {
    let temp_dir = TempDir::new().unwrap();
    let queue = open_queue(&temp_dir, backend).await;

    for i in 0..10 {
        queue.put(format!("msg-{i}")).await.unwrap();
    }

    for i in 0..10 {
        assert_eq!(queue.get().await.unwrap(), format!("msg-{i}"));
    }
    assert!(queue.is_empty());
}

#[test_case(Backend::Kv ; "kv")]
#[test_case(Backend::SnapshotFile ; "snapshot file")]
#[test_case(Backend::RecordLog ; "record log")]
#[test_case(Backend::Sqlite ; "sqlite")]
#[tokio::test]
async fn test_durability_across_reopen(backend: Backend) {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open_queue(&temp_dir, backend).await;
        queue.put("persisted".to_string()).await.unwrap();
        queue.put("also persisted".to_string()).await.unwrap();
    }

    let queue = open_queue(&temp_dir, backend).await;
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.get().await.unwrap(), "persisted");
    assert_eq!(queue.get().await.unwrap(), "also persisted");
}

#[test_case(Backend::Kv ; "kv")]
#[test_case(Backend::SnapshotFile ; "snapshot file")]
#[test_case(Backend::RecordLog ; "record log")]
#[test_case(Backend::Sqlite ; "sqlite")]
#[tokio::test]
async fn test_fresh_to_reopened_lifecycle(backend: Backend) {
    let temp_dir = TempDir::new().unwrap();

    let queue = open_queue(&temp_dir, backend).await;
    assert!(queue.is_empty());

    queue.put("x".to_string()).await.unwrap();
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.get().await.unwrap(), "x");
    assert_eq!(queue.len(), 0);
    drop(queue);

    let queue = open_queue(&temp_dir, backend).await;
    assert_eq!(queue.len(), 0);
}

#[tokio::test]
async fn test_initialization_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = open_queue(&temp_dir, Backend::SnapshotFile).await;
        for item in ["a", "b", "c"] {
            queue.put(item.to_string()).await.unwrap();
        }
    }

    let first = open_queue(&temp_dir, Backend::SnapshotFile).await;
    let second = open_queue(&temp_dir, Backend::SnapshotFile).await;
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);

    assert_eq!(first.get().await.unwrap(), "a");
    assert_eq!(first.get().await.unwrap(), "b");
    assert_eq!(first.get().await.unwrap(), "c");
}

#[tokio::test]
async fn test_get_waits_for_put() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_queue(&temp_dir, Backend::Kv).await);

    let consumer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.get().await.unwrap() }
    });

    sleep(Duration::from_millis(100)).await;
    assert!(!consumer.is_finished());

    queue.put("wakes the consumer".to_string()).await.unwrap();

    let received = timeout(Duration::from_secs(1), consumer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, "wakes the consumer");
}

#[tokio::test]
async fn test_one_put_wakes_exactly_one_getter() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_queue(&temp_dir, Backend::SnapshotFile).await);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            tokio::spawn({
                let queue = Arc::clone(&queue);
                async move { queue.get().await.unwrap() }
            })
        })
        .collect();

    sleep(Duration::from_millis(100)).await;
    queue.put("single item".to_string()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let finished = waiters.iter().filter(|w| w.is_finished()).count();
    assert_eq!(finished, 1);

    // The remaining waiters are still live and each consumes one of the
    // follow-up items.
    queue.put("second".to_string()).await.unwrap();
    queue.put("third".to_string()).await.unwrap();
    for waiter in waiters {
        timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_cancelled_get_leaves_queue_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_queue(&temp_dir, Backend::Kv).await);

    let waiter = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.get().await.unwrap() }
    });
    sleep(Duration::from_millis(50)).await;
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    queue.put("survivor".to_string()).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.try_get().await.unwrap().unwrap(), "survivor");
}

#[tokio::test]
async fn test_try_get_on_empty_queue() {
    let temp_dir = TempDir::new().unwrap();
    let queue = open_queue(&temp_dir, Backend::Kv).await;
    assert!(queue.try_get().await.unwrap().is_none());
}

#[tokio::test]
async fn test_bounded_put_waits_for_free_slot() {
    let temp_dir = TempDir::new().unwrap();
    let queue: Arc<Queue<String>> = Arc::new(
        QueueBuilder::new(queue_path(&temp_dir, Backend::SnapshotFile))
            .backend(Backend::SnapshotFile)
            .capacity(1)
            .open()
            .await
            .unwrap(),
    );

    queue.put("occupies the slot".to_string()).await.unwrap();
    assert!(queue.is_full());

    let producer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.put("waits for a slot".to_string()).await.unwrap() }
    });

    sleep(Duration::from_millis(100)).await;
    assert!(!producer.is_finished());

    assert_eq!(queue.get().await.unwrap(), "occupies the slot");
    timeout(Duration::from_secs(1), producer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queue.get().await.unwrap(), "waits for a slot");
}

#[tokio::test]
async fn test_join_waits_for_task_done() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_queue(&temp_dir, Backend::Kv).await);

    queue.put("work".to_string()).await.unwrap();
    queue.get().await.unwrap();

    let joiner = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.join().await }
    });
    sleep(Duration::from_millis(50)).await;
    assert!(!joiner.is_finished());

    queue.task_done().unwrap();
    timeout(Duration::from_secs(1), joiner)
        .await
        .unwrap()
        .unwrap();

    // The ledger is balanced again; another task_done has nothing to
    // acknowledge.
    assert!(queue.task_done().is_err());
}

// ============================================================================
// Atomicity under injected storage failure
// ============================================================================

/// Wraps a real engine and fails every durable write while the switch is
/// on. `load` keeps working so the queue can be opened normally.
struct FailingEngine {
    inner: SnapshotEngine,
    fail:  Arc<AtomicBool>,
}

#[async_trait]
impl StorageEngine<String> for FailingEngine {
    async fn load(&self) -> Result<Vec<String>> {
        self.inner.load().await
    }

    async fn save(&self, items: &[String]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("injected write failure"))
                .context(IoSnafu { path: "injected" });
        }
        self.inner.save(items).await
    }
}

async fn open_failing_queue(temp_dir: &TempDir) -> (Queue<String>, Arc<AtomicBool>) {
    let path = temp_dir.path().join("queue.dat");
    let fail = Arc::new(AtomicBool::new(false));
    let engine = FailingEngine {
        inner: SnapshotEngine::new(path.clone(), diskqueue::Codec::Bincode),
        fail:  Arc::clone(&fail),
    };
    let config = QueueConfig {
        path,
        ..Default::default()
    };
    let queue = Queue::open_with_engine(config, Box::new(engine))
        .await
        .unwrap();
    (queue, fail)
}

#[tokio::test]
async fn test_failed_put_rolls_back() {
    let temp_dir = TempDir::new().unwrap();
    let (queue, fail) = open_failing_queue(&temp_dir).await;

    queue.put("durable".to_string()).await.unwrap();

    fail.store(true, Ordering::SeqCst);
    assert!(queue.put("never committed".to_string()).await.is_err());
    assert_eq!(queue.len(), 1);

    fail.store(false, Ordering::SeqCst);
    assert_eq!(queue.get().await.unwrap(), "durable");
    // The failed item is gone for good.
    assert!(queue.try_get().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_get_restores_head() {
    let temp_dir = TempDir::new().unwrap();
    let (queue, fail) = open_failing_queue(&temp_dir).await;

    queue.put("first".to_string()).await.unwrap();
    queue.put("second".to_string()).await.unwrap();

    fail.store(true, Ordering::SeqCst);
    assert!(queue.get().await.is_err());
    assert_eq!(queue.len(), 2);

    fail.store(false, Ordering::SeqCst);
    assert_eq!(queue.get().await.unwrap(), "first");
    assert_eq!(queue.get().await.unwrap(), "second");
}

#[tokio::test]
async fn test_concurrent_producers_and_consumers() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(open_queue(&temp_dir, Backend::Kv).await);

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            tokio::spawn({
                let queue = Arc::clone(&queue);
                async move {
                    let mut received = Vec::new();
                    for _ in 0..5 {
                        received.push(queue.get().await.unwrap());
                        queue.task_done().unwrap();
                    }
                    received
                }
            })
        })
        .collect();

    let producers: Vec<_> = (0..2)
        .map(|p| {
            tokio::spawn({
                let queue = Arc::clone(&queue);
                async move {
                    for i in 0..10 {
                        queue.put(format!("p{p}-{i}")).await.unwrap();
                    }
                }
            })
        })
        .collect();

    for producer in producers {
        timeout(Duration::from_secs(10), producer)
            .await
            .unwrap()
            .unwrap();
    }

    let mut all: Vec<String> = Vec::new();
    for consumer in consumers {
        all.extend(timeout(Duration::from_secs(10), consumer).await.unwrap().unwrap());
    }

    // Every produced item is consumed exactly once.
    all.sort();
    let mut expected: Vec<String> = (0..2)
        .flat_map(|p| (0..10).map(move |i| format!("p{p}-{i}")))
        .collect();
    expected.sort();
    assert_eq!(all, expected);

    timeout(Duration::from_secs(1), queue.join())
        .await
        .unwrap();
    assert!(queue.is_empty());
}
