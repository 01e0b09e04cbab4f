// SPDX-FileCopyrightText: 2026 Banana Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key serial execution.
//!
//! Jobs for the same key run one at a time in submission order; different
//! keys run concurrently. A key owns a worker task only while it has queued
//! work, and the worker removes itself once its queue is empty.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

/// Serializes jobs per key.
pub struct KeyedQueue<K> {
    workers: Arc<Mutex<HashMap<K, mpsc::UnboundedSender<Job>>>>,
    tracker: TaskTracker,
}

impl<K> Clone for KeyedQueue<K> {
    fn clone(&self) -> Self {
        Self {
            workers: Arc::clone(&self.workers),
            tracker: self.tracker.clone(),
        }
    }
}

impl<K> Default for KeyedQueue<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedQueue<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
        }
    }

    /// Queues `job` behind any pending work for `key`.
    pub fn push(&self, key: K, job: Job) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let job = match workers.get(&key) {
            Some(tx) => match tx.send(job) {
                Ok(()) => return,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh channel's receiver is alive, so this send cannot fail.
        let _ = tx.send(job);
        workers.insert(key.clone(), tx);
        debug!(key = %key, "worker started");
        self.tracker
            .spawn(run_worker(key, rx, Arc::clone(&self.workers)));
    }

    /// Number of keys with queued or running work.
    pub fn busy_keys(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stops accepting workers and waits up to `timeout` for running ones.
    pub async fn drain(&self, timeout: Duration) {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "queue drain timed out"
            );
        }
    }
}

async fn run_worker<K>(
    key: K,
    mut rx: mpsc::UnboundedReceiver<Job>,
    workers: Arc<Mutex<HashMap<K, mpsc::UnboundedSender<Job>>>>,
) where
    K: Eq + Hash + fmt::Display,
{
    loop {
        let job = match rx.try_recv() {
            Ok(job) => job,
            Err(_) => {
                // Re-check under the map lock so a concurrent push either
                // lands in this queue or sees the entry gone.
                let mut map = workers.lock().unwrap_or_else(PoisonError::into_inner);
                match rx.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        map.remove(&key);
                        debug!(key = %key, "worker idle, removed");
                        return;
                    }
                }
            }
        };
        job.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn same_key_runs_in_order() {
        let queue = KeyedQueue::new();
        let log = Arc::new(AsyncMutex::new(Vec::new()));
        for i in 0..5u64 {
            let log = log.clone();
            queue.push(
                "k".to_string(),
                async move {
                    // Earlier jobs sleep longer; order must still hold.
                    tokio::time::sleep(Duration::from_millis(20 - i * 4)).await;
                    log.lock().await.push(i);
                }
                .boxed(),
            );
        }
        queue.drain(Duration::from_secs(5)).await;
        assert_eq!(*log.lock().await, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.busy_keys(), 0);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let queue = KeyedQueue::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let done = Arc::new(AsyncMutex::new(false));

        queue.push(
            "a".to_string(),
            async move {
                let _ = rx.await;
            }
            .boxed(),
        );
        let flag = done.clone();
        queue.push(
            "b".to_string(),
            async move {
                *flag.lock().await = true;
                let _ = tx.send(());
            }
            .boxed(),
        );
        queue.drain(Duration::from_secs(5)).await;
        assert!(*done.lock().await);
    }

    #[tokio::test]
    async fn idle_key_gets_a_new_worker() {
        let queue = KeyedQueue::new();
        let count = Arc::new(AsyncMutex::new(0));
        let c = count.clone();
        queue.push("k".to_string(), async move { *c.lock().await += 1 }.boxed());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.busy_keys(), 0);

        let c = count.clone();
        queue.push("k".to_string(), async move { *c.lock().await += 1 }.boxed());
        queue.drain(Duration::from_secs(5)).await;
        assert_eq!(*count.lock().await, 2);
    }
}
