//! # Work Queue
//!
//! Deduplicating, rate-limited queue of resource keys (`namespace/name`
//! strings). Watch event handlers enqueue keys only; worker loops dequeue
//! and reconcile, re-reading current object state from the reflector cache
//! instead of trusting event payloads.
//!
//! Semantics:
//!
//! - `add` collapses repeated enqueues of a pending key into one entry.
//! - A key handed to a worker is *in flight*: enqueuing it again parks it
//!   as dirty, and `done` moves it back onto the queue. A key is therefore
//!   never processed concurrently with itself, regardless of how many
//!   notifications arrive while a worker holds it.
//! - `requeue_rate_limited` re-enqueues after a per-key exponential delay;
//!   `num_requeues` exposes the counter so callers can enforce a retry
//!   ceiling, and `forget` resets it.
//! - `shut_down` stops accepting work and unblocks workers waiting on an
//!   empty queue. Keys already in flight may still be completed.
//!
//! Purely in-memory; no cluster I/O happens here.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct Inner {
    /// Keys ready to be handed to a worker, in arrival order
    queue: VecDeque<String>,
    /// Keys enqueued but not yet picked up (pending or parked in-flight)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Per-key count of rate-limited requeues
    retries: HashMap<String, u32>,
    shut_down: bool,
}

pub struct WorkQueue {
    inner: Mutex<Inner>,
    wakeup: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

impl WorkQueue {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            wakeup: Notify::new(),
            base_delay,
            max_delay,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Queue state is plain collections; a panicked holder cannot leave
        // them torn in a way the workers can't tolerate.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a key. Idempotent while the key is pending; a key in flight
    /// is parked and re-queued when its worker calls [`WorkQueue::done`].
    pub fn add(&self, key: &str) {
        {
            let mut inner = self.lock();
            if inner.shut_down || inner.dirty.contains(key) {
                return;
            }
            inner.dirty.insert(key.to_string());
            if inner.processing.contains(key) {
                // In flight: defer until done() rather than run in parallel
                return;
            }
            inner.queue.push_back(key.to_string());
        }
        self.wakeup.notify_one();
    }

    /// Dequeue the next key, waiting until one is available. Returns `None`
    /// once the queue is shut down and drained.
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.wakeup.notified();
            {
                let mut inner = self.lock();
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shut_down {
                    drop(inner);
                    // Cascade so every parked worker observes shutdown
                    self.wakeup.notify_one();
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a dequeued key as finished. Must be called exactly once per
    /// `next`; re-queues the key if it was enqueued again while in flight.
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut inner = self.lock();
            inner.processing.remove(key);
            if inner.dirty.contains(key) && !inner.shut_down {
                inner.queue.push_back(key.to_string());
                true
            } else {
                false
            }
        };
        if requeued {
            self.wakeup.notify_one();
        }
    }

    /// Reset the retry counter for a key, on success or on give-up.
    pub fn forget(&self, key: &str) {
        self.lock().retries.remove(key);
    }

    /// Number of rate-limited requeues recorded for a key.
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().retries.get(key).copied().unwrap_or(0)
    }

    /// Re-enqueue a key after an exponentially growing per-key delay.
    pub fn requeue_rate_limited(self: &Arc<Self>, key: &str) {
        let delay = {
            let mut inner = self.lock();
            if inner.shut_down {
                return;
            }
            let retries = inner.retries.entry(key.to_string()).or_insert(0);
            *retries += 1;
            let exponent = (*retries - 1).min(31);
            self.base_delay
                .saturating_mul(1u32 << exponent)
                .min(self.max_delay)
        };
        debug!(key, delay_ms = delay.as_millis() as u64, "rate-limited requeue");
        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Stop accepting new work and wake all waiting workers.
    pub fn shut_down(&self) {
        self.lock().shut_down = true;
        self.wakeup.notify_waiters();
        self.wakeup.notify_one();
    }

    /// Number of keys pending pickup (excludes keys in flight).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shut_down
    }
}
