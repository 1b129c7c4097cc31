// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Pending device writes.
//!
//! The queue is last-write-wins per tag: a new write for a tag that
//! already has one pending replaces the value in place, so a burst of
//! client writes to the same setpoint reaches the wire as exactly one
//! operation carrying the newest value. Order across distinct tags is
//! FIFO by first submission.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use modua_core::types::{DeviceId, TagId, WriteRequest};

#[derive(Debug, Default)]
struct QueueInner {
    /// Newest pending request per tag.
    pending: HashMap<TagId, WriteRequest>,

    /// FIFO of tags by first submission.
    order: VecDeque<TagId>,
}

/// Counters for queue activity, updated atomically.
#[derive(Debug, Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    replaced: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Requests submitted.
    pub enqueued: u64,

    /// Requests superseded by a newer write to the same tag.
    pub replaced: u64,

    /// Requests that reached the wire successfully.
    pub executed: u64,

    /// Requests that failed on the wire.
    pub failed: u64,
}

/// The pending write queue shared by the bridge and the schedulers.
#[derive(Debug, Default)]
pub struct WriteQueue {
    inner: Mutex<QueueInner>,
    counters: QueueCounters,
}

impl WriteQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits a write, superseding any pending write for the same tag.
    pub fn enqueue(&self, request: WriteRequest) {
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        if inner.pending.insert(request.tag.clone(), request.clone()).is_some() {
            // Tag keeps its place in line; only the value is newer.
            self.counters.replaced.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.order.push_back(request.tag);
        }
    }

    /// Takes up to `max` pending writes for one device, oldest first.
    pub fn dequeue_batch(&self, device: &DeviceId, max: usize) -> Vec<WriteRequest> {
        if max == 0 {
            return Vec::new();
        }

        let mut inner = self.inner.lock();
        let mut batch = Vec::new();
        let mut keep = VecDeque::with_capacity(inner.order.len());

        while let Some(tag) = inner.order.pop_front() {
            if batch.len() >= max {
                keep.push_back(tag);
                continue;
            }
            let matches = inner
                .pending
                .get(&tag)
                .is_some_and(|r| &r.device == device);
            if matches {
                if let Some(request) = inner.pending.remove(&tag) {
                    batch.push(request);
                }
            } else {
                keep.push_back(tag);
            }
        }
        inner.order = keep;
        batch
    }

    /// Records a successfully executed write.
    pub fn record_executed(&self) {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a write that failed on the wire.
    pub fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of pending writes across all devices.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pending writes for one device.
    pub fn pending_for(&self, device: &DeviceId) -> usize {
        self.inner
            .lock()
            .pending
            .values()
            .filter(|r| &r.device == device)
            .count()
    }

    /// Takes a snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            replaced: self.counters.replaced.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use modua_core::types::{TagValue, WriteOrigin};

    fn request(tag: &str, device: &str, value: u16) -> WriteRequest {
        WriteRequest::new(
            TagId::new(tag),
            DeviceId::new(device),
            TagValue::Word(value),
            WriteOrigin::OpcUa,
        )
    }

    #[test]
    fn test_last_write_wins() {
        let queue = WriteQueue::new();
        queue.enqueue(request("t1", "d1", 1));
        queue.enqueue(request("t1", "d1", 2));
        queue.enqueue(request("t1", "d1", 3));

        assert_eq!(queue.len(), 1);
        let batch = queue.dequeue_batch(&DeviceId::new("d1"), 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, TagValue::Word(3));

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.replaced, 2);
    }

    #[test]
    fn test_fifo_across_tags() {
        let queue = WriteQueue::new();
        queue.enqueue(request("a", "d1", 1));
        queue.enqueue(request("b", "d1", 2));
        // Superseding "a" does not move it behind "b".
        queue.enqueue(request("a", "d1", 9));

        let batch = queue.dequeue_batch(&DeviceId::new("d1"), 10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].tag, TagId::new("a"));
        assert_eq!(batch[0].value, TagValue::Word(9));
        assert_eq!(batch[1].tag, TagId::new("b"));
    }

    #[test]
    fn test_batch_limit() {
        let queue = WriteQueue::new();
        for i in 0..5 {
            queue.enqueue(request(&format!("t{i}"), "d1", i));
        }

        let batch = queue.dequeue_batch(&DeviceId::new("d1"), 3);
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.len(), 2);

        // The remainder comes out on the next cycle, still in order.
        let batch = queue.dequeue_batch(&DeviceId::new("d1"), 3);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].tag, TagId::new("t3"));
    }

    #[test]
    fn test_devices_are_isolated() {
        let queue = WriteQueue::new();
        queue.enqueue(request("t1", "d1", 1));
        queue.enqueue(request("t2", "d2", 2));

        let batch = queue.dequeue_batch(&DeviceId::new("d1"), 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].device, DeviceId::new("d1"));

        assert_eq!(queue.pending_for(&DeviceId::new("d2")), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_empty_dequeue() {
        let queue = WriteQueue::new();
        assert!(queue.is_empty());
        assert!(queue.dequeue_batch(&DeviceId::new("d1"), 10).is_empty());
        assert!(queue.dequeue_batch(&DeviceId::new("d1"), 0).is_empty());
    }
}
