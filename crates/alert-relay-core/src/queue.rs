//! # Event Queue
//!
//! Bounded per-sink FIFO buffers decoupling the webhook handler from delivery.
//!
//! Every registered sink gets its own queue. [`EventQueue::publish`] copies the
//! event into each of them and never waits: when a sink's queue is full the
//! oldest entry for that sink is dropped and its overflow counter incremented.
//! Each [`SinkReceiver`] is consumed by exactly one worker and yields events in
//! publication order.

use crate::AlertEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

/// Default per-sink capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

// ============================================================================
// Per-sink channel
// ============================================================================

/// Shared state of a single sink's buffer
#[derive(Debug)]
struct SinkChannel {
    name: String,
    capacity: usize,
    buffer: Mutex<VecDeque<AlertEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    closed: AtomicBool,
}

impl SinkChannel {
    fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Lock the buffer, recovering from a poisoned lock.
    ///
    /// The buffer holds plain values and is left consistent by every critical
    /// section, so a panic elsewhere cannot corrupt it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<AlertEvent>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Push an event, evicting the oldest when full. Returns true if an entry was dropped.
    fn push(&self, event: AlertEvent) -> bool {
        let evicted = {
            let mut buffer = self.lock();
            let evicted = if buffer.len() >= self.capacity {
                buffer.pop_front().is_some()
            } else {
                false
            };
            buffer.push_back(event);
            evicted
        };

        // A stored permit wakes the single consumer even if it is not yet waiting.
        self.notify.notify_one();
        evicted
    }

    fn pop(&self) -> Option<AlertEvent> {
        self.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn stats(&self) -> SinkQueueStats {
        SinkQueueStats {
            sink: self.name.clone(),
            depth: self.len(),
            capacity: self.capacity,
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Public types
// ============================================================================

/// Point-in-time counters for one sink's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkQueueStats {
    pub sink: String,
    pub depth: usize,
    pub capacity: usize,
    /// Entries evicted because the queue was full
    pub dropped: u64,
    /// Events the sink reported as delivered
    pub delivered: u64,
    /// Events the sink failed to deliver
    pub failed: u64,
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of sink queues the event was placed in
    pub delivered_to: usize,
    /// Sinks whose oldest entry was evicted to make room
    pub overflowed: Vec<String>,
}

/// Fan-out queue owning one bounded buffer per registered sink.
///
/// Created once at startup and shared behind an `Arc`; [`EventQueue::close`]
/// starts shutdown, after which receivers drain what remains and then end.
#[derive(Debug)]
pub struct EventQueue {
    capacity: usize,
    sinks: RwLock<Vec<Arc<SinkChannel>>>,
    closed: AtomicBool,
}

impl EventQueue {
    /// Create a queue whose per-sink buffers hold `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sinks: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a sink and return the receiving end of its queue.
    ///
    /// Events published before registration are not replayed to the new sink.
    pub fn register_sink(&self, name: impl Into<String>) -> SinkReceiver {
        let channel = Arc::new(SinkChannel::new(name.into(), self.capacity));

        // Checked under the write lock so a concurrent close() either sees this
        // channel or has already set the flag.
        let mut sinks = self
            .sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.closed.load(Ordering::Acquire) {
            channel.closed.store(true, Ordering::Release);
        }
        sinks.push(channel.clone());
        drop(sinks);

        debug!(sink = %channel.name, capacity = self.capacity, "Registered sink queue");
        SinkReceiver { channel }
    }

    /// Number of registered sinks.
    pub fn sink_count(&self) -> usize {
        self.sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Fan an event out to every registered sink without blocking.
    ///
    /// Publishing after [`close`](Self::close) is a no-op.
    pub fn publish(&self, event: AlertEvent) -> PublishReport {
        let mut report = PublishReport::default();
        if self.is_closed() {
            warn!(event_kind = %event.kind(), "Event published after queue close; discarded");
            return report;
        }

        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for channel in sinks.iter() {
            if channel.push(event.clone()) {
                let dropped_total = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    sink = %channel.name,
                    capacity = channel.capacity,
                    dropped_total,
                    "Sink queue full; dropped oldest event"
                );
                report.overflowed.push(channel.name.clone());
            }
            report.delivered_to += 1;
        }

        report
    }

    /// Close the queue: further publishes are discarded and receivers end once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for channel in sinks.iter() {
            channel.closed.store(true, Ordering::Release);
            channel.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot counters for every sink, in registration order.
    pub fn stats(&self) -> Vec<SinkQueueStats> {
        self.sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|channel| channel.stats())
            .collect()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of one sink's queue.
///
/// Not cloneable: each sink has exactly one consumer.
#[derive(Debug)]
pub struct SinkReceiver {
    channel: Arc<SinkChannel>,
}

impl SinkReceiver {
    pub fn sink_name(&self) -> &str {
        &self.channel.name
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the queue has been closed and this sink's buffer is empty.
    pub async fn consume(&mut self) -> Option<AlertEvent> {
        loop {
            if let Some(event) = self.channel.pop() {
                return Some(event);
            }
            if self.channel.closed.load(Ordering::Acquire) {
                return None;
            }
            self.channel.notify.notified().await;
        }
    }

    /// Take the next event if one is buffered.
    pub fn try_consume(&mut self) -> Option<AlertEvent> {
        self.channel.pop()
    }

    /// Events currently buffered for this sink.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries evicted from this sink's queue so far.
    pub fn dropped(&self) -> u64 {
        self.channel.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_delivered(&self) {
        self.channel.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.channel.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SinkQueueStats {
        self.channel.stats()
    }
}
