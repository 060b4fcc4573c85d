//! Prometheus metrics for the relay
//!
//! Each [`ServiceMetrics`] owns its own [`Registry`], so several routers can
//! live in one process (tests, mostly) without colliding on metric names.
//! Per-sink metrics are refreshed from
//! [`EventQueue::stats`](alert_relay_core::queue::EventQueue::stats) at scrape
//! time: depth is a gauge, the `_total` series are counters advanced by the
//! delta since the previous scrape.

use alert_relay_core::queue::SinkQueueStats;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::{Arc, Mutex};

pub struct ServiceMetrics {
    registry: Registry,

    pub webhook_requests_total: IntCounter,
    pub webhook_signature_failures_total: IntCounter,
    pub webhook_malformed_total: IntCounter,
    pub alert_events_published_total: IntCounter,

    pub sink_queue_depth: IntGaugeVec,
    pub sink_queue_dropped_total: IntCounterVec,
    pub sink_delivered_total: IntCounterVec,
    pub sink_failed_total: IntCounterVec,

    // Serializes scrapes so concurrent deltas are not applied twice.
    observe_lock: Mutex<()>,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        let webhook_requests_total =
            counter("webhook_requests_total", "Callback requests received")?;
        let webhook_signature_failures_total = counter(
            "webhook_signature_failures_total",
            "Callback requests rejected for a bad signature",
        )?;
        let webhook_malformed_total = counter(
            "webhook_malformed_total",
            "Callback requests with malformed headers or payloads",
        )?;
        let alert_events_published_total = counter(
            "alert_events_published_total",
            "Alert events published to the event queue",
        )?;

        let sink_queue_depth =
            IntGaugeVec::new(Opts::new("sink_queue_depth", "Events waiting in a sink queue"), &["sink"])?;
        registry.register(Box::new(sink_queue_depth.clone()))?;

        let sink_counter = |name: &str, help: &str| -> Result<IntCounterVec, prometheus::Error> {
            let counter = IntCounterVec::new(Opts::new(name, help), &["sink"])?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };
        let sink_queue_dropped_total = sink_counter(
            "sink_queue_dropped_total",
            "Events dropped from a full sink queue",
        )?;
        let sink_delivered_total = sink_counter("sink_delivered_total", "Events a sink delivered")?;
        let sink_failed_total =
            sink_counter("sink_failed_total", "Events a sink failed to deliver")?;

        Ok(Arc::new(Self {
            registry,
            webhook_requests_total,
            webhook_signature_failures_total,
            webhook_malformed_total,
            alert_events_published_total,
            sink_queue_depth,
            sink_queue_dropped_total,
            sink_delivered_total,
            sink_failed_total,
            observe_lock: Mutex::new(()),
        }))
    }

    /// Bring per-sink metrics up to date with queue statistics.
    pub fn observe_queue(&self, stats: &[SinkQueueStats]) {
        let _guard = self
            .observe_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for sink in stats {
            let labels = [sink.sink.as_str()];
            self.sink_queue_depth
                .with_label_values(&labels)
                .set(to_gauge(sink.depth as u64));
            advance_to(&self.sink_queue_dropped_total, &labels, sink.dropped);
            advance_to(&self.sink_delivered_total, &labels, sink.delivered);
            advance_to(&self.sink_failed_total, &labels, sink.failed);
        }
    }

    /// Text exposition of everything in this registry.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counters only move forward; a lower `total` leaves the counter as is.
fn advance_to(counter: &IntCounterVec, labels: &[&str], total: u64) {
    let counter = counter.with_label_values(labels);
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

fn to_gauge(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics")
            .field("webhook_requests_total", &self.webhook_requests_total.get())
            .field(
                "alert_events_published_total",
                &self.alert_events_published_total.get(),
            )
            .finish()
    }
}
