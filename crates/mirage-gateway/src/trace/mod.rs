//! In-memory trace ring and live fan-out.

mod websocket;

pub use websocket::handle_trace_stream;

use crate::models::{Trace, TraceFilter};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_MAX_TRACES: usize = 1000;
const SUBSCRIBER_QUEUE_CAP: usize = 100;

struct Subscriber {
    sender: mpsc::Sender<Trace>,
    /// Set under the bus lock before the entry is removed, so `record`
    /// can never hand a trace to a subscription that was just closed.
    closed: bool,
}

struct Inner {
    traces: VecDeque<Trace>,
    subscribers: HashMap<String, Subscriber>,
    shutdown: bool,
}

/// Bounded ring of recent traces plus non-blocking fan-out to live
/// subscribers. A single mutex covers the ring and the subscriber set.
pub struct TraceBus {
    inner: Mutex<Inner>,
    max_traces: usize,
}

impl TraceBus {
    /// `max_traces <= 0` selects the default capacity of 1000.
    pub fn new(max_traces: i64) -> Self {
        let max_traces = if max_traces <= 0 {
            DEFAULT_MAX_TRACES
        } else {
            max_traces as usize
        };
        Self {
            inner: Mutex::new(Inner {
                traces: VecDeque::new(),
                subscribers: HashMap::new(),
                shutdown: false,
            }),
            max_traces,
        }
    }

    /// Append a trace to the ring and offer it to every live subscriber.
    /// Oldest traces fall off on overflow; a subscriber with a full queue
    /// misses the trace rather than blocking the caller.
    pub fn record(&self, mut trace: Trace) {
        if trace.id.is_empty() {
            trace.id = uuid::Uuid::new_v4().to_string();
        }

        let senders: Vec<mpsc::Sender<Trace>> = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                return;
            }

            inner.traces.push_back(trace.clone());
            while inner.traces.len() > self.max_traces {
                inner.traces.pop_front();
            }

            inner
                .subscribers
                .values()
                .filter(|sub| !sub.closed)
                .map(|sub| sub.sender.clone())
                .collect()
        };

        for sender in senders {
            // Full or disconnected queues drop the trace for that
            // subscriber only.
            let _ = sender.try_send(trace.clone());
        }
    }

    /// Walk the ring newest-to-oldest applying the filter, stopping at the
    /// filter's limit.
    pub fn get_traces(&self, filter: &TraceFilter) -> Vec<Trace> {
        let inner = self.inner.lock();
        let mut result = Vec::new();

        for trace in inner.traces.iter().rev() {
            if !matches_filter(trace, filter) {
                continue;
            }
            result.push(trace.clone());
            if let Some(limit) = filter.limit {
                if result.len() >= limit {
                    break;
                }
            }
        }

        result
    }

    pub fn get_trace(&self, id: &str) -> Option<Trace> {
        self.inner
            .lock()
            .traces
            .iter()
            .find(|trace| trace.id == id)
            .cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().traces.clear();
    }

    pub fn clear_by_spec(&self, spec_id: &str) {
        self.inner
            .lock()
            .traces
            .retain(|trace| trace.spec_id != spec_id);
    }

    /// Register a live subscriber with a bounded queue.
    pub fn subscribe(&self) -> (String, mpsc::Receiver<Trace>) {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAP);
        let id = uuid::Uuid::new_v4().to_string();
        self.inner.lock().subscribers.insert(
            id.clone(),
            Subscriber {
                sender,
                closed: false,
            },
        );
        debug!(subscriber = %id, "trace subscriber added");
        (id, receiver)
    }

    /// Mark the subscription closed and drop its sender, ending the
    /// receiver's stream.
    pub fn unsubscribe(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(sub) = inner.subscribers.get_mut(id) {
            sub.closed = true;
        }
        inner.subscribers.remove(id);
        debug!(subscriber = %id, "trace subscriber removed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn trace_count(&self) -> usize {
        self.inner.lock().traces.len()
    }

    pub fn max_traces(&self) -> usize {
        self.max_traces
    }

    /// Stop accepting traces and close every subscriber channel. Called on
    /// graceful shutdown.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        for sub in inner.subscribers.values_mut() {
            sub.closed = true;
        }
        inner.subscribers.clear();
    }
}

fn matches_filter(trace: &Trace, filter: &TraceFilter) -> bool {
    if let Some(spec_id) = &filter.spec_id {
        if &trace.spec_id != spec_id {
            return false;
        }
    }
    if let Some(operation_id) = &filter.operation_id {
        if &trace.operation_id != operation_id {
            return false;
        }
    }
    if let Some(method) = &filter.method {
        if !trace.request.method.eq_ignore_ascii_case(method) {
            return false;
        }
    }
    if let Some(status) = filter.status_code {
        if trace.response.status_code != status {
            return false;
        }
    }
    if let Some(start) = filter.start_time {
        if trace.timestamp < start {
            return false;
        }
    }
    if let Some(end) = filter.end_time {
        if trace.timestamp > end {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TraceRequest, TraceResponse};
    use chrono::Utc;

    fn sample_trace(id: &str, spec_id: &str, method: &str, status: u16) -> Trace {
        Trace {
            id: id.to_string(),
            spec_id: spec_id.to_string(),
            spec_name: "spec".to_string(),
            operation_id: "op".to_string(),
            operation_path: "/x".to_string(),
            timestamp: Utc::now(),
            duration_ns: 1_000,
            request: TraceRequest {
                method: method.to_string(),
                url: "/x".to_string(),
                path: "/x".to_string(),
                query: Default::default(),
                headers: Default::default(),
                body: String::new(),
            },
            response: TraceResponse {
                status_code: status,
                headers: Default::default(),
                body: String::new(),
            },
            matched_rule_id: None,
            matched_rule_name: "rule".to_string(),
        }
    }

    #[test]
    fn test_ring_bounded_keeps_newest() {
        let bus = TraceBus::new(3);
        for i in 0..5 {
            bus.record(sample_trace(&format!("t{i}"), "s", "GET", 200));
        }
        assert_eq!(bus.trace_count(), 3);
        let traces = bus.get_traces(&TraceFilter::default());
        let ids: Vec<&str> = traces.iter().map(|t| t.id.as_str()).collect();
        // Newest first, oldest two evicted
        assert_eq!(ids, vec!["t4", "t3", "t2"]);
    }

    #[test]
    fn test_zero_capacity_selects_default() {
        assert_eq!(TraceBus::new(0).max_traces(), 1000);
        assert_eq!(TraceBus::new(-5).max_traces(), 1000);
        assert_eq!(TraceBus::new(10).max_traces(), 10);
    }

    #[test]
    fn test_generated_id_when_empty() {
        let bus = TraceBus::new(10);
        bus.record(sample_trace("", "s", "GET", 200));
        let traces = bus.get_traces(&TraceFilter::default());
        assert!(!traces[0].id.is_empty());
    }

    #[test]
    fn test_filters() {
        let bus = TraceBus::new(100);
        bus.record(sample_trace("a", "s1", "GET", 200));
        bus.record(sample_trace("b", "s1", "POST", 404));
        bus.record(sample_trace("c", "s2", "GET", 200));

        let filter = TraceFilter {
            spec_id: Some("s1".to_string()),
            ..Default::default()
        };
        assert_eq!(bus.get_traces(&filter).len(), 2);

        let filter = TraceFilter {
            method: Some("get".to_string()),
            ..Default::default()
        };
        assert_eq!(bus.get_traces(&filter).len(), 2);

        let filter = TraceFilter {
            status_code: Some(404),
            ..Default::default()
        };
        assert_eq!(bus.get_traces(&filter).len(), 1);

        let filter = TraceFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(bus.get_traces(&filter).len(), 1);
    }

    #[test]
    fn test_clear_by_spec() {
        let bus = TraceBus::new(100);
        bus.record(sample_trace("a", "s1", "GET", 200));
        bus.record(sample_trace("b", "s2", "GET", 200));
        bus.clear_by_spec("s1");
        let traces = bus.get_traces(&TraceFilter::default());
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].spec_id, "s2");
    }

    #[tokio::test]
    async fn test_subscriber_receives_traces() {
        let bus = TraceBus::new(100);
        let (id, mut receiver) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.record(sample_trace("a", "s", "GET", 200));
        let got = receiver.recv().await.unwrap();
        assert_eq!(got.id, "a");

        bus.unsubscribe(&id);
        assert_eq!(bus.subscriber_count(), 0);
        // Channel is closed after unsubscribe
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_two_subscribers_both_observe() {
        let bus = TraceBus::new(100);
        let (_id1, mut rx1) = bus.subscribe();
        let (_id2, mut rx2) = bus.subscribe();

        bus.record(sample_trace("a", "s", "GET", 200));
        assert_eq!(rx1.recv().await.unwrap().id, "a");
        assert_eq!(rx2.recv().await.unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_full_subscriber_queue_drops_without_blocking() {
        let bus = TraceBus::new(1000);
        let (_id, mut receiver) = bus.subscribe();

        // Overfill the per-subscriber queue (cap 100)
        for i in 0..150 {
            bus.record(sample_trace(&format!("t{i}"), "s", "GET", 200));
        }

        // The ring kept everything; the subscriber saw at most the cap
        assert_eq!(bus.trace_count(), 150);
        let mut received = 0;
        while receiver.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 100);
    }

    #[tokio::test]
    async fn test_record_after_close_is_dropped() {
        let bus = TraceBus::new(100);
        let (_id, mut receiver) = bus.subscribe();
        bus.close();
        bus.record(sample_trace("a", "s", "GET", 200));
        assert_eq!(bus.trace_count(), 0);
        assert!(receiver.recv().await.is_none());
    }
}
