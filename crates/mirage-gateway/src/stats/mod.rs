//! Request statistics collection.
//!
//! The per-request path touches only atomic counters; coarse locks are
//! reserved for the rarely-hit insert path and the admin read side.

use crate::models::{ErrorStat, GlobalStats, HourlyStat, OperationStat, SpecStats};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MAX_RECENT_ERRORS: usize = 100;
const MAX_HOURLY_SLOTS: usize = 168; // 7 days

struct OperationCounters {
    operation_id: String,
    spec_id: String,
    method: String,
    path: String,
    total_requests: AtomicI64,
    total_errors: AtomicI64,
    total_time_ns: AtomicI64,
    min_time_ns: AtomicI64,
    max_time_ns: AtomicI64,
    /// Unix milliseconds of the most recent request; 0 = never.
    last_request_ms: AtomicI64,
}

impl OperationCounters {
    fn new(operation_id: &str, spec_id: &str, method: &str, path: &str, first_ns: i64) -> Self {
        Self {
            operation_id: operation_id.to_string(),
            spec_id: spec_id.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            total_requests: AtomicI64::new(0),
            total_errors: AtomicI64::new(0),
            total_time_ns: AtomicI64::new(0),
            min_time_ns: AtomicI64::new(first_ns),
            max_time_ns: AtomicI64::new(0),
            last_request_ms: AtomicI64::new(0),
        }
    }

    fn observe(&self, duration_ns: i64, is_error: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_time_ns.fetch_add(duration_ns, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.last_request_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        let mut current = self.min_time_ns.load(Ordering::Relaxed);
        while duration_ns < current {
            match self.min_time_ns.compare_exchange_weak(
                current,
                duration_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let mut current = self.max_time_ns.load(Ordering::Relaxed);
        while duration_ns > current {
            match self.max_time_ns.compare_exchange_weak(
                current,
                duration_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn snapshot(&self) -> OperationStat {
        let total = self.total_requests.load(Ordering::Relaxed);
        let total_ns = self.total_time_ns.load(Ordering::Relaxed);
        let avg_ms = if total > 0 {
            total_ns as f64 / total as f64 / 1e6
        } else {
            0.0
        };

        let last_ms = self.last_request_ms.load(Ordering::Relaxed);
        let last_request_time = if last_ms > 0 {
            Utc.timestamp_millis_opt(last_ms)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        } else {
            String::new()
        };

        OperationStat {
            operation_id: self.operation_id.clone(),
            spec_id: self.spec_id.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            total_requests: total,
            total_errors: self.total_errors.load(Ordering::Relaxed),
            avg_response_time_ms: avg_ms,
            min_response_time_ms: self.min_time_ns.load(Ordering::Relaxed) as f64 / 1e6,
            max_response_time_ms: self.max_time_ns.load(Ordering::Relaxed) as f64 / 1e6,
            last_request_time,
        }
    }
}

#[derive(Default, Clone)]
struct HourlyCounter {
    requests: i64,
    errors: i64,
}

/// Aggregates per-operation request statistics, a recent-error ring and
/// hourly request counts.
pub struct StatsCollector {
    start_time: RwLock<DateTime<Utc>>,
    operations: RwLock<HashMap<String, Arc<OperationCounters>>>,
    recent_errors: Mutex<VecDeque<ErrorStat>>,
    hourly: Mutex<HashMap<String, HourlyCounter>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            start_time: RwLock::new(Utc::now()),
            operations: RwLock::new(HashMap::new()),
            recent_errors: Mutex::new(VecDeque::new()),
            hourly: Mutex::new(HashMap::new()),
        }
    }

    /// Record one dispatched request. `status_code >= 400` counts as an
    /// error.
    pub fn record_request(
        &self,
        spec_id: &str,
        operation_id: &str,
        method: &str,
        path: &str,
        duration: Duration,
        status_code: u16,
    ) {
        let duration_ns = duration.as_nanos() as i64;
        let is_error = status_code >= 400;

        let counters = {
            let operations = self.operations.read();
            operations.get(operation_id).cloned()
        };
        let counters = match counters {
            Some(counters) => counters,
            None => {
                let mut operations = self.operations.write();
                operations
                    .entry(operation_id.to_string())
                    .or_insert_with(|| {
                        Arc::new(OperationCounters::new(
                            operation_id,
                            spec_id,
                            method,
                            path,
                            duration_ns,
                        ))
                    })
                    .clone()
            }
        };
        counters.observe(duration_ns, is_error);

        if is_error {
            let mut errors = self.recent_errors.lock();
            errors.push_back(ErrorStat {
                timestamp: Utc::now(),
                spec_id: spec_id.to_string(),
                operation_id: operation_id.to_string(),
                path: path.to_string(),
                method: method.to_string(),
                status_code,
            });
            while errors.len() > MAX_RECENT_ERRORS {
                errors.pop_front();
            }
        }

        let hour_key = Utc::now().format("%Y-%m-%d-%H").to_string();
        let mut hourly = self.hourly.lock();
        let slot = hourly.entry(hour_key).or_default();
        slot.requests += 1;
        if is_error {
            slot.errors += 1;
        }
        if hourly.len() > MAX_HOURLY_SLOTS {
            let mut keys: Vec<String> = hourly.keys().cloned().collect();
            keys.sort();
            for key in keys.iter().take(hourly.len() - MAX_HOURLY_SLOTS) {
                hourly.remove(key);
            }
        }
    }

    pub fn global_stats(&self, active_specs: usize, total_operations: usize) -> GlobalStats {
        let start_time = *self.start_time.read();

        let mut op_stats: Vec<OperationStat> = self
            .operations
            .read()
            .values()
            .map(|counters| counters.snapshot())
            .collect();

        let total_requests: i64 = op_stats.iter().map(|s| s.total_requests).sum();
        let total_errors: i64 = op_stats.iter().map(|s| s.total_errors).sum();
        let total_time_ns: f64 = op_stats
            .iter()
            .map(|s| s.avg_response_time_ms * s.total_requests as f64 * 1e6)
            .sum();

        op_stats.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));
        op_stats.truncate(10);

        let avg_response_time_ms = if total_requests > 0 {
            total_time_ns / total_requests as f64 / 1e6
        } else {
            0.0
        };

        let uptime_secs = (Utc::now() - start_time).num_seconds().max(0);
        let requests_per_second = if uptime_secs > 0 {
            total_requests as f64 / uptime_secs as f64
        } else {
            0.0
        };

        GlobalStats {
            total_requests,
            total_errors,
            active_specs,
            total_operations,
            avg_response_time_ms,
            requests_per_second,
            start_time,
            uptime: humantime::format_duration(Duration::from_secs(uptime_secs as u64))
                .to_string(),
            top_operations: op_stats,
            recent_errors: self.recent_errors.lock().iter().cloned().collect(),
            requests_by_hour: self.hourly_view(),
        }
    }

    pub fn spec_stats(&self, spec_id: &str, spec_name: &str) -> SpecStats {
        let op_stats: Vec<OperationStat> = self
            .operations
            .read()
            .values()
            .filter(|counters| counters.spec_id == spec_id)
            .map(|counters| counters.snapshot())
            .collect();

        let total_requests: i64 = op_stats.iter().map(|s| s.total_requests).sum();
        let total_errors: i64 = op_stats.iter().map(|s| s.total_errors).sum();
        let total_time_ns: f64 = op_stats
            .iter()
            .map(|s| s.avg_response_time_ms * s.total_requests as f64 * 1e6)
            .sum();

        SpecStats {
            spec_id: spec_id.to_string(),
            spec_name: spec_name.to_string(),
            total_requests,
            total_errors,
            avg_response_time_ms: if total_requests > 0 {
                total_time_ns / total_requests as f64 / 1e6
            } else {
                0.0
            },
            operations: op_stats,
        }
    }

    pub fn operation_stats(&self, operation_id: &str) -> Option<OperationStat> {
        self.operations
            .read()
            .get(operation_id)
            .map(|counters| counters.snapshot())
    }

    /// Drop all counters and restart the uptime clock.
    pub fn reset(&self) {
        *self.start_time.write() = Utc::now();
        self.operations.write().clear();
        self.recent_errors.lock().clear();
        self.hourly.lock().clear();
    }

    /// Last 24 hours, oldest first, zero-filled.
    fn hourly_view(&self) -> Vec<HourlyStat> {
        let hourly = self.hourly.lock();
        let now = Utc::now();
        (0..24)
            .rev()
            .map(|i| {
                let hour = now - ChronoDuration::hours(i);
                let key = hour.format("%Y-%m-%d-%H").to_string();
                let counter = hourly.get(&key).cloned().unwrap_or_default();
                HourlyStat {
                    hour: hour.format("%H:00").to_string(),
                    requests: counter.requests,
                    errors: counter.errors,
                }
            })
            .collect()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_totals_and_errors() {
        let stats = StatsCollector::new();
        stats.record_request("s", "op", "GET", "/x", Duration::from_millis(10), 200);
        stats.record_request("s", "op", "GET", "/x", Duration::from_millis(30), 500);

        let op = stats.operation_stats("op").unwrap();
        assert_eq!(op.total_requests, 2);
        assert_eq!(op.total_errors, 1);
        assert!((op.avg_response_time_ms - 20.0).abs() < 1.0);
        assert!((op.min_response_time_ms - 10.0).abs() < 1.0);
        assert!((op.max_response_time_ms - 30.0).abs() < 1.0);
        assert!(!op.last_request_time.is_empty());
    }

    #[test]
    fn test_unknown_operation_has_no_stats() {
        let stats = StatsCollector::new();
        assert!(stats.operation_stats("nope").is_none());
    }

    #[test]
    fn test_global_stats_aggregation() {
        let stats = StatsCollector::new();
        stats.record_request("s1", "op1", "GET", "/a", Duration::from_millis(5), 200);
        stats.record_request("s1", "op1", "GET", "/a", Duration::from_millis(5), 200);
        stats.record_request("s2", "op2", "POST", "/b", Duration::from_millis(5), 404);

        let global = stats.global_stats(2, 2);
        assert_eq!(global.total_requests, 3);
        assert_eq!(global.total_errors, 1);
        assert_eq!(global.active_specs, 2);
        assert_eq!(global.recent_errors.len(), 1);
        assert_eq!(global.recent_errors[0].status_code, 404);
        assert_eq!(global.requests_by_hour.len(), 24);
        // Top operation is the one with more requests
        assert_eq!(global.top_operations[0].operation_id, "op1");
    }

    #[test]
    fn test_spec_stats_scoped() {
        let stats = StatsCollector::new();
        stats.record_request("s1", "op1", "GET", "/a", Duration::from_millis(5), 200);
        stats.record_request("s2", "op2", "GET", "/b", Duration::from_millis(5), 200);

        let spec = stats.spec_stats("s1", "One");
        assert_eq!(spec.total_requests, 1);
        assert_eq!(spec.operations.len(), 1);
        assert_eq!(spec.operations[0].operation_id, "op1");
    }

    #[test]
    fn test_reset_clears_everything() {
        let stats = StatsCollector::new();
        stats.record_request("s", "op", "GET", "/x", Duration::from_millis(5), 500);
        stats.reset();

        assert!(stats.operation_stats("op").is_none());
        let global = stats.global_stats(0, 0);
        assert_eq!(global.total_requests, 0);
        assert!(global.recent_errors.is_empty());
    }

    #[test]
    fn test_hourly_view_counts_current_hour() {
        let stats = StatsCollector::new();
        stats.record_request("s", "op", "GET", "/x", Duration::from_millis(5), 200);
        let view = stats.hourly_view();
        // Current hour is the last entry
        assert_eq!(view.last().unwrap().requests, 1);
    }

    #[test]
    fn test_concurrent_updates_sum_correctly() {
        let stats = Arc::new(StatsCollector::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    stats.record_request("s", "op", "GET", "/x", Duration::from_micros(100), 200);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.operation_stats("op").unwrap().total_requests, 800);
    }
}
