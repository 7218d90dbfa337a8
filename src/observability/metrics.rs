//! Thread-safe routing metrics
//!
//! Atomic counters for request outcomes plus mutex-protected per-route and
//! per-reason tallies. One collector is shared by every request an
//! [`Orchestrator`](crate::graph::Orchestrator) serves.

use crate::graph::state::{FallbackReason, Route};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Latency samples kept for percentile calculation
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and mutexes
#[derive(Debug)]
pub struct RoutingMetrics {
    requests_started: AtomicU64,
    requests_completed: AtomicU64,
    requests_failed: AtomicU64,
    requests_in_flight: AtomicU64,
    requests_parked: AtomicU64,
    router_decisions: AtomicU64,
    clarifications: AtomicU64,
    forced_fallbacks: AtomicU64,
    branch_failures: AtomicU64,
    escalations: AtomicU64,
    started_at: AtomicU64,

    routes: Mutex<BTreeMap<&'static str, u64>>,
    fallback_reasons: Mutex<BTreeMap<&'static str, u64>>,
    latencies: Mutex<Vec<u64>>, // in milliseconds
}

impl Default for RoutingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self {
            requests_started: AtomicU64::new(0),
            requests_completed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            requests_in_flight: AtomicU64::new(0),
            requests_parked: AtomicU64::new(0),
            router_decisions: AtomicU64::new(0),
            clarifications: AtomicU64::new(0),
            forced_fallbacks: AtomicU64::new(0),
            branch_failures: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            started_at: AtomicU64::new(current_timestamp()),
            routes: Mutex::new(BTreeMap::new()),
            fallback_reasons: Mutex::new(BTreeMap::new()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    // Request lifecycle
    pub fn request_started(&self) {
        self.requests_started.fetch_add(1, Ordering::Relaxed);
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_completed(&self, duration: Duration, parked: bool) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
        if parked {
            self.requests_parked.fetch_add(1, Ordering::Relaxed);
        }
        self.finish(duration);
    }

    pub fn request_failed(&self, duration: Duration) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.finish(duration);
    }

    fn finish(&self, duration: Duration) {
        self.requests_in_flight.fetch_sub(1, Ordering::Relaxed);
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(duration.as_millis() as u64);
            if latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.remove(0);
            }
        }
    }

    // Routing
    pub fn route_decided(&self, route: Route) {
        self.router_decisions.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut routes) = self.routes.lock() {
            *routes.entry(route.as_str()).or_insert(0) += 1;
        }
    }

    pub fn clarification_asked(&self) {
        self.clarifications.fetch_add(1, Ordering::Relaxed);
    }

    /// A fallback the orchestrator imposed over the router's decision
    pub fn fallback_forced(&self) {
        self.forced_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fallback_taken(&self, reason: FallbackReason) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut reasons) = self.fallback_reasons.lock() {
            *reasons.entry(reason.as_str()).or_insert(0) += 1;
        }
    }

    pub fn branch_failed(&self) {
        self.branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Calculate latency statistics (avg, p50, p95, p99)
    fn latency_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(latencies) = self.latencies.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if latencies.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    pub fn snapshot(&self) -> RoutingMetricsSnapshot {
        let (avg, p50, p95, p99) = self.latency_statistics();
        let routes = self
            .routes
            .lock()
            .map(|routes| routes.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();
        let fallback_reasons = self
            .fallback_reasons
            .lock()
            .map(|reasons| reasons.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        RoutingMetricsSnapshot {
            timestamp: current_timestamp(),
            uptime_seconds: current_timestamp()
                .saturating_sub(self.started_at.load(Ordering::Relaxed)),
            requests: RequestMetrics {
                started: self.requests_started.load(Ordering::Relaxed),
                completed: self.requests_completed.load(Ordering::Relaxed),
                failed: self.requests_failed.load(Ordering::Relaxed),
                in_flight: self.requests_in_flight.load(Ordering::Relaxed),
                parked: self.requests_parked.load(Ordering::Relaxed),
                avg_latency_ms: avg,
                p50_latency_ms: p50,
                p95_latency_ms: p95,
                p99_latency_ms: p99,
            },
            routing: RoutingCounts {
                decisions: self.router_decisions.load(Ordering::Relaxed),
                clarifications: self.clarifications.load(Ordering::Relaxed),
                forced_fallbacks: self.forced_fallbacks.load(Ordering::Relaxed),
                branch_failures: self.branch_failures.load(Ordering::Relaxed),
                escalations: self.escalations.load(Ordering::Relaxed),
                routes,
                fallback_reasons,
            },
        }
    }
}

/// Point-in-time copy of [`RoutingMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetricsSnapshot {
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub requests: RequestMetrics,
    pub routing: RoutingCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: u64,
    /// Completed requests that ended waiting on a clarification reply
    pub parked: u64,
    pub avg_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingCounts {
    pub decisions: u64,
    pub clarifications: u64,
    pub forced_fallbacks: u64,
    pub branch_failures: u64,
    pub escalations: u64,
    pub routes: BTreeMap<String, u64>,
    pub fallback_reasons: BTreeMap<String, u64>,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}
