//! Inference performance tracking.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

/// Size of the rolling latency window.
const LATENCY_WINDOW: usize = 100;

/// Minimum window size before the P95 estimate is reported.
const P95_MIN_SAMPLES: usize = 20;

#[derive(Debug, Default)]
struct StatsInner {
    total_inferences: u64,
    total_tokens: u64,
    total_errors: u64,
    recent_latencies: VecDeque<Duration>,
    average_latency: Duration,
    p95_latency: Duration,
    error_rate: f64,
    throughput_tps: f64,
}

/// A point-in-time copy of the tracker's counters.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub total_inferences: u64,
    pub total_tokens: u64,
    pub total_errors: u64,
    pub average_latency: Duration,
    /// Approximate P95 taken at index `⌊0.95·N⌋` of the unsorted window.
    pub p95_latency: Duration,
    pub error_rate: f64,
    pub throughput_tps: f64,
}

/// Thread-safe inference statistics.
///
/// Sampling takes a short write lock and never blocks inference for long;
/// readers take the read lock.
#[derive(Debug, Default)]
pub struct InferenceStats {
    inner: RwLock<StatsInner>,
}

impl InferenceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed inference with its token count and latency.
    pub fn record_inference(&self, token_count: usize, latency: Duration) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.total_inferences += 1;
        inner.total_tokens += token_count as u64;

        inner.recent_latencies.push_back(latency);
        if inner.recent_latencies.len() > LATENCY_WINDOW {
            inner.recent_latencies.pop_front();
        }

        let n = inner.recent_latencies.len();
        let total: Duration = inner.recent_latencies.iter().sum();
        inner.average_latency = total / n as u32;

        // Approximate P95: index into the unsorted window, no full sort.
        if n >= P95_MIN_SAMPLES {
            let idx = n * 95 / 100;
            if let Some(lat) = inner.recent_latencies.get(idx) {
                inner.p95_latency = *lat;
            }
        }

        if !inner.average_latency.is_zero() {
            inner.throughput_tps =
                Duration::from_secs(1).as_secs_f64() / inner.average_latency.as_secs_f64();
        }

        if inner.total_inferences > 0 {
            inner.error_rate = inner.total_errors as f64 / inner.total_inferences as f64;
        }
    }

    /// Record an inference error.
    pub fn record_error(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.total_errors += 1;
        if inner.total_inferences > 0 {
            inner.error_rate = inner.total_errors as f64 / inner.total_inferences as f64;
        }
    }

    /// Snapshot the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        StatsSnapshot {
            total_inferences: inner.total_inferences,
            total_tokens: inner.total_tokens,
            total_errors: inner.total_errors,
            average_latency: inner.average_latency,
            p95_latency: inner.p95_latency,
            error_rate: inner.error_rate,
            throughput_tps: inner.throughput_tps,
        }
    }
}
