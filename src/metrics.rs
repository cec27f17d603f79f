//! Request and latency statistics for the loan approval server.

use crate::error::FailureKind;
use crate::types::envelope::ResponseEnvelope;
use crate::types::prediction::{Label, PredictionResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the serving layer
pub struct ServingMetrics {
    /// Prediction requests received
    pub requests_received: AtomicU64,
    /// Predictions returned successfully
    pub predictions_served: AtomicU64,
    /// Requests rejected by the normalizer
    pub validation_errors: AtomicU64,
    /// Requests per response envelope
    requests_by_envelope: RwLock<HashMap<ResponseEnvelope, u64>>,
    /// Successful predictions per label
    predictions_by_label: RwLock<HashMap<Label, u64>>,
    /// Worker failures per kind
    failures_by_kind: RwLock<HashMap<FailureKind, u64>>,
    /// End-to-end prediction latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Approved-probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServingMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            predictions_served: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            requests_by_envelope: RwLock::new(HashMap::new()),
            predictions_by_label: RwLock::new(HashMap::new()),
            failures_by_kind: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record an incoming prediction request
    pub fn record_request(&self, envelope: ResponseEnvelope) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_envelope) = self.requests_by_envelope.write() {
            *by_envelope.entry(envelope).or_insert(0) += 1;
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, latency: Duration, result: &PredictionResult) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);

        if let Ok(mut by_label) = self.predictions_by_label.write() {
            *by_label.entry(result.label).or_insert(0) += 1;
        }

        let bucket = (result.probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a request rejected before reaching the worker
    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed worker invocation
    pub fn record_failure(&self, kind: FailureKind, latency: Duration) {
        self.record_latency(latency);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind).or_insert(0) += 1;
        }
    }

    fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get latency statistics
    pub fn get_latency_stats(&self) -> LatencyStats {
        let mut sorted: Vec<u64> = match self.latencies.read() {
            Ok(times) => times.clone(),
            Err(_) => return LatencyStats::default(),
        };
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Get current request rate (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.requests_received.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Share of served predictions that were approvals
    pub fn get_approval_rate(&self) -> f64 {
        let served = self.predictions_served.load(Ordering::Relaxed);
        if served == 0 {
            return 0.0;
        }
        let approved = self
            .predictions_by_label
            .read()
            .map(|by_label| by_label.get(&Label::Approved).copied().unwrap_or(0))
            .unwrap_or(0);
        approved as f64 / served as f64
    }

    /// Get probability distribution
    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or_default()
    }

    /// Get worker failures by kind
    pub fn get_failures_by_kind(&self) -> HashMap<FailureKind, u64> {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Get requests by response envelope
    pub fn get_requests_by_envelope(&self) -> HashMap<ResponseEnvelope, u64> {
        self.requests_by_envelope
            .read()
            .map(|by_envelope| by_envelope.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_received.load(Ordering::Relaxed);
        let served = self.predictions_served.load(Ordering::Relaxed);
        let rejected = self.validation_errors.load(Ordering::Relaxed);
        let latency = self.get_latency_stats();
        let failures = self.get_failures_by_kind();
        let failed: u64 = failures.values().sum();

        info!(
            requests = requests,
            served = served,
            rejected = rejected,
            failed = failed,
            throughput = format!("{:.2} req/s", self.get_throughput()),
            approval_rate = format!("{:.1}%", self.get_approval_rate() * 100.0),
            "Serving summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Prediction latency"
        );

        let by_envelope = self.get_requests_by_envelope();
        for envelope in ResponseEnvelope::ALL {
            let count = by_envelope.get(&envelope).copied().unwrap_or(0);
            info!(envelope = envelope.as_str(), requests = count, "Requests by envelope");
        }
        for (kind, count) in &failures {
            info!(kind = %kind, count = count, "Worker failures");
        }

        let distribution = self.get_probability_distribution();
        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                let bar: String = "█".repeat(((pct / 5.0) as usize).min(20));
                info!(
                    "Approval probability {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // the first tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
