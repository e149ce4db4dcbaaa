//! Prometheus metrics for approval queue monitoring.
//!
//! This module provides Prometheus metrics exposition for the countersign
//! engine, covering queue depth, decision throughput, and effect application
//! health.
//!
//! Metrics are organized into three categories:
//! - **Gauges**: Point-in-time state (pending requests per category)
//! - **Counters**: Cumulative totals (decisions, effect failures)
//! - **Histograms**: Distributions (submission-to-terminal latency)
//!
//! All metrics use labels for drill-down by category and outcome.

#[cfg(feature = "metrics")]
use prometheus::{CounterVec, GaugeVec, HistogramVec, Opts, Registry};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
use crate::error::Result;

/// Prometheus metrics registry for the countersign engine.
///
/// Tracks queue depth, decision outcomes, and effect application with
/// labels for category-level drill-down.
#[cfg(feature = "metrics")]
#[derive(Clone)]
pub struct CountersignMetrics {
    registry: Registry,

    // Gauges (point-in-time state)
    pending_requests: GaugeVec,

    // Counters (cumulative totals)
    decisions_total: CounterVec,
    effect_failures_total: CounterVec,

    // Histograms (distributions)
    time_to_decision_seconds: HistogramVec,
}

#[cfg(feature = "metrics")]
impl CountersignMetrics {
    /// Create a new CountersignMetrics instance with the given registry.
    ///
    /// Registers all metrics with the provided Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metrics fail to register (e.g., duplicate
    /// registration).
    pub fn new(registry: Registry) -> Result<Self> {
        // Gauge: requests awaiting approval
        let pending_requests = GaugeVec::new(
            Opts::new(
                "countersign_pending_requests",
                "Number of change requests awaiting approval",
            ),
            &["category"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create pending_requests gauge: {}", e))?;

        // Counter: decisions by outcome
        let decisions_total = CounterVec::new(
            Opts::new(
                "countersign_decisions_recorded_total",
                "Total number of approver decisions recorded by outcome",
            ),
            &["category", "decision"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create decisions_total counter: {}", e))?;

        // Counter: effect application failures
        let effect_failures_total = CounterVec::new(
            Opts::new(
                "countersign_effect_failures_total",
                "Total number of failed effect applications for approved requests",
            ),
            &["category"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create effect_failures_total counter: {}", e))?;

        // Histogram: submission-to-terminal latency
        let time_to_decision_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "countersign_time_to_decision_seconds",
                "Time from request submission to terminal state in seconds",
            )
            .buckets(vec![
                60.0, 300.0, 900.0, 1800.0, 3600.0, 14400.0, 43200.0, 86400.0,
            ]),
            &["category", "outcome"],
        )
        .map_err(|e| anyhow::anyhow!("Failed to create time_to_decision histogram: {}", e))?;

        // Register all metrics
        registry
            .register(Box::new(pending_requests.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register pending_requests: {}", e))?;
        registry
            .register(Box::new(decisions_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register decisions_total: {}", e))?;
        registry
            .register(Box::new(effect_failures_total.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register effect_failures_total: {}", e))?;
        registry
            .register(Box::new(time_to_decision_seconds.clone()))
            .map_err(|e| anyhow::anyhow!("Failed to register time_to_decision_seconds: {}", e))?;

        Ok(Self {
            registry,
            pending_requests,
            decisions_total,
            effect_failures_total,
            time_to_decision_seconds,
        })
    }

    /// Get the underlying Prometheus registry.
    ///
    /// Useful for exporting metrics via HTTP endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Set the current number of pending requests for a category.
    pub fn set_pending_requests(&self, category: &str, count: usize) {
        self.pending_requests
            .with_label_values(&[category])
            .set(count as f64);
    }

    /// Record an approver decision.
    ///
    /// The decision label should be a low-cardinality value like "approve"
    /// or "reject".
    pub fn record_decision(&self, category: &str, decision: &str) {
        self.decisions_total
            .with_label_values(&[category, decision])
            .inc();
    }

    /// Record a request reaching a terminal state.
    ///
    /// Updates the time-to-decision histogram with the submission-to-terminal
    /// latency.
    pub fn record_terminal(&self, category: &str, outcome: &str, elapsed: Duration) {
        self.time_to_decision_seconds
            .with_label_values(&[category, outcome])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a failed effect application.
    pub fn record_effect_failure(&self, category: &str) {
        self.effect_failures_total
            .with_label_values(&[category])
            .inc();
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let registry = Registry::new();
        let _metrics = CountersignMetrics::new(registry.clone()).unwrap();

        // Verify metrics are registered
        let families = registry.gather();
        assert!(families.len() >= 4);

        let metric_names: Vec<String> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(metric_names.contains(&"countersign_pending_requests".to_string()));
        assert!(metric_names.contains(&"countersign_decisions_recorded_total".to_string()));
        assert!(metric_names.contains(&"countersign_effect_failures_total".to_string()));
    }

    #[test]
    fn test_record_decision_metrics() {
        let registry = Registry::new();
        let metrics = CountersignMetrics::new(registry.clone()).unwrap();

        metrics.set_pending_requests("user-management", 3);
        metrics.record_decision("user-management", "approve");
        metrics.record_decision("user-management", "reject");
        metrics.record_terminal("user-management", "approved", Duration::from_secs(120));

        let families = registry.gather();

        let decisions = families
            .iter()
            .find(|f| f.get_name() == "countersign_decisions_recorded_total")
            .expect("decisions_recorded_total metric not found");

        let approvals = decisions
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "decision" && l.get_value() == "approve")
            })
            .expect("approve decision not found");

        assert_eq!(approvals.get_counter().get_value(), 1.0);

        let pending = families
            .iter()
            .find(|f| f.get_name() == "countersign_pending_requests")
            .expect("pending_requests metric not found");

        assert_eq!(pending.get_metric()[0].get_gauge().get_value(), 3.0);
    }

    #[test]
    fn test_effect_failure_metrics() {
        let registry = Registry::new();
        let metrics = CountersignMetrics::new(registry.clone()).unwrap();

        metrics.record_effect_failure("security-configuration");
        metrics.record_effect_failure("security-configuration");

        let families = registry.gather();
        let failures = families
            .iter()
            .find(|f| f.get_name() == "countersign_effect_failures_total")
            .expect("effect_failures_total metric not found");

        assert_eq!(failures.get_metric()[0].get_counter().get_value(), 2.0);
    }
}
