//! Database monitoring and alerting.
//!
//! The monitor ingests dual-write results, sync statuses and latencies as
//! metric points, keeps a bounded in-memory window of them, and fires alerts
//! when rate-based or gap-based thresholds are breached. It is intentionally
//! not a time-series database; forward the points to one for long-term
//! retention.

mod alerts;

pub use alerts::{Alert, AlertSeverity, AlertType};

use crate::config::AlertConfig;
use crate::error::DualDbError;
use crate::manager::DualWriteResult;
use crate::store::StoreRole;
use crate::verify::SyncStatus;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Maximum number of metric points retained (FIFO eviction).
const MAX_METRICS_HISTORY: usize = 1000;
/// Maximum number of recent alerts retained for dashboards.
const MAX_ALERT_HISTORY: usize = 100;
/// Trailing window for failure-rate evaluation.
const FAILURE_RATE_WINDOW_MINUTES: i64 = 5;
/// Minimum samples before a failure rate is evaluated at all; avoids false
/// positives on low-traffic operations.
const MIN_FAILURE_RATE_SAMPLES: usize = 10;

/// One observation in the rolling metrics window.
#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    /// Dotted namespace, e.g. `database.dual_write.primary_success`.
    pub metric: String,
    pub value: f64,
    pub tags: HashMap<String, String>,
}

/// Singleton-per-process monitor. Holds the only mutable state in the
/// consistency layer: the metric ring buffer and the recent-alert buffer,
/// both behind an async `RwLock` since ingestion arrives from concurrent
/// dual-write completions.
pub struct DatabaseMonitor {
    alert_config: AlertConfig,
    http: reqwest::Client,
    metrics: RwLock<VecDeque<MetricPoint>>,
    alerts: RwLock<VecDeque<Alert>>,
}

impl DatabaseMonitor {
    pub fn new(alert_config: AlertConfig) -> Arc<Self> {
        Arc::new(Self {
            alert_config,
            http: reqwest::Client::new(),
            metrics: RwLock::new(VecDeque::with_capacity(MAX_METRICS_HISTORY)),
            alerts: RwLock::new(VecDeque::with_capacity(MAX_ALERT_HISTORY)),
        })
    }

    async fn record_metric(
        &self,
        metric: &str,
        value: f64,
        tags: HashMap<String, String>,
    ) {
        let point = MetricPoint {
            timestamp: Utc::now(),
            metric: metric.to_string(),
            value,
            tags,
        };
        let mut metrics = self.metrics.write().await;
        if metrics.len() >= MAX_METRICS_HISTORY {
            let excess = metrics.len() - MAX_METRICS_HISTORY + 1;
            metrics.drain(..excess);
        }
        metrics.push_back(point);
    }

    fn operation_tags(operation: &str) -> HashMap<String, String> {
        HashMap::from([("operation".to_string(), operation.to_string())])
    }

    /// Ingests a resolved dual-write result: success points for both sides,
    /// a backup error point when degraded, then a failure-rate evaluation.
    pub async fn record_dual_write_result<T>(
        self: &Arc<Self>,
        operation: &str,
        result: &DualWriteResult<T>,
    ) {
        self.record_metric(
            "database.dual_write.primary_success",
            1.0,
            Self::operation_tags(operation),
        )
        .await;
        self.record_metric(
            "database.dual_write.backup_success",
            if result.backup_success() { 1.0 } else { 0.0 },
            Self::operation_tags(operation),
        )
        .await;

        if let Some(error) = result.backup_error() {
            let mut tags = Self::operation_tags(operation);
            tags.insert("error".to_string(), error.kind().to_string());
            self.record_metric("database.dual_write.backup_errors", 1.0, tags)
                .await;
        }

        self.check_failure_rate(operation).await;
    }

    /// Ingests a primary-side failure. Primary failures surface as errors
    /// rather than results, so the service layer reports them through this
    /// separate path to keep the failure-rate window honest.
    pub async fn record_primary_failure(
        self: &Arc<Self>,
        operation: &str,
        error: &DualDbError,
    ) {
        self.record_metric(
            "database.dual_write.primary_success",
            0.0,
            Self::operation_tags(operation),
        )
        .await;
        let mut tags = Self::operation_tags(operation);
        tags.insert("error".to_string(), error.kind().to_string());
        self.record_metric("database.dual_write.primary_errors", 1.0, tags)
            .await;

        self.check_failure_rate(operation).await;
    }

    /// Evaluates the trailing five-minute failure rate for one operation and
    /// fires at most one `HIGH_FAILURE_RATE` alert per call.
    pub async fn check_failure_rate(self: &Arc<Self>, operation: &str) {
        let Some((rate, samples)) = self
            .failure_rate_in_window(operation, FAILURE_RATE_WINDOW_MINUTES)
            .await
        else {
            return;
        };

        if rate > self.alert_config.thresholds.max_failure_rate {
            self.trigger_alert(Alert::new(
                AlertType::HighFailureRate,
                AlertSeverity::Critical,
                format!(
                    "Operation '{operation}' failure rate {rate:.1}% exceeds threshold {:.1}%",
                    self.alert_config.thresholds.max_failure_rate
                ),
                serde_json::json!({
                    "operation": operation,
                    "failure_rate": rate,
                    "sample_count": samples,
                    "window_minutes": FAILURE_RATE_WINDOW_MINUTES,
                    "threshold": self.alert_config.thresholds.max_failure_rate,
                }),
            ))
            .await;
        }
    }

    /// Failure rate in percent over the trailing window, with the sample
    /// count. `None` below the minimum sample floor.
    async fn failure_rate_in_window(
        &self,
        operation: &str,
        window_minutes: i64,
    ) -> Option<(f64, usize)> {
        let cutoff = Utc::now() - ChronoDuration::minutes(window_minutes);
        let metrics = self.metrics.read().await;
        let samples: Vec<&MetricPoint> = metrics
            .iter()
            .filter(|p| {
                p.timestamp >= cutoff
                    && (p.metric == "database.dual_write.primary_success"
                        || p.metric == "database.dual_write.backup_success")
                    && p.tags.get("operation").map(String::as_str) == Some(operation)
            })
            .collect();

        if samples.len() < MIN_FAILURE_RATE_SAMPLES {
            return None;
        }
        let failures = samples.iter().filter(|p| p.value < 0.5).count();
        Some((failures as f64 / samples.len() as f64 * 100.0, samples.len()))
    }

    /// Public accessor for dashboards: failure rate over an arbitrary
    /// window, without the sample floor.
    pub async fn get_failure_rate(&self, operation: &str, window_minutes: i64) -> Option<f64> {
        let cutoff = Utc::now() - ChronoDuration::minutes(window_minutes);
        let metrics = self.metrics.read().await;
        let (mut total, mut failures) = (0usize, 0usize);
        for point in metrics.iter() {
            if point.timestamp >= cutoff
                && (point.metric == "database.dual_write.primary_success"
                    || point.metric == "database.dual_write.backup_success")
                && point.tags.get("operation").map(String::as_str) == Some(operation)
            {
                total += 1;
                if point.value < 0.5 {
                    failures += 1;
                }
            }
        }
        if total == 0 {
            None
        } else {
            Some(failures as f64 / total as f64 * 100.0)
        }
    }

    /// Ingests a verification pass: aggregate sync metrics plus one
    /// `SYNC_GAP_THRESHOLD_EXCEEDED` alert per table over the gap threshold.
    pub async fn record_sync_status(self: &Arc<Self>, status: &SyncStatus) {
        let out_of_sync = status.reports.iter().filter(|r| !r.in_sync).count();
        let in_sync = status.reports.len() - out_of_sync;

        self.record_metric(
            "database.sync.overall",
            if status.overall { 1.0 } else { 0.0 },
            HashMap::new(),
        )
        .await;
        self.record_metric("database.sync.tables_in_sync", in_sync as f64, HashMap::new())
            .await;
        self.record_metric(
            "database.sync.tables_out_of_sync",
            out_of_sync as f64,
            HashMap::new(),
        )
        .await;
        self.record_metric(
            "database.sync.errors",
            status.errors.len() as f64,
            HashMap::new(),
        )
        .await;

        for report in status.reports.iter().filter(|r| !r.in_sync) {
            if report.difference > self.alert_config.thresholds.max_sync_gap {
                self.trigger_alert(Alert::new(
                    AlertType::SyncGapThresholdExceeded,
                    AlertSeverity::High,
                    format!(
                        "Table '{}' sync gap of {} records exceeds threshold {}",
                        report.table,
                        report.difference,
                        self.alert_config.thresholds.max_sync_gap
                    ),
                    serde_json::json!({
                        "table": report.table,
                        "primary_count": report.primary_count,
                        "backup_count": report.backup_count,
                        "difference": report.difference,
                        "threshold": self.alert_config.thresholds.max_sync_gap,
                    }),
                ))
                .await;
            }
        }
    }

    /// Ingests a single operation latency, alerting when it exceeds the
    /// configured maximum.
    pub async fn record_latency(
        self: &Arc<Self>,
        operation: &str,
        store: StoreRole,
        latency_ms: u64,
    ) {
        let mut tags = Self::operation_tags(operation);
        tags.insert("database".to_string(), store.as_str().to_string());
        self.record_metric("database.operation.latency", latency_ms as f64, tags)
            .await;

        if latency_ms > self.alert_config.thresholds.max_latency_ms {
            self.trigger_alert(Alert::new(
                AlertType::HighLatencyDetected,
                AlertSeverity::Medium,
                format!(
                    "Operation '{operation}' on {store} took {latency_ms}ms (threshold {}ms)",
                    self.alert_config.thresholds.max_latency_ms
                ),
                serde_json::json!({
                    "operation": operation,
                    "database": store,
                    "latency_ms": latency_ms,
                    "threshold_ms": self.alert_config.thresholds.max_latency_ms,
                }),
            ))
            .await;
        }
    }

    /// Logs the alert, records it in the dashboard buffer, and dispatches it
    /// to the configured channels on a detached task. Never blocks on
    /// delivery and never propagates channel failures.
    async fn trigger_alert(self: &Arc<Self>, alert: Alert) {
        alerts::log_alert(&alert);

        {
            let mut history = self.alerts.write().await;
            if history.len() >= MAX_ALERT_HISTORY {
                history.pop_front();
            }
            history.push_back(alert.clone());
        }

        if !self.alert_config.enabled {
            debug!("Alert dispatch disabled, alert logged only");
            return;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            alerts::dispatch_to_channels(&monitor.http, &monitor.alert_config, &alert).await;
        });
    }

    /// Metric points in recording order, optionally filtered to those at or
    /// after `since`. At most the most recent 1000 points are retained.
    pub async fn get_metrics(&self, since: Option<DateTime<Utc>>) -> Vec<MetricPoint> {
        let metrics = self.metrics.read().await;
        match since {
            Some(cutoff) => metrics
                .iter()
                .filter(|p| p.timestamp >= cutoff)
                .cloned()
                .collect(),
            None => metrics.iter().cloned().collect(),
        }
    }

    /// Most recent alerts, newest first.
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().rev().take(limit).cloned().collect()
    }
}
