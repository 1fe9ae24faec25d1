//! Alert types and channel dispatch.
//!
//! Dispatch is fire-and-forget: the triggering code path spawns a detached
//! task and never waits on delivery. Channel failures are logged and
//! swallowed; they never reach the caller of a `record_*` method.

use crate::config::AlertConfig;
use crate::error::DualDbError;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Per-channel delivery deadline. A hung webhook must not pin the detached
/// dispatch task forever.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    HighFailureRate,
    SyncGapThresholdExceeded,
    HighLatencyDetected,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighFailureRate => "HIGH_FAILURE_RATE",
            Self::SyncGapThresholdExceeded => "SYNC_GAP_THRESHOLD_EXCEEDED",
            Self::HighLatencyDetected => "HIGH_LATENCY_DETECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// A structured alert as posted to every configured channel.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            alert_type,
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            details,
        }
    }
}

/// Posts `alert` to every configured channel concurrently, swallowing and
/// logging individual channel failures. Intended to run inside a detached
/// task; returns nothing.
pub(crate) async fn dispatch_to_channels(
    client: &reqwest::Client,
    config: &AlertConfig,
    alert: &Alert,
) {
    let mut deliveries: Vec<BoxFuture<'_, Result<(), String>>> = Vec::new();

    if let Some(url) = &config.webhook_url {
        deliveries.push(Box::pin(send_channel(
            "webhook",
            post_webhook(client, url, alert),
        )));
    }
    if let Some(url) = &config.slack_webhook_url {
        deliveries.push(Box::pin(send_channel("slack", post_slack(client, url, alert))));
    }
    if let Some(recipient) = &config.email {
        // Placeholder channel: no delivery backend is wired up.
        info!(
            "Email alert to {} not dispatched (channel not implemented): {}",
            recipient, alert.message
        );
    }

    for result in futures::future::join_all(deliveries).await {
        if let Err(e) = result {
            error!("{}", DualDbError::AlertDispatch(e));
        }
    }
}

async fn send_channel<F>(channel: &str, delivery: F) -> Result<(), String>
where
    F: std::future::Future<Output = Result<(), String>>,
{
    match tokio::time::timeout(DISPATCH_TIMEOUT, delivery).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{channel} channel: {e}")),
        Err(_) => Err(format!(
            "{channel} channel: timed out after {}s",
            DISPATCH_TIMEOUT.as_secs()
        )),
    }
}

async fn post_webhook(
    client: &reqwest::Client,
    url: &str,
    alert: &Alert,
) -> Result<(), String> {
    let response = client
        .post(url)
        .json(alert)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("unexpected status {}", response.status()));
    }
    Ok(())
}

/// Slack incoming webhooks take a block-based payload wrapping the alert.
async fn post_slack(client: &reqwest::Client, url: &str, alert: &Alert) -> Result<(), String> {
    let payload = serde_json::json!({
        "text": format!("[{}] {}", alert.severity.as_str(), alert.message),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("Database Alert: {}", alert.alert_type.as_str()),
                }
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Severity:* {}\n*Time:* {}\n*Message:* {}",
                        alert.severity.as_str(),
                        alert.timestamp.to_rfc3339(),
                        alert.message
                    ),
                }
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("```{}```", alert.details),
                }
            }
        ]
    });

    let response = client
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("unexpected status {}", response.status()));
    }
    Ok(())
}

/// Logs an alert at a level matching its severity. Always called, whether or
/// not any channel is configured.
pub(crate) fn log_alert(alert: &Alert) {
    match alert.severity {
        AlertSeverity::Critical | AlertSeverity::High => {
            error!(
                "🚨 [{}] {}: {}",
                alert.severity.as_str(),
                alert.alert_type.as_str(),
                alert.message
            );
        }
        AlertSeverity::Medium | AlertSeverity::Low => {
            warn!(
                "⚠️ [{}] {}: {}",
                alert.severity.as_str(),
                alert.alert_type.as_str(),
                alert.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serializes_with_type_field() {
        let alert = Alert::new(
            AlertType::HighFailureRate,
            AlertSeverity::Critical,
            "failure rate 50% exceeds 10%",
            serde_json::json!({"operation": "create"}),
        );
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "HIGH_FAILURE_RATE");
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["details"]["operation"], "create");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
    }
}
