//! Alerting module for webhook notifications
//!
//! Alerts are dispatched asynchronously to Slack and to generic JSON
//! webhooks. Synchronous code queues them through [`AlertQueue`].

use crate::config::{AlertConfig, SlackConfig, WebhookConfig};
use crate::models::{Alert, Severity};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 100;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert channel closed")]
    ChannelClosed,
}

/// Async alert dispatcher
///
/// Runs as a tokio task, receiving alerts from a channel and sending them
/// to every configured channel.
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create the channel connecting an [`AlertQueue`] to [`run`](Self::run)
    pub fn create_channel() -> (mpsc::Sender<Alert>, mpsc::Receiver<Alert>) {
        mpsc::channel(QUEUE_CAPACITY)
    }

    /// Whether an alert passes the enabled flag and severity floor
    pub fn should_dispatch(&self, alert: &Alert) -> bool {
        self.config.enabled && alert.severity >= self.config.min_severity
    }

    /// Run the alert dispatch loop until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<Alert>) {
        log::info!("Alert dispatcher started");

        while let Some(alert) = rx.recv().await {
            if !self.should_dispatch(&alert) {
                log::debug!(
                    "Skipping alert {} for {} (severity {}, min {})",
                    alert.rule,
                    alert.user_id,
                    alert.severity,
                    self.config.min_severity
                );
                continue;
            }

            log::info!(
                "Dispatching alert: {} for {} (severity {})",
                alert.rule,
                alert.user_id,
                alert.severity
            );

            if let Err(e) = self.dispatch_alert(&alert).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Dispatch an alert to all configured channels
    ///
    /// Every channel is attempted; the first failure is returned.
    async fn dispatch_alert(&self, alert: &Alert) -> Result<(), AlertError> {
        let mut first_error = None;

        if let Some(ref slack) = self.config.slack {
            if let Err(e) = self.send_slack_alert(slack, alert).await {
                log::error!("Slack alert failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, alert).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_slack_alert(&self, config: &SlackConfig, alert: &Alert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&slack_payload(config, alert))
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Slack returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        alert: &Alert,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(alert).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

fn slack_payload(config: &SlackConfig, alert: &Alert) -> serde_json::Value {
    let (emoji, color) = match alert.severity {
        Severity::High => (":rotating_light:", "danger"),
        Severity::Medium => (":warning:", "warning"),
        Severity::Low => (":information_source:", "good"),
    };

    serde_json::json!({
        "channel": config.channel,
        "username": config.username.as_deref().unwrap_or("Heimdall"),
        "icon_emoji": ":shield:",
        "attachments": [{
            "color": color,
            "title": format!("{} {}", emoji, alert.rule),
            "fields": [
                { "title": "User", "value": &alert.user_id, "short": true },
                { "title": "Email", "value": &alert.email, "short": true },
                { "title": "Severity", "value": alert.severity.to_string(), "short": true },
                { "title": "IP", "value": &alert.ip, "short": true },
                { "title": "Location", "value": &alert.location, "short": true },
            ],
            "text": &alert.description,
            "ts": alert.timestamp.timestamp(),
        }]
    })
}

/// Synchronous alert queue for use in sync code
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<Alert>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<Alert>) -> Self {
        AlertQueue { tx }
    }

    /// Queue an alert for dispatch without blocking
    ///
    /// Alerts are dropped with a warning when the queue is full or closed.
    pub fn queue_alert(&self, alert: Alert) {
        if let Err(e) = self.tx.try_send(alert) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

    pub async fn queue_alert_async(&self, alert: Alert) -> Result<(), AlertError> {
        self.tx
            .send(alert)
            .await
            .map_err(|_| AlertError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn create_test_alert(severity: Severity) -> Alert {
        Alert {
            rule: "brute_force".to_string(),
            severity,
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            ip: "41.202.10.1".to_string(),
            location: "Abidjan, CI".to_string(),
            description: "5 failed attempts from 1 source IP(s): 41.202.10.1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap(),
        }
    }

    fn config(enabled: bool, min_severity: Severity) -> AlertConfig {
        AlertConfig {
            enabled,
            min_severity,
            slack: None,
            webhooks: vec![],
        }
    }

    #[tokio::test]
    async fn test_alert_queue_send() {
        let (tx, mut rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);
        assert!(!queue.is_closed());

        queue.queue_alert(create_test_alert(Severity::High));

        let received = rx.recv().await;
        assert_eq!(received.unwrap().rule, "brute_force");
    }

    #[tokio::test]
    async fn test_alert_queue_async_send() {
        let (tx, mut rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);

        queue
            .queue_alert_async(create_test_alert(Severity::Low))
            .await
            .unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (tx, rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);
        drop(rx);

        assert!(queue.is_closed());
        // Dropped silently
        queue.queue_alert(create_test_alert(Severity::High));
        assert!(matches!(
            queue.queue_alert_async(create_test_alert(Severity::High)).await,
            Err(AlertError::ChannelClosed)
        ));
    }

    #[test]
    fn test_severity_filtering() {
        let dispatcher = AlertDispatcher::new(config(true, Severity::Medium));
        assert!(!dispatcher.should_dispatch(&create_test_alert(Severity::Low)));
        assert!(dispatcher.should_dispatch(&create_test_alert(Severity::Medium)));
        assert!(dispatcher.should_dispatch(&create_test_alert(Severity::High)));

        let disabled = AlertDispatcher::new(config(false, Severity::Low));
        assert!(!disabled.should_dispatch(&create_test_alert(Severity::High)));
    }

    #[test]
    fn test_slack_payload() {
        let slack = SlackConfig {
            webhook_url: "https://hooks.slack.com/services/T000/B000/XXX".to_string(),
            channel: Some("#security".to_string()),
            username: None,
        };
        let payload = slack_payload(&slack, &create_test_alert(Severity::High));

        assert_eq!(payload["channel"], "#security");
        assert_eq!(payload["username"], "Heimdall");
        assert_eq!(payload["attachments"][0]["color"], "danger");
        assert_eq!(payload["attachments"][0]["title"], ":rotating_light: brute_force");
        assert_eq!(payload["attachments"][0]["ts"], 1715331600);
    }

    #[tokio::test]
    async fn test_dispatcher_stops_when_senders_dropped() {
        let dispatcher = AlertDispatcher::new(config(false, Severity::Low));
        let (tx, rx) = AlertDispatcher::create_channel();
        let queue = AlertQueue::new(tx);
        queue.queue_alert(create_test_alert(Severity::High));
        drop(queue);

        // Disabled, so nothing is sent and the loop ends once the channel drains
        dispatcher.run(rx).await;
    }
}
