//! Transaction event notifications
//!
//! Fans events out to an ordered channel list. Dispatch is
//! fire-and-forget: the pipeline never waits on delivery and a dead
//! channel costs a log line, nothing more. Ordinary events stop at the
//! first channel that accepts them; kill-switch events go to every
//! channel. When every channel fails, the event is recorded as a
//! CRITICAL audit row instead of vanishing.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::adapters::PostgresStore;
use crate::domain::AuditSeverity;

/// Event names carried in notifications and audit rows.
pub mod events {
    pub const TX_QUEUED: &str = "TX_QUEUED";
    pub const TX_SUBMITTED: &str = "TX_SUBMITTED";
    pub const TX_CONFIRMED: &str = "TX_CONFIRMED";
    pub const TX_FAILED: &str = "TX_FAILED";
    pub const TX_CANCELLED: &str = "TX_CANCELLED";
    pub const TX_EXPIRED: &str = "TX_EXPIRED";
    pub const TX_DOWNGRADED_DELAY: &str = "TX_DOWNGRADED_DELAY";
    pub const POLICY_DENIED: &str = "POLICY_DENIED";
    pub const APPROVAL_REQUESTED: &str = "APPROVAL_REQUESTED";
    pub const APPROVAL_GRANTED: &str = "APPROVAL_GRANTED";
    pub const KILL_SWITCH_ACTIVATED: &str = "KILL_SWITCH_ACTIVATED";
    pub const KILL_SWITCH_ESCALATED: &str = "KILL_SWITCH_ESCALATED";
    pub const KILL_SWITCH_RECOVERED: &str = "KILL_SWITCH_RECOVERED";
}

/// Events delivered to every channel instead of stopping at the first
/// success.
const BROADCAST_EVENTS: [&str; 3] = [
    events::KILL_SWITCH_ACTIVATED,
    events::KILL_SWITCH_ESCALATED,
    events::KILL_SWITCH_RECOVERED,
];

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: String,
    pub wallet_id: Option<Uuid>,
    pub tx_id: Option<Uuid>,
    pub message: String,
}

/// One delivery target. Implementations own their transport and
/// report failure as a plain string; categorizing it is not worth
/// anything on a path that only logs.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, notification: &Notification) -> Result<(), String>;
}

/// Structured-log channel. Always succeeds, always configured, so the
/// daemon runs headless without losing events.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), String> {
        info!(
            event = %notification.event,
            wallet_id = ?notification.wallet_id,
            tx_id = ?notification.tx_id,
            "{}", notification.message
        );
        Ok(())
    }
}

/// Webhook channel: posts the notification as JSON to a configured URL.
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: String) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| {
                crate::error::WardenError::Internal(format!("HTTP client error: {}", e))
            })?;
        Ok(Self { client, url })
    }

    pub fn from_env() -> Option<Self> {
        let url = std::env::var("WARDEN_WEBHOOK_URL").ok()?;
        match Self::new(url) {
            Ok(channel) => {
                info!("Webhook notifications enabled");
                Some(channel)
            }
            Err(e) => {
                error!(error = %e, "webhook channel disabled");
                None
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), String> {
        let resp = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            debug!(event = %notification.event, "Webhook notification sent");
            Ok(())
        } else {
            Err(format!("HTTP {}", resp.status()))
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
    store: PostgresStore,
}

impl Notifier {
    pub fn new(store: PostgresStore, channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: Arc::new(channels),
            store,
        }
    }

    /// Dispatch without waiting. The spawned task owns its whole error
    /// boundary; nothing propagates back to the caller.
    pub fn notify(
        &self,
        event: &str,
        wallet_id: Option<Uuid>,
        tx_id: Option<Uuid>,
        message: impl Into<String>,
    ) {
        let notification = Notification {
            event: event.to_string(),
            wallet_id,
            tx_id,
            message: message.into(),
        };
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.deliver(notification).await;
        });
    }

    async fn deliver(&self, notification: Notification) {
        if self.channels.is_empty() {
            return;
        }

        let delivered = deliver_to_channels(&self.channels, &notification).await;
        if delivered == 0 {
            let result = self
                .store
                .append_audit(
                    "NOTIFICATION_DELIVERY_FAILED",
                    AuditSeverity::Critical,
                    notification.wallet_id,
                    notification.tx_id,
                    json!({
                        "event": notification.event,
                        "channels": self.channels.len(),
                    }),
                )
                .await;
            if let Err(e) = result {
                error!(error = %e, "failed to record notification delivery failure");
            }
        }
    }
}

/// Run the delivery pass and report how many channels accepted the
/// event. Ordinary events stop at the first success; broadcast events
/// try every channel.
async fn deliver_to_channels(
    channels: &[Box<dyn NotificationChannel>],
    notification: &Notification,
) -> usize {
    let broadcast = BROADCAST_EVENTS.contains(&notification.event.as_str());
    let mut delivered = 0usize;
    for channel in channels {
        match channel.deliver(notification).await {
            Ok(()) => {
                delivered += 1;
                if !broadcast {
                    break;
                }
            }
            Err(e) => {
                error!(
                    channel = channel.name(),
                    event = %notification.event,
                    error = %e,
                    "notification delivery failed"
                );
            }
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingChannel {
        fails: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _notification: &Notification) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fails {
                Err("down".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn channel(fails: bool) -> (Box<dyn NotificationChannel>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Box::new(CountingChannel {
                fails,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn notification(event: &str) -> Notification {
        Notification {
            event: event.to_string(),
            wallet_id: None,
            tx_id: None,
            message: "test".to_string(),
        }
    }

    fn ordered_channels(
        specs: &[bool],
    ) -> (Vec<Box<dyn NotificationChannel>>, Vec<Arc<AtomicU32>>) {
        let mut channels = Vec::new();
        let mut counters = Vec::new();
        for &fails in specs {
            let (ch, calls) = channel(fails);
            channels.push(ch);
            counters.push(calls);
        }
        (channels, counters)
    }

    #[tokio::test]
    async fn test_ordinary_event_stops_at_first_success() {
        let (channels, counters) = ordered_channels(&[false, false]);
        let delivered =
            deliver_to_channels(&channels, &notification(events::TX_CONFIRMED)).await;
        assert_eq!(delivered, 1);
        assert_eq!(counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(counters[1].load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ordinary_event_falls_back_past_failure() {
        let (channels, counters) = ordered_channels(&[true, false]);
        let delivered =
            deliver_to_channels(&channels, &notification(events::TX_CONFIRMED)).await;
        assert_eq!(delivered, 1);
        assert_eq!(counters[0].load(Ordering::SeqCst), 1);
        assert_eq!(counters[1].load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_channels_failing_reports_zero() {
        let (channels, _) = ordered_channels(&[true, true]);
        let delivered =
            deliver_to_channels(&channels, &notification(events::TX_FAILED)).await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_kill_switch_event_broadcasts_to_all() {
        let (channels, counters) = ordered_channels(&[false, false, false]);
        let delivered =
            deliver_to_channels(&channels, &notification(events::KILL_SWITCH_ACTIVATED)).await;
        assert_eq!(delivered, 3);
        for calls in &counters {
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_log_channel_always_delivers() {
        let result = LogChannel.deliver(&notification(events::TX_FAILED)).await;
        assert!(result.is_ok());
    }
}
