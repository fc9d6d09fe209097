//! Notification outbox delivery
//!
//! Pending notifications are POSTed as JSON to the configured webhook. With
//! no webhook they are written to the log and marked delivered.

use anyhow::{Context, Result};
use deskline_api::Notification;
use deskline_config::ServiceConfig;
use deskline_store::{AuditEvent, AuditEventType, Store};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notifications drained per tick
const BATCH_SIZE: usize = 50;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub abandoned: usize,
}

struct Webhook {
    client: reqwest::Client,
    url: String,
}

pub struct Delivery {
    store: Arc<dyn Store>,
    webhook: Option<Webhook>,
    max_attempts: u32,
}

impl Delivery {
    pub fn new(store: Arc<dyn Store>, config: &ServiceConfig) -> Result<Self> {
        let webhook = match &config.webhook_url {
            Some(url) => {
                let client = reqwest::Client::builder()
                    .timeout(config.webhook_timeout)
                    .build()
                    .context("Failed to build webhook client")?;
                info!(url = %url, "Webhook delivery enabled");
                Some(Webhook {
                    client,
                    url: url.clone(),
                })
            }
            None => {
                info!("No webhook configured, notifications will be logged");
                None
            }
        };

        Ok(Self {
            store,
            webhook,
            max_attempts: config.notification_max_attempts,
        })
    }

    /// Try every pending notification once
    pub async fn drain(&self) -> Result<DrainReport> {
        let pending = self
            .store
            .pending_notifications(self.max_attempts, BATCH_SIZE)
            .context("Failed to read notification outbox")?;
        let mut report = DrainReport::default();

        for notification in pending {
            match self.send(&notification).await {
                Ok(()) => {
                    self.store
                        .mark_notification_delivered(notification.id, deskline_util::now())
                        .context("Failed to mark notification delivered")?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let error = format!("{:#}", e);
                    let attempts = self
                        .store
                        .mark_notification_failed(notification.id, &error)
                        .context("Failed to record delivery failure")?;
                    report.failed += 1;

                    if attempts >= self.max_attempts {
                        warn!(
                            notification_id = %notification.id,
                            attempts,
                            error = %error,
                            "Giving up on notification"
                        );
                        if let Err(e) = self.store.append_audit(AuditEvent::new(
                            AuditEventType::NotificationAbandoned {
                                notification_id: notification.id,
                                attempts,
                                error,
                            },
                        )) {
                            warn!(
                                notification_id = %notification.id,
                                error = %e,
                                "Failed to record abandoned notification"
                            );
                        }
                        report.abandoned += 1;
                    } else {
                        debug!(notification_id = %notification.id, attempts, error = %error, "Delivery failed, will retry");
                    }
                }
            }
        }

        Ok(report)
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let Some(webhook) = &self.webhook else {
            info!(
                notification_id = %notification.id,
                ticket_id = ?notification.ticket_id,
                target = %notification.target,
                recipient = ?notification.recipient,
                message = %notification.message,
                "Notification"
            );
            return Ok(());
        };

        webhook
            .client
            .post(&webhook.url)
            .json(notification)
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook rejected notification")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_api::NotifyTarget;
    use deskline_store::SqliteStore;
    use deskline_util::{NotificationId, TicketId};

    fn queue(store: &Arc<dyn Store>, message: &str) {
        store
            .enqueue_notification(&Notification {
                id: NotificationId::new(0),
                ticket_id: Some(TicketId::new(1)),
                target: NotifyTarget::Webhook,
                recipient: None,
                message: message.into(),
                created_at: deskline_util::now(),
                attempts: 0,
                last_error: None,
                delivered_at: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn without_webhook_notifications_are_logged_and_delivered() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        queue(&store, "one");
        queue(&store, "two");

        let delivery = Delivery::new(store.clone(), &ServiceConfig::default()).unwrap();
        let report = delivery.drain().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert!(store.pending_notifications(5, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_webhook_retries_then_abandons() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        queue(&store, "one");

        let config = ServiceConfig {
            // Nothing listens on the discard port
            webhook_url: Some("http://127.0.0.1:9/hook".into()),
            webhook_timeout: std::time::Duration::from_secs(2),
            notification_max_attempts: 2,
            ..ServiceConfig::default()
        };
        let delivery = Delivery::new(store.clone(), &config).unwrap();

        let first = delivery.drain().await.unwrap();
        assert_eq!((first.failed, first.abandoned), (1, 0));

        let second = delivery.drain().await.unwrap();
        assert_eq!((second.failed, second.abandoned), (1, 1));

        let third = delivery.drain().await.unwrap();
        assert_eq!(third, DrainReport::default());

        let audits = store.get_recent_audits(10).unwrap();
        assert!(audits
            .iter()
            .any(|a| matches!(a.event, AuditEventType::NotificationAbandoned { attempts: 2, .. })));
    }
}
