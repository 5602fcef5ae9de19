//! Bridge from the task event feed to stored, pushed notifications.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use lapin::Consumer;
use tracing::{debug, error, info, warn};

use crate::{
    clients::{
        database::NotificationStore, directory::RecipientDirectory, rbmq::RabbitMqClient,
    },
    hub::HubHandle,
    models::{
        directory::{elevated_recipients, resolve_display_name},
        event::{DomainEvent, EventDecodeError, TaskAssigned, TaskStatusUpdated},
        notification::{DeliveryMessage, Notification},
    },
    utils::format_friendly_timestamp,
};

/// What one event turned into.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingReport {
    pub recipients: usize,
    pub stored: usize,
}

/// Shared flag telling the health endpoint whether events are still flowing.
#[derive(Debug, Clone, Default)]
pub struct ConsumerStatus {
    running: Arc<AtomicBool>,
}

impl ConsumerStatus {
    pub fn mark_running(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct EventProcessor {
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn RecipientDirectory>,
    hub: HubHandle,
    elevated_role: String,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        directory: Arc<dyn RecipientDirectory>,
        hub: HubHandle,
        elevated_role: String,
    ) -> Self {
        Self {
            store,
            directory,
            hub,
            elevated_role,
        }
    }

    pub async fn handle_payload(&self, raw: &[u8]) -> Result<ProcessingReport, EventDecodeError> {
        let event = DomainEvent::decode(raw)?;
        Ok(self.process_event(event).await)
    }

    pub async fn process_event(&self, event: DomainEvent) -> ProcessingReport {
        info!(event_type = %event.kind(), "Processing event");

        let outgoing = match event {
            DomainEvent::TaskAssigned(assigned) => Self::assignment_messages(&assigned),
            DomainEvent::TaskStatusUpdated(update) => self.status_update_messages(&update).await,
            DomainEvent::Unknown(event_type) => {
                warn!(event_type = %event_type, "Unknown event type, ignoring");
                return ProcessingReport::default();
            }
        };

        let mut report = ProcessingReport {
            recipients: outgoing.len(),
            stored: 0,
        };

        for (recipient, message) in outgoing {
            if self.notify(recipient, message).await {
                report.stored += 1;
            }
        }

        report
    }

    fn assignment_messages(assigned: &TaskAssigned) -> Vec<(String, String)> {
        let message = format!("You have been assigned to task: {}", assigned.title);

        assigned
            .assigned_to
            .iter()
            .map(|user_id| (user_id.clone(), message.clone()))
            .collect()
    }

    async fn status_update_messages(&self, update: &TaskStatusUpdated) -> Vec<(String, String)> {
        let assignee_message = format!(
            "Task '{}' status updated to {}",
            update.title, update.status
        );

        let mut outgoing: Vec<(String, String)> = update
            .assigned_to
            .iter()
            .map(|user_id| (user_id.clone(), assignee_message.clone()))
            .collect();

        let users = match self.directory.list_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(
                    error = %e,
                    task_title = %update.title,
                    "Recipient directory unavailable, skipping elevated recipients"
                );
                return outgoing;
            }
        };

        let actor = resolve_display_name(&users, &update.updated_by);
        let when = format_friendly_timestamp(&update.updated_at);
        let alert = format!(
            "ADMIN ALERT: Task '{}' updated to {} by {} at {}",
            update.title, update.status, actor, when
        );

        outgoing.extend(
            elevated_recipients(&users, &self.elevated_role)
                .into_iter()
                .map(|user_id| (user_id, alert.clone())),
        );

        outgoing
    }

    /// Store first, then push. The push is attempted whatever the store
    /// outcome and its result is never observed.
    async fn notify(&self, recipient: String, message: String) -> bool {
        let notification = Notification::new(recipient, message);

        let stored = match self.store.insert(&notification).await {
            Ok(()) => {
                debug!(
                    user_id = %notification.user_id,
                    notification_id = %notification.id,
                    "Notification saved"
                );
                true
            }
            Err(e) => {
                warn!(
                    user_id = %notification.user_id,
                    error = %e,
                    "Failed to save notification"
                );
                false
            }
        };

        self.hub.deliver(&DeliveryMessage::new(notification)).await;

        stored
    }
}

/// Drains the event feed until the broker closes the consumer. `status`
/// reports running only while deliveries are being read.
pub async fn run_consumer(
    rabbitmq: RabbitMqClient,
    processor: EventProcessor,
    status: ConsumerStatus,
) -> Result<(), Error> {
    let consumer = rabbitmq.create_consumer().await?;

    status.mark_running();
    info!("Event consumer started");

    let result = drain_consumer(&rabbitmq, consumer, &processor).await;

    status.mark_stopped();

    result
}

async fn drain_consumer(
    rabbitmq: &RabbitMqClient,
    mut consumer: Consumer,
    processor: &EventProcessor,
) -> Result<(), Error> {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, "Event feed delivery failed");
                return Err(anyhow!("Event feed closed: {}", e));
            }
        };

        match processor.handle_payload(&delivery.data).await {
            Ok(report) => {
                info!(
                    recipients = report.recipients,
                    stored = report.stored,
                    "Event processed"
                );
                rabbitmq.acknowledge(delivery.delivery_tag).await;
            }
            Err(e) => {
                warn!(error = %e, "Discarding undecodable event");
                rabbitmq.reject(delivery.delivery_tag, false).await;
            }
        }
    }

    warn!("Event consumer stream ended");

    Err(anyhow!("Event feed ended"))
}
