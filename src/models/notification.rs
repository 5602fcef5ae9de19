use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durably stored, per-recipient rendering of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            message: message.into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

/// Frame pushed over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMessage {
    #[serde(rename = "userId")]
    pub recipient_id: String,
    pub content: Notification,
}

impl DeliveryMessage {
    pub fn new(notification: Notification) -> Self {
        Self {
            recipient_id: notification.user_id.clone(),
            content: notification,
        }
    }
}
