use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::models::notification::Notification;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id UUID PRIMARY KEY,
        user_id TEXT NOT NULL,
        message TEXT NOT NULL,
        is_read BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS notifications_user_id_idx ON notifications (user_id);
"#;

/// Durable record of notifications, queried by recipient.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), Error>;

    /// Newest first.
    async fn find_by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, Error>;

    /// Returns `false` when no notification has this id.
    async fn mark_as_read(&self, id: Uuid) -> Result<bool, Error>;

    async fn health_check(&self) -> Result<(), Error>;
}

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to prepare notifications schema: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    fn notification_from_row(row: &Row) -> Result<Notification, Error> {
        Ok(Notification {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            message: row.try_get("message")?,
            is_read: row.try_get("is_read")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn insert(&self, notification: &Notification) -> Result<(), Error> {
        self.client
            .execute(
                r#"
                INSERT INTO notifications (id, user_id, message, is_read, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[
                    &notification.id,
                    &notification.user_id,
                    &notification.message,
                    &notification.is_read,
                    &notification.created_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    notification_id = %notification.id,
                    "Failed to write notification to database"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        debug!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            "Notification written to database"
        );

        Ok(())
    }

    async fn find_by_recipient(&self, user_id: &str) -> Result<Vec<Notification>, Error> {
        let rows = self
            .client
            .query(
                r#"
                SELECT id, user_id, message, is_read, created_at
                FROM notifications
                WHERE user_id = $1
                ORDER BY created_at DESC
                "#,
                &[&user_id],
            )
            .await
            .map_err(|e| anyhow!("Database read failed: {}", e))?;

        rows.iter().map(Self::notification_from_row).collect()
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<bool, Error> {
        let updated = self
            .client
            .execute(
                "UPDATE notifications SET is_read = TRUE WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| anyhow!("Database update failed: {}", e))?;

        Ok(updated > 0)
    }

    async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}
