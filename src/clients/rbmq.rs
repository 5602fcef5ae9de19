use anyhow::{Error, Result, anyhow};
use lapin::{
    Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{info, warn};

use crate::{config::Config, utils::retry_with_backoff};

pub struct RabbitMqClient {
    _connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl RabbitMqClient {
    /// Establishing the subscription is the one startup-fatal step, so it is
    /// retried with backoff before giving up.
    pub async fn connect_with_retry(config: &Config) -> Result<Self, Error> {
        retry_with_backoff(&config.retry_config(), || Self::connect(config)).await
    }

    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        channel
            .queue_declare(
                &config.event_queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare event queue: {}", e))?;

        info!(queue = %config.event_queue_name, "RabbitMQ event queue declared");

        Ok(Self {
            _connection: connection,
            channel,
            queue_name: config.event_queue_name.clone(),
        })
    }

    pub async fn create_consumer(&self) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "notification_worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {}", e))?;

        info!(queue = %self.queue_name, "Consumer created for event queue");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) {
        if let Err(e) = self
            .channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
        {
            warn!(delivery_tag, error = %e, "Failed to acknowledge event");
        }
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) {
        if let Err(e) = self
            .channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
        {
            warn!(delivery_tag, error = %e, "Failed to reject event");
        }
    }
}
