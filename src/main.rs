use std::sync::Arc;

use anyhow::{Error, Result};
use notification_service::{
    api::{AppState, run_api_server},
    clients::{
        database::{DatabaseClient, NotificationStore},
        directory::{DirectoryClient, RecipientDirectory},
        health::HealthChecker,
        rbmq::RabbitMqClient,
    },
    config::Config,
    events::{ConsumerStatus, EventProcessor, run_consumer},
    hub::Hub,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;

    let store: Arc<dyn NotificationStore> =
        Arc::new(DatabaseClient::connect(&config.database_url).await?);
    let directory: Arc<dyn RecipientDirectory> = Arc::new(DirectoryClient::new(
        &config.user_service_url,
        config.directory_timeout(),
        config.directory_retry_config(),
    )?);

    let (hub, _hub_task) = Hub::spawn(config.hub_command_capacity);

    let rabbitmq = RabbitMqClient::connect_with_retry(&config).await?;
    let processor = EventProcessor::new(
        store.clone(),
        directory.clone(),
        hub.clone(),
        config.elevated_role.clone(),
    );

    let consumer_status = ConsumerStatus::default();
    let consumer_task = tokio::spawn({
        let status = consumer_status.clone();
        async move {
            if let Err(e) = run_consumer(rabbitmq, processor, status).await {
                error!(error = %e, "Event consumer stopped");
            }
        }
    });

    let state = Arc::new(AppState {
        store: store.clone(),
        hub: hub.clone(),
        health_checker: HealthChecker::new(store, directory, hub, consumer_status),
        connection_settings: config.connection_settings(),
    });

    let served = run_api_server(state, config.server_port).await;

    // Pending pushes are abandoned; every notification is already stored.
    consumer_task.abort();
    let _ = consumer_task.await;

    info!("Notification service stopped");

    served
}
