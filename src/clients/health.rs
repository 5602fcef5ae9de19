use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{database::NotificationStore, directory::RecipientDirectory},
    events::ConsumerStatus,
    hub::HubHandle,
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
};

pub struct HealthChecker {
    store: Arc<dyn NotificationStore>,
    directory: Arc<dyn RecipientDirectory>,
    hub: HubHandle,
    consumer: ConsumerStatus,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        directory: Arc<dyn RecipientDirectory>,
        hub: HubHandle,
        consumer: ConsumerStatus,
    ) -> Self {
        Self {
            store,
            directory,
            hub,
            consumer,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert(
            "recipient_directory".to_string(),
            self.check_directory().await,
        );
        checks.insert("event_consumer".to_string(), self.check_consumer());

        HealthCheckResponse {
            status: determine_overall_status(&checks),
            timestamp: Utc::now(),
            connections: self.hub.connection_count().await,
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.store.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(e.to_string())
            }
        }
    }

    fn check_consumer(&self) -> ServiceHealth {
        if self.consumer.is_running() {
            ServiceHealth::healthy(0)
        } else {
            warn!("Event consumer is not running");
            ServiceHealth::unhealthy("Event consumer is not running".to_string())
        }
    }

    /// The directory only enriches notifications, so losing it degrades
    /// rather than fails the service.
    async fn check_directory(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.directory.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Recipient directory health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Recipient directory health check failed");
                ServiceHealth::degraded(e.to_string())
            }
        }
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    if checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy)
    {
        HealthStatus::Unhealthy
    } else if checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded)
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
