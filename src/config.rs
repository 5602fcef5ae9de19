use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::{hub::connection::ConnectionSettings, models::retry::RetryConfig};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_event_queue_name")]
    pub event_queue_name: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,

    pub database_url: String,

    pub user_service_url: String,
    #[serde(default = "default_directory_timeout_seconds")]
    pub directory_timeout_seconds: u64,
    #[serde(default = "default_directory_max_retry_attempts")]
    pub directory_max_retry_attempts: u32,
    #[serde(default = "default_elevated_role")]
    pub elevated_role: String,

    #[serde(default = "default_hub_command_capacity")]
    pub hub_command_capacity: usize,
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    #[serde(default = "default_ws_ping_interval_seconds")]
    pub ws_ping_interval_seconds: u64,
    #[serde(default = "default_ws_write_timeout_seconds")]
    pub ws_write_timeout_seconds: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    /// Directory lookups run inline in the consumer loop, so they get their
    /// own attempt budget instead of the broker's.
    pub fn directory_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.directory_max_retry_attempts,
            ..self.retry_config()
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            outbound_capacity: self.outbound_queue_capacity,
            ping_interval: Duration::from_secs(self.ws_ping_interval_seconds),
            write_timeout: Duration::from_secs(self.ws_write_timeout_seconds),
        }
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_seconds)
    }
}

fn default_event_queue_name() -> String {
    "task_notifications".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_directory_timeout_seconds() -> u64 {
    2
}

fn default_directory_max_retry_attempts() -> u32 {
    1
}

fn default_elevated_role() -> String {
    "admin".to_string()
}

fn default_hub_command_capacity() -> usize {
    1024
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_ws_ping_interval_seconds() -> u64 {
    30
}

fn default_ws_write_timeout_seconds() -> u64 {
    10
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    5000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_server_port() -> u16 {
    8083
}
