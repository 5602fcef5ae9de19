use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    models::{directory::DirectoryUser, retry::RetryConfig},
    utils::retry_with_backoff,
};

/// Source of the user list used for broadcast fan-out and actor names.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, Error>;

    async fn health_check(&self) -> Result<(), Error>;
}

pub struct DirectoryClient {
    http_client: Client,
    base_url: String,
    retry_config: RetryConfig,
}

impl DirectoryClient {
    pub fn new(base_url: &str, timeout: Duration, retry_config: RetryConfig) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        let base_url = base_url.trim_end_matches('/').to_string();

        info!(base_url = %base_url, "Recipient directory client initialized");

        Ok(Self {
            http_client,
            base_url,
            retry_config,
        })
    }

    fn users_url(&self) -> String {
        format!("{}/users", self.base_url)
    }

    async fn fetch_users_once(http_client: Client, url: String) -> Result<Vec<DirectoryUser>, String> {
        let response = http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();

        if !status.is_success() {
            return Err(format!("Recipient directory returned status {}", status));
        }

        response
            .json::<Vec<DirectoryUser>>()
            .await
            .map_err(|e| format!("Failed to parse user list: {}", e))
    }
}

#[async_trait]
impl RecipientDirectory for DirectoryClient {
    async fn list_users(&self) -> Result<Vec<DirectoryUser>, Error> {
        let url = self.users_url();

        debug!(url = %url, "Fetching user list from recipient directory");

        let users = retry_with_backoff(&self.retry_config, || {
            Self::fetch_users_once(self.http_client.clone(), url.clone())
        })
        .await
        .map_err(|e| anyhow!("Failed to fetch user list: {}", e))?;

        debug!(user_count = users.len(), "User list fetched");

        Ok(users)
    }

    async fn health_check(&self) -> Result<(), Error> {
        Self::fetch_users_once(self.http_client.clone(), self.users_url())
            .await
            .map(|_| ())
            .map_err(|e| anyhow!(e))
    }
}
