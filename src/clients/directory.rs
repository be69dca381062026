use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;

/// Read-only lookup against the external user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `None` when the user is unknown or has no stored contact address;
    /// callers treat that as a permanent no-op, not an error.
    async fn contact_email(&self, user_id: Uuid) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct ContactResponse {
    email: Option<String>,
}

pub struct HttpDirectory {
    http_client: Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.directory_service_url, "User directory client initialized");

        Ok(Self {
            http_client,
            base_url: config.directory_service_url.clone(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpDirectory {
    async fn contact_email(&self, user_id: Uuid) -> Result<Option<String>> {
        let url = format!("{}/api/v1/users/{}/contact", self.base_url, user_id);

        debug!(user_id = %user_id, "Looking up contact email");

        let response = self.http_client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let contact: ContactResponse = response
                    .json()
                    .await
                    .map_err(|e| anyhow!("Failed to parse directory response: {}", e))?;
                Ok(contact.email)
            }
            status => Err(anyhow!("User directory returned status {}", status)),
        }
    }
}
