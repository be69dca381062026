use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;

/// Transport adapter boundary. The pipeline does not retry here; a send
/// failure propagates as a handler error and rides the job queue's backoff.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Client for the HTTP mail relay.
pub struct HttpMailer {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    from_address: String,
}

impl HttpMailer {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|_| anyhow!("Failed to create HTTP client"))?;

        info!(base_url = %config.mail_relay_url, "Mail relay client initialized");

        Ok(Self {
            http_client,
            base_url: config.mail_relay_url.clone(),
            api_key: config.mail_relay_api_key.clone(),
            from_address: config.mail_from_address.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_email(&self, to: &str, subject: &str, html: &str, text: &str) -> Result<()> {
        debug!(to, subject, "Sending email via mail relay");

        let request = SendEmailRequest {
            from: &self.from_address,
            to,
            subject,
            html,
            text,
        };

        let url = format!("{}/v1/send", self.base_url);

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;

        if response.status().is_success() {
            debug!(to, "Email accepted by mail relay");
            Ok(())
        } else {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            Err(anyhow!("Mail relay returned {}: {}", status, error_text))
        }
    }
}
