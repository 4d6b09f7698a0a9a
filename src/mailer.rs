use std::time::Duration;

use async_trait::async_trait;

use crate::common::env_config::MailConfig;
use crate::common::error::{AppError, Res};

/// Outbound email transport. Callers treat dispatch as best-effort.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, recipients: &[String], body: &[u8]) -> Res<()>;
}

/// Sends mail through an HTTP mail API (Resend-style JSON endpoint).
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &MailConfig, timeout: Duration) -> Self {
        HttpMailer {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build mail HTTP client"),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }
}

#[async_trait]
impl EmailTransport for HttpMailer {
    async fn send(&self, recipients: &[String], body: &[u8]) -> Res<()> {
        let text = String::from_utf8_lossy(body);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "from": self.from,
                "to": recipients,
                "subject": "Subscription renewal reminder",
                "text": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Mail API returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
