use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;

use crate::common::error::{AppError, Res};

/// Verification result fetched per request from the identity provider.
/// Never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdentity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Resolves a bearer credential to the identity it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, access_token: &str) -> Res<GoogleIdentity>;
}

/// Queries the Google OAuth2 userinfo endpoint.
pub struct GoogleVerifier {
    client: reqwest::Client,
    userinfo_url: String,
}

impl GoogleVerifier {
    pub fn new(userinfo_url: String, timeout: Duration) -> Self {
        GoogleVerifier {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build identity HTTP client"),
            userinfo_url,
        }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, access_token: &str) -> Res<GoogleIdentity> {
        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Identity provider returned {}: {}", status, body);
            return Err(AppError::Unauthorized(
                "Unable to find a Google user account with the provided authentication token."
                    .to_string(),
            ));
        }

        let identity = response.json::<GoogleIdentity>().await?;
        info!("Verified identity {}", identity.id);
        Ok(identity)
    }
}
