use crate::errors::{ExchangeEngineError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

#[derive(Debug, Serialize)]
struct VerifyTokenRequest<'a> {
    token: &'a str,
}

/// Stable subject returned by the identity provider for a bearer credential
#[derive(Debug, Clone, Deserialize)]
pub struct IdentitySubject {
    pub subject: String,
    pub email: Option<String>,
}

pub struct IdentityClient {
    base_url: String,
    client: Client,
}

impl IdentityClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap();

        IdentityClient { base_url, client }
    }

    /// Resolve a bearer token to its external subject. An invalid or expired
    /// token is an authentication failure; an unreachable provider is an
    /// upstream failure — neither has ledger side effects.
    pub async fn verify_token(&self, token: &str) -> Result<IdentitySubject> {
        let url = format!("{}/v1/token/verify", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&VerifyTokenRequest { token })
            .send()
            .await
            .map_err(|e| {
                error!("Identity provider unreachable: {}", e);
                ExchangeEngineError::Upstream(format!("Identity verification failed: {}", e))
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeEngineError::AuthFailed(format!(
                "Token rejected by identity provider: {}",
                error_text
            )));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeEngineError::Upstream(format!(
                "Identity provider returned {}: {}",
                status, error_text
            )));
        }

        let subject = response.json::<IdentitySubject>().await.map_err(|e| {
            ExchangeEngineError::Upstream(format!("Failed to parse identity response: {}", e))
        })?;

        Ok(subject)
    }
}
