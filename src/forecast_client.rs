use crate::errors::{ExchangeEngineError, Result};
use crate::market_client::RatePoint;
use crate::models::ForecastPoint;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

#[derive(Debug, Serialize)]
struct ForecastRequest<'a> {
    series: &'a [RatePoint],
    horizon_days: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    points: Vec<ForecastPoint>,
}

pub struct ForecastClient {
    base_url: String,
    client: Client,
}

impl ForecastClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap();

        ForecastClient { base_url, client }
    }

    /// Send a historical series and a horizon, get the predicted series back
    pub async fn forecast(&self, series: &[RatePoint], horizon_days: i64) -> Result<Vec<ForecastPoint>> {
        let url = format!("{}/v1/forecast", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&ForecastRequest {
                series,
                horizon_days,
            })
            .send()
            .await
            .map_err(|e| {
                error!("Forecasting service unreachable: {}", e);
                ExchangeEngineError::Upstream(format!("Forecast request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeEngineError::Upstream(format!(
                "Forecasting service returned {}: {}",
                status, error_text
            )));
        }

        let payload = response.json::<ForecastPayload>().await.map_err(|e| {
            ExchangeEngineError::Upstream(format!("Malformed forecast response: {}", e))
        })?;

        Ok(payload.points)
    }
}
