use crate::errors::{ExchangeEngineError, Result};
use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration as StdDuration;
use tracing::error;

#[derive(Debug, Deserialize)]
struct LatestRatesPayload {
    base: String,
    date: NaiveDate,
    rates: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
struct RangeRatesPayload {
    rates: HashMap<NaiveDate, HashMap<String, Decimal>>,
}

/// Quoted rates for one source currency at one point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct LiveRates {
    pub source: String,
    pub date: NaiveDate,
    pub quotes: HashMap<String, Decimal>,
}

/// One (date, rate) observation from the historical series
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct RatePoint {
    pub date: NaiveDate,
    pub rate: Decimal,
}

pub struct MarketDataClient {
    base_url: String,
    client: Client,
}

impl MarketDataClient {
    pub fn new(base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .unwrap();

        MarketDataClient { base_url, client }
    }

    /// Latest quotes for `source` against the requested symbols
    pub async fn live_rates(&self, source: &str, symbols: &[&str]) -> Result<LiveRates> {
        let url = format!("{}/latest", self.base_url);
        let to = symbols.join(",");

        let response = self
            .client
            .get(&url)
            .query(&[("from", source), ("to", to.as_str())])
            .send()
            .await
            .map_err(|e| {
                error!("Market data provider unreachable: {}", e);
                ExchangeEngineError::Upstream(format!("Live rates request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeEngineError::Upstream(format!(
                "Market data provider returned {}: {}",
                status, error_text
            )));
        }

        let payload = response.json::<LatestRatesPayload>().await.map_err(|e| {
            ExchangeEngineError::Upstream(format!("Malformed live rates response: {}", e))
        })?;

        Ok(LiveRates {
            source: payload.base,
            date: payload.date,
            quotes: payload.rates,
        })
    }

    /// Latest quote for a single pair
    pub async fn live_rate(&self, source: &str, target: &str) -> Result<Decimal> {
        let rates = self.live_rates(source, &[target]).await?;

        rates.quotes.get(target).copied().ok_or_else(|| {
            ExchangeEngineError::Upstream(format!(
                "Market data provider omitted quote for {}{}",
                source, target
            ))
        })
    }

    /// Daily observations for the trailing `days`, oldest first
    pub async fn historical_rates(
        &self,
        source: &str,
        target: &str,
        days: i64,
    ) -> Result<Vec<RatePoint>> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(days);
        let url = format!("{}/{}..{}", self.base_url, start, end);

        let response = self
            .client
            .get(&url)
            .query(&[("from", source), ("to", target)])
            .send()
            .await
            .map_err(|e| {
                error!("Market data provider unreachable: {}", e);
                ExchangeEngineError::Upstream(format!("Historical rates request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExchangeEngineError::Upstream(format!(
                "Market data provider returned {}: {}",
                status, error_text
            )));
        }

        let payload = response.json::<RangeRatesPayload>().await.map_err(|e| {
            ExchangeEngineError::Upstream(format!("Malformed historical rates response: {}", e))
        })?;

        let mut points: Vec<RatePoint> = payload
            .rates
            .into_iter()
            .filter_map(|(date, quotes)| {
                quotes.get(target).map(|rate| RatePoint { date, rate: *rate })
            })
            .collect();

        points.sort_by_key(|p| p.date);

        Ok(points)
    }
}
