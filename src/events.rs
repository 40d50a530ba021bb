use crate::errors::{ExchangeEngineError, Result};
use crate::models::ExchangeEvent;
use async_nats::Client;
use tracing::info;

pub struct NatsProducer {
    client: Client,
    topic_prefix: String,
}

impl NatsProducer {
    pub async fn new(url: &str, topic_prefix: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| ExchangeEngineError::Nats(e.to_string()))?;

        info!("Connected to NATS at {}", url);

        Ok(NatsProducer {
            client,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    pub async fn publish_exchange_event(&self, event: &ExchangeEvent) -> Result<()> {
        let subject = format!("{}.ledger.events", self.topic_prefix);
        let payload = serde_json::to_vec(event)
            .map_err(|e| ExchangeEngineError::Nats(format!("Serialization error: {}", e)))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| ExchangeEngineError::Nats(format!("Failed to publish event: {}", e)))?;

        info!(
            "Published {:?} for entity {} to subject {}",
            event.event_type, event.entity_id, subject
        );

        Ok(())
    }
}
