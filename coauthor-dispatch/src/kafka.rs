//! Apache Kafka event sink.

use std::time::Duration;

use async_trait::async_trait;
use coauthor_collab::DocOpEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::info;

use crate::error::{DispatchError, DispatchResult};
use crate::sink::EventSink;

/// Kafka sink configuration.
#[derive(Debug, Clone)]
pub struct KafkaSinkConfig {
    /// Broker list (`host:port,host:port`).
    pub brokers: String,
    /// Topic the applied-op records are published to.
    pub topic: String,
    /// Client id reported to the brokers.
    pub client_id: Option<String>,
    /// Per-message delivery timeout.
    pub message_timeout: Duration,
}

impl KafkaSinkConfig {
    /// Create a configuration for the given brokers and topic.
    pub fn new(brokers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            topic: topic.into(),
            client_id: None,
            message_timeout: Duration::from_secs(5),
        }
    }
}

/// Publishes [`DocOpEvent`] records to Kafka, keyed by document id so all
/// operations of one document land on the same partition.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    message_timeout: Duration,
}

impl KafkaSink {
    /// Connect a producer for the configured brokers.
    pub fn connect(config: KafkaSinkConfig) -> DispatchResult<Self> {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &config.brokers);
        client_config.set(
            "message.timeout.ms",
            config.message_timeout.as_millis().to_string(),
        );
        if let Some(ref client_id) = config.client_id {
            client_config.set("client.id", client_id);
        }

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| DispatchError::Connection(e.to_string()))?;

        info!(brokers = %config.brokers, topic = %config.topic, "Kafka producer ready");

        Ok(Self {
            producer,
            topic: config.topic,
            message_timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn publish(&self, event: &DocOpEvent) -> DispatchResult<()> {
        let payload = serde_json::to_vec(event)?;
        let record = FutureRecord::to(&self.topic)
            .key(&event.doc_id)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.message_timeout))
            .await
            .map_err(|(err, _)| DispatchError::Publish(err.to_string()))?;
        Ok(())
    }
}
