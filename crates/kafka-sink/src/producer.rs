use async_trait::async_trait;
use ch_sync_export::{DeliveryError, ExportError, Message, MessageSink};
use futures::future::join_all;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::debug;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes batches of keyed messages to one topic.
///
/// Every message of a batch is enqueued before any delivery report is
/// awaited; the batch succeeds only when all of them are acknowledged by all
/// in-sync replicas.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaSink {
    pub fn new(brokers: &[String], topic: &str) -> ch_sync_export::Result<Self> {
        if brokers.is_empty() {
            return Err(ExportError::Config("no Kafka brokers configured".to_string()));
        }
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("acks", "all")
            .set("partitioner", "murmur2_random")
            .set("message.timeout.ms", SEND_TIMEOUT.as_millis().to_string())
            .set("allow.auto.create.topics", "false")
            .create()
            .map_err(|e| ExportError::Connectivity(format!("Failed to create Kafka producer: {e}")))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl MessageSink for KafkaSink {
    async fn write(&self, batch: &[Message]) -> Result<(), DeliveryError> {
        let sends = batch.iter().map(|m| {
            let mut record: FutureRecord<'_, [u8], [u8]> =
                FutureRecord::to(&self.topic).payload(m.value.as_slice());
            if let Some(key) = &m.key {
                record = record.key(key.as_slice());
            }
            self.producer.send(record, SEND_TIMEOUT)
        });

        let mut first_error = None;
        for result in join_all(sends).await {
            if let Err((err, _)) = result {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => {
                debug!(topic = %self.topic, size = batch.len(), "Batch acknowledged");
                Ok(())
            }
            Some(err) => Err(classify(&err)),
        }
    }

    async fn close(&self) -> ch_sync_export::Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(|e| ExportError::Delivery(format!("flush task failed: {e}")))?
            .map_err(|e| ExportError::Delivery(format!("Failed to flush producer: {e}")))
    }
}

/// Sort a producer failure into the "topic not known yet" case or the rest.
pub fn classify(err: &KafkaError) -> DeliveryError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::UnknownTopicOrPartition
            | RDKafkaErrorCode::UnknownTopic
            | RDKafkaErrorCode::UnknownPartition,
        ) => DeliveryError::UnknownTopic(err.to_string()),
        _ => DeliveryError::Other(err.to_string()),
    }
}
