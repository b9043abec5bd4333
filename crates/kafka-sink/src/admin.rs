//! Topic lifecycle: readiness, idempotent creation and deletion, and
//! read-only inspection of topic layouts and message counts.
//!
//! A topic counts as ready only once every configured broker answers a
//! metadata request for it with at least one partition. Brokers are asked
//! individually so a topic that is visible on the controller but not yet
//! propagated elsewhere is still reported as not ready. Inspection only
//! needs one answer and uses the first broker that responds.

use async_trait::async_trait;
use ch_sync_export::{ExportError, Result, TopicReadiness};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::metadata::Metadata;
use rdkafka::ClientConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const CREATE_READY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DELETE_TIMEOUT: Duration = Duration::from_secs(10);
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// What one broker reports about a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerView {
    Unreachable,
    Partitions(usize),
}

/// Layout of one partition as the answering broker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub id: i32,
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// Layout of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicInfo {
    pub topic: String,
    pub partitions: usize,
    /// Largest replica set over all partitions.
    pub replication_factor: usize,
    /// Distinct partition leaders, ascending.
    pub leaders: Vec<i32>,
    pub partition_info: Vec<PartitionInfo>,
}

impl TopicInfo {
    pub fn from_partitions(topic: impl Into<String>, mut partitions: Vec<PartitionInfo>) -> Self {
        partitions.sort_by_key(|p| p.id);
        let replication_factor = partitions.iter().map(|p| p.replicas.len()).max().unwrap_or(0);
        let mut leaders: Vec<i32> = partitions.iter().map(|p| p.leader).collect();
        leaders.sort_unstable();
        leaders.dedup();
        Self {
            topic: topic.into(),
            partitions: partitions.len(),
            replication_factor,
            leaders,
            partition_info: partitions,
        }
    }
}

/// Low and high watermark of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub partition: i32,
    pub low: i64,
    pub high: i64,
}

/// Per-broker metadata lookup.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn topic_view(&self, broker: &str, topic: &str) -> BrokerView;

    /// Layouts of every topic `broker` knows, or only of `topic`.
    ///
    /// Topics the broker reports with an error are left out.
    async fn describe(&self, broker: &str, topic: Option<&str>) -> std::result::Result<Vec<TopicInfo>, String>;

    async fn watermarks(&self, broker: &str, topic: &str) -> std::result::Result<Vec<Watermarks>, String>;
}

fn single_broker_consumer(broker: &str) -> std::result::Result<BaseConsumer, rdkafka::error::KafkaError> {
    ClientConfig::new()
        .set("bootstrap.servers", broker)
        .set("allow.auto.create.topics", "false")
        .create()
}

fn topic_layouts(metadata: &Metadata) -> Vec<TopicInfo> {
    metadata
        .topics()
        .iter()
        .filter(|t| t.error().is_none())
        .map(|t| {
            let partitions = t
                .partitions()
                .iter()
                .map(|p| PartitionInfo {
                    id: p.id(),
                    leader: p.leader(),
                    replicas: p.replicas().to_vec(),
                    isr: p.isr().to_vec(),
                })
                .collect();
            TopicInfo::from_partitions(t.name(), partitions)
        })
        .collect()
}

/// Asks one broker with a short-lived consumer bootstrapped on that broker alone.
pub struct RdKafkaLookup;

#[async_trait]
impl MetadataLookup for RdKafkaLookup {
    async fn topic_view(&self, broker: &str, topic: &str) -> BrokerView {
        let broker = broker.to_string();
        let topic = topic.to_string();
        let lookup = tokio::task::spawn_blocking(move || {
            let consumer = single_broker_consumer(&broker)?;
            let metadata = consumer.fetch_metadata(Some(&topic), METADATA_TIMEOUT)?;
            let partitions = metadata
                .topics()
                .iter()
                .filter(|t| t.name() == topic && t.error().is_none())
                .map(|t| t.partitions().len())
                .sum::<usize>();
            Ok::<_, rdkafka::error::KafkaError>(partitions)
        })
        .await;

        match lookup {
            Ok(Ok(n)) => BrokerView::Partitions(n),
            Ok(Err(e)) => {
                debug!("Metadata request failed: {e}");
                BrokerView::Unreachable
            }
            Err(e) => {
                warn!("Metadata task failed: {e}");
                BrokerView::Unreachable
            }
        }
    }

    async fn describe(&self, broker: &str, topic: Option<&str>) -> std::result::Result<Vec<TopicInfo>, String> {
        let broker = broker.to_string();
        let topic = topic.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let consumer = single_broker_consumer(&broker).map_err(|e| e.to_string())?;
            let metadata = consumer
                .fetch_metadata(topic.as_deref(), METADATA_TIMEOUT)
                .map_err(|e| e.to_string())?;
            Ok(topic_layouts(&metadata))
        })
        .await
        .map_err(|e| format!("metadata task failed: {e}"))?
    }

    async fn watermarks(&self, broker: &str, topic: &str) -> std::result::Result<Vec<Watermarks>, String> {
        let broker = broker.to_string();
        let topic = topic.to_string();
        tokio::task::spawn_blocking(move || {
            let consumer = single_broker_consumer(&broker).map_err(|e| e.to_string())?;
            let metadata = consumer
                .fetch_metadata(Some(&topic), METADATA_TIMEOUT)
                .map_err(|e| e.to_string())?;
            let mut marks = Vec::new();
            for t in metadata.topics().iter().filter(|t| t.name() == topic && t.error().is_none()) {
                for p in t.partitions() {
                    let (low, high) = consumer
                        .fetch_watermarks(&topic, p.id(), METADATA_TIMEOUT)
                        .map_err(|e| format!("partition {}: {e}", p.id()))?;
                    marks.push(Watermarks {
                        partition: p.id(),
                        low,
                        high,
                    });
                }
            }
            Ok(marks)
        })
        .await
        .map_err(|e| format!("metadata task failed: {e}"))?
    }
}

/// Topic administration against a fixed broker set.
pub struct TopicAdmin {
    brokers: Vec<String>,
    lookup: Arc<dyn MetadataLookup>,
    poll_interval: Duration,
}

impl TopicAdmin {
    pub fn new(brokers: Vec<String>) -> Self {
        Self::with_lookup(brokers, Arc::new(RdKafkaLookup))
    }

    pub fn with_lookup(brokers: Vec<String>, lookup: Arc<dyn MetadataLookup>) -> Self {
        Self {
            brokers,
            lookup,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    fn require_brokers(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(ExportError::Config("no Kafka brokers configured".to_string()));
        }
        Ok(())
    }

    /// Views of all brokers, in configured order.
    async fn survey(&self, topic: &str) -> Vec<BrokerView> {
        let mut views = Vec::with_capacity(self.brokers.len());
        for broker in &self.brokers {
            views.push(self.lookup.topic_view(broker, topic).await);
        }
        views
    }

    fn admin_client(&self) -> Result<AdminClient<DefaultClientContext>> {
        ClientConfig::new()
            .set("bootstrap.servers", self.brokers.join(","))
            .create()
            .map_err(|e| ExportError::Connectivity(format!("Failed to create admin client: {e}")))
    }

    /// Create `topic` unless some reachable broker already reports partitions
    /// for it, then block until it is ready everywhere.
    ///
    /// Returns whether the topic was created by this call.
    pub async fn ensure_topic(&self, topic: &str, partitions: i32, replication: i32) -> Result<bool> {
        self.require_brokers()?;
        let views = self.survey(topic).await;
        if views.iter().all(|v| *v == BrokerView::Unreachable) {
            return Err(ExportError::BrokersUnreachable(self.brokers.join(",")));
        }
        if has_partitions(&views) {
            debug!(topic, "Topic already exists");
            return Ok(false);
        }

        let new_topic = NewTopic::new(
            topic,
            partitions.max(1),
            TopicReplication::Fixed(replication.max(1)),
        );
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));
        let results = self
            .admin_client()?
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| ExportError::Admin(format!("Failed to create topic {topic}: {e}")))?;

        let mut created = false;
        for result in results {
            match result {
                Ok(name) => {
                    info!(topic = %name, partitions, replication, "Topic created");
                    created = true;
                }
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!(topic = %name, "Topic already exists");
                }
                Err((name, code)) => {
                    return Err(ExportError::Admin(format!(
                        "Failed to create topic {name}: {code}"
                    )));
                }
            }
        }

        self.wait_ready(topic, CREATE_READY_TIMEOUT).await?;
        Ok(created)
    }

    /// Delete `topic` and wait until no broker reports partitions for it.
    ///
    /// Deleting an absent topic succeeds without doing anything.
    pub async fn delete_topic(&self, topic: &str) -> Result<()> {
        self.require_brokers()?;
        let views = self.survey(topic).await;
        if views.iter().all(|v| *v == BrokerView::Unreachable) {
            return Err(ExportError::BrokersUnreachable(self.brokers.join(",")));
        }
        if !has_partitions(&views) {
            debug!(topic, "Topic already absent");
            return Ok(());
        }

        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(5)));
        let results = self
            .admin_client()?
            .delete_topics(&[topic], &opts)
            .await
            .map_err(|e| ExportError::Admin(format!("Failed to delete topic {topic}: {e}")))?;
        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "Topic deletion requested"),
                Err((_, RDKafkaErrorCode::UnknownTopicOrPartition)) => return Ok(()),
                Err((name, code)) => {
                    return Err(ExportError::Admin(format!(
                        "Failed to delete topic {name}: {code}"
                    )));
                }
            }
        }

        self.wait_absent(topic, DELETE_TIMEOUT).await
    }

    /// Layouts from the first broker that answers.
    async fn describe_any(&self, topic: Option<&str>) -> Result<Vec<TopicInfo>> {
        self.require_brokers()?;
        let mut first_error = None;
        for broker in &self.brokers {
            match self.lookup.describe(broker, topic).await {
                Ok(layouts) => return Ok(layouts),
                Err(e) => {
                    debug!(broker = %broker, "Metadata request failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(ExportError::BrokersUnreachable(format!(
            "{} ({})",
            self.brokers.join(","),
            first_error.unwrap_or_default()
        )))
    }

    /// Names of every topic in the cluster, sorted.
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .describe_any(None)
            .await?
            .into_iter()
            .map(|t| t.topic)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Layouts of every topic in the cluster, sorted by name.
    pub async fn topics_info(&self) -> Result<Vec<TopicInfo>> {
        let mut layouts = self.describe_any(None).await?;
        layouts.sort_by(|a, b| a.topic.cmp(&b.topic));
        Ok(layouts)
    }

    /// Layout of `topic`; a topic without partitions counts as missing.
    pub async fn topic_info(&self, topic: &str) -> Result<TopicInfo> {
        self.describe_any(Some(topic))
            .await?
            .into_iter()
            .find(|t| t.topic == topic && t.partitions > 0)
            .ok_or_else(|| ExportError::Admin(format!("topic does not exist: {topic}")))
    }

    /// Messages currently retained in `topic`: the sum over its partitions of
    /// high minus low watermark.
    pub async fn message_count(&self, topic: &str) -> Result<u64> {
        self.require_brokers()?;
        let mut first_error = None;
        for broker in &self.brokers {
            match self.lookup.watermarks(broker, topic).await {
                Ok(marks) => {
                    return Ok(marks
                        .iter()
                        .map(|m| (m.high - m.low).max(0) as u64)
                        .sum())
                }
                Err(e) => {
                    debug!(broker = %broker, topic, "Watermark request failed: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(ExportError::BrokersUnreachable(format!(
            "{} ({})",
            self.brokers.join(","),
            first_error.unwrap_or_default()
        )))
    }

    async fn wait_absent(&self, topic: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !has_partitions(&self.survey(topic).await) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ExportError::Admin(format!("topic not deleted: {topic}")));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn has_partitions(views: &[BrokerView]) -> bool {
    views
        .iter()
        .any(|v| matches!(v, BrokerView::Partitions(n) if *n > 0))
}

#[async_trait]
impl TopicReadiness for TopicAdmin {
    async fn wait_ready(&self, topic: &str, timeout: Duration) -> Result<()> {
        self.require_brokers()?;
        let deadline = Instant::now() + timeout;
        let mut ready: HashSet<&str> = HashSet::new();
        let mut responded = false;

        loop {
            for broker in &self.brokers {
                if ready.contains(broker.as_str()) {
                    continue;
                }
                match self.lookup.topic_view(broker, topic).await {
                    BrokerView::Unreachable => {}
                    BrokerView::Partitions(n) => {
                        responded = true;
                        if n > 0 {
                            ready.insert(broker.as_str());
                        }
                    }
                }
            }
            if ready.len() == self.brokers.len() {
                debug!(topic, "Topic ready on all brokers");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(if responded || !ready.is_empty() {
                    ExportError::NotReady {
                        topic: topic.to_string(),
                    }
                } else {
                    ExportError::BrokersUnreachable(self.brokers.join(","))
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
